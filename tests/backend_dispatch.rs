use deskwise::backend::Backend;
use deskwise::config::{BackendKind, Config};
use deskwise::error::Error;
use deskwise::llm::{HistoryMessage, Role};
use deskwise::prompts::PromptSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn prompt_set(dir: &Path) -> Arc<PromptSet> {
    std::fs::write(dir.join("base_prompt.txt"), "full system instructions").unwrap();
    std::fs::write(dir.join("minimal_prompt.txt"), "minimal system instructions").unwrap();
    std::fs::write(dir.join("followup_prompt.txt"), "follow-up instructions").unwrap();
    Arc::new(PromptSet::load(dir).unwrap())
}

fn ollama_config(url: &str) -> Config {
    let mut config = Config::default();
    config.backend = BackendKind::Ollama;
    config.ollama.url = url.to_string();
    config.ollama.model = "test:instruct".into();
    config.ollama.timeout_secs = 1;
    config
}

fn generate_reply(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({ "response": text }))
}

#[tokio::test]
async fn selection_is_resolved_at_construction() {
    let dir = tempfile::tempdir().unwrap();
    let prompts = prompt_set(dir.path());

    let ollama = Backend::from_config(
        &ollama_config("http://localhost:11434/api/generate"),
        Arc::clone(&prompts),
    )
    .unwrap();
    assert_eq!(ollama.kind(), "ollama");

    let mut config = Config::default();
    config.backend = BackendKind::Mistral;
    config.mistral.api_key = "test-key".into();
    let mistral = Backend::from_config(&config, prompts).unwrap();
    assert_eq!(mistral.kind(), "mistral");

    let status = mistral.status();
    assert_eq!(status.backend, "mistral");
    assert_eq!(status.api_key_configured, Some(true));
    assert_eq!(status.fallback_models.as_ref().map(Vec::len), Some(2));

    let status = ollama.status();
    assert_eq!(status.backend, "ollama");
    assert!(status.endpoint.is_some());
}

#[tokio::test]
async fn ollama_analyze_is_one_flattened_generate_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(generate_reply("  {\"title\": \"Printer down\"}  "))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = ollama_config(&format!("{}/api/generate", server.uri()));
    let backend = Backend::from_config(&config, prompt_set(dir.path())).unwrap();

    let history = vec![HistoryMessage {
        role: Role::User,
        content: "hello".into(),
    }];
    let text = backend.analyze("printer broken", &history).await.unwrap();
    assert_eq!(text, "{\"title\": \"Printer down\"}");

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["model"], "test:instruct");
    assert_eq!(body["stream"], false);
    assert!((body["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-3);
    let prompt = body["prompt"].as_str().unwrap();
    assert!(prompt.starts_with("full system instructions"));
    assert!(prompt.contains("user: hello"));
    assert!(prompt.ends_with("printer broken"));
}

#[tokio::test]
async fn ollama_follow_up_uses_follow_up_prompt_and_temperature() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(generate_reply("Which building are you in?"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = ollama_config(&format!("{}/api/generate", server.uri()));
    let backend = Backend::from_config(&config, prompt_set(dir.path())).unwrap();

    let ticket = serde_json::json!({"title": "Printer down", "location": "[INCONNU]"});
    let question = backend.follow_up(&ticket, &[]).await.unwrap();
    assert_eq!(question, "Which building are you in?");

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!((body["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-3);
    let prompt = body["prompt"].as_str().unwrap();
    assert!(prompt.starts_with("follow-up instructions"));
    assert!(prompt.contains("title: Printer down"));
}

#[tokio::test]
async fn ollama_http_error_surfaces_immediately() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = ollama_config(&format!("{}/api/generate", server.uri()));
    let backend = Backend::from_config(&config, prompt_set(dir.path())).unwrap();

    let err = backend.analyze("printer broken", &[]).await.unwrap_err();
    match err {
        Error::UpstreamHttp { status, .. } => assert_eq!(status, 500),
        other => panic!("expected UpstreamHttp, got {other:?}"),
    }

    // No retry, no degradation on this backend
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn ollama_rate_limiting_gets_no_special_handling() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = ollama_config(&format!("{}/api/generate", server.uri()));
    let backend = Backend::from_config(&config, prompt_set(dir.path())).unwrap();

    let err = backend.analyze("printer broken", &[]).await.unwrap_err();
    match err {
        Error::UpstreamHttp { status, .. } => assert_eq!(status, 429),
        other => panic!("expected UpstreamHttp, got {other:?}"),
    }
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn ollama_missing_response_field_is_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"done": true})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = ollama_config(&format!("{}/api/generate", server.uri()));
    let backend = Backend::from_config(&config, prompt_set(dir.path())).unwrap();

    let err = backend.analyze("printer broken", &[]).await.unwrap_err();
    assert!(matches!(err, Error::Upstream(_)));
}

#[tokio::test]
async fn ollama_timeout_is_upstream_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(generate_reply("too late").set_delay(Duration::from_secs(5)))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = ollama_config(&format!("{}/api/generate", server.uri()));
    let backend = Backend::from_config(&config, prompt_set(dir.path())).unwrap();

    let err = backend.analyze("printer broken", &[]).await.unwrap_err();
    assert!(matches!(err, Error::UpstreamTimeout));
}

#[tokio::test]
async fn ollama_unreachable_endpoint_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let config = ollama_config("http://127.0.0.1:1/api/generate");
    let backend = Backend::from_config(&config, prompt_set(dir.path())).unwrap();

    let err = backend.analyze("printer broken", &[]).await.unwrap_err();
    assert!(matches!(err, Error::Unavailable(_)));
}
