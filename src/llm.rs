use crate::error::{Error, Result};
use crate::http::{HttpClient, HttpOutcome};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Sampling top_p sent on every generation request, both APIs.
pub const TOP_P: f32 = 0.95;

/// Author of a conversation-history message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One turn of prior conversation, insertion order significant.
/// Owned by the caller for the duration of one request; the core never
/// mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: Role,
    pub content: String,
}

// -- Chat-completions format (hosted provider) --

#[derive(Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<Msg<'a>>,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

// -- Generate format (local single-shot provider) --

#[derive(Serialize)]
pub struct GenerateRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub temperature: f32,
    pub top_p: f32,
    pub stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: Option<String>,
}

// -- Shared --

#[derive(Serialize)]
pub struct Msg<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

/// Assemble the chat message list: system prompt, then the history in
/// conversational order, then the new user text.
pub fn build_messages<'a>(
    system: &'a str,
    history: &'a [HistoryMessage],
    user_text: &'a str,
) -> Vec<Msg<'a>> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(Msg {
        role: "system",
        content: system,
    });
    for msg in history {
        messages.push(Msg {
            role: msg.role.as_str(),
            content: &msg.content,
        });
    }
    messages.push(Msg {
        role: "user",
        content: user_text,
    });
    messages
}

/// Result of one attempt against the chat provider. Drives the cascade's
/// transition logic in `backend.rs`.
#[derive(Debug)]
pub enum AttemptOutcome {
    Success(String),
    RateLimited,
    TimedOut,
    /// Non-2xx other than 429, or a transport failure (`status: None`).
    ProviderError {
        status: Option<u16>,
        message: String,
    },
    /// 2xx but no usable completion content. Never retried.
    Malformed(String),
}

/// One HTTP round trip to the hosted chat-completions endpoint.
pub struct ChatClient {
    http: HttpClient,
    api_url: String,
    api_key: String,
}

impl ChatClient {
    pub fn new(api_url: String, api_key: String) -> Result<Self> {
        let http = HttpClient::new(concat!("deskwise/", env!("CARGO_PKG_VERSION")))?;
        Ok(Self {
            http,
            api_url,
            api_key,
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    pub async fn chat(&self, request: &ChatRequest<'_>, timeout: Duration) -> AttemptOutcome {
        let body = match serde_json::to_string(request) {
            Ok(body) => body,
            Err(e) => {
                return AttemptOutcome::ProviderError {
                    status: None,
                    message: format!("serialize request: {e}"),
                };
            }
        };
        debug!(model = request.model, "sending chat request");

        let auth = format!("Bearer {}", self.api_key);
        let outcome = self
            .http
            .post_json(&self.api_url, &body, &[("Authorization", &auth)], timeout)
            .await;

        match outcome {
            HttpOutcome::Ok(text) => parse_chat_body(&text),
            HttpOutcome::RateLimited => AttemptOutcome::RateLimited,
            HttpOutcome::TimedOut => AttemptOutcome::TimedOut,
            HttpOutcome::Unreachable(message) => AttemptOutcome::ProviderError {
                status: None,
                message,
            },
            HttpOutcome::Failed { status, message } => {
                AttemptOutcome::ProviderError { status, message }
            }
        }
    }
}

fn parse_chat_body(text: &str) -> AttemptOutcome {
    let resp: ChatResponse = match serde_json::from_str(text) {
        Ok(resp) => resp,
        Err(e) => return AttemptOutcome::Malformed(format!("parse provider response: {e}")),
    };
    match resp.choices.into_iter().next() {
        Some(choice) => AttemptOutcome::Success(choice.message.content.trim().to_string()),
        None => AttemptOutcome::Malformed("no completion choices in response".into()),
    }
}

/// One HTTP round trip to the local generate endpoint. No retry, no
/// degradation: failures surface immediately as typed errors.
pub struct GenerateClient {
    http: HttpClient,
    url: String,
}

impl GenerateClient {
    pub fn new(url: String) -> Result<Self> {
        let http = HttpClient::new(concat!("deskwise/", env!("CARGO_PKG_VERSION")))?;
        Ok(Self { http, url })
    }

    pub async fn generate(
        &self,
        request: &GenerateRequest<'_>,
        timeout: Duration,
    ) -> Result<String> {
        let body = serde_json::to_string(request)
            .map_err(|e| Error::upstream(format!("serialize request: {e}")))?;
        debug!(model = request.model, "sending generate request");

        match self.http.post_json(&self.url, &body, &[], timeout).await {
            HttpOutcome::Ok(text) => {
                let resp: GenerateResponse = serde_json::from_str(&text)
                    .map_err(|e| Error::upstream(format!("parse generate response: {e}")))?;
                match resp.response {
                    Some(answer) => Ok(answer.trim().to_string()),
                    None => Err(Error::upstream("missing response field in generate reply")),
                }
            }
            HttpOutcome::TimedOut => Err(Error::UpstreamTimeout),
            HttpOutcome::Unreachable(message) => Err(Error::unavailable(message)),
            HttpOutcome::RateLimited => Err(Error::upstream_http(429, "rate limited")),
            HttpOutcome::Failed {
                status: Some(status),
                message,
            } => Err(Error::upstream_http(status, message)),
            HttpOutcome::Failed {
                status: None,
                message,
            } => Err(Error::upstream(message)),
        }
    }
}
