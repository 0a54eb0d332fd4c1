//! Backend orchestrator: routes analyze/follow-up requests to the configured
//! provider implementation.
//!
//! The two backends are deliberately asymmetric. The Mistral backend wraps
//! every analysis in the retry/degradation cascade; the Ollama backend is a
//! single shot and surfaces any transport failure immediately. Callers must
//! not assume uniform resilience.

use crate::cascade::{self, AttemptParams, ModelTier, RetryPolicy};
use crate::config::{BackendKind, Config, MistralConfig, OllamaConfig};
use crate::error::{Error, Result};
use crate::llm::{
    AttemptOutcome, ChatClient, ChatRequest, GenerateClient, GenerateRequest, HistoryMessage,
    TOP_P, build_messages,
};
use crate::prompts::{self, PromptSet};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

const FOLLOW_UP_TEMPERATURE: f32 = 0.4;
const FOLLOW_UP_MAX_TOKENS: u32 = 200;

/// The configured backend, resolved once at startup.
pub enum Backend {
    Mistral(MistralBackend),
    Ollama(OllamaBackend),
}

impl Backend {
    pub fn from_config(config: &Config, prompts: Arc<PromptSet>) -> Result<Self> {
        let backend = match config.backend {
            BackendKind::Mistral => Self::Mistral(MistralBackend::new(
                &config.mistral,
                config.retry.policy(),
                prompts,
            )?),
            BackendKind::Ollama => Self::Ollama(OllamaBackend::new(&config.ollama, prompts)?),
        };
        info!(backend = backend.kind(), "backend initialized");
        Ok(backend)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Mistral(_) => "mistral",
            Self::Ollama(_) => "ollama",
        }
    }

    /// Analyze a support message into raw model text (expected to be JSON;
    /// the orchestrator never parses it).
    pub async fn analyze(&self, message: &str, history: &[HistoryMessage]) -> Result<String> {
        match self {
            Self::Mistral(b) => b.analyze(message, history).await,
            Self::Ollama(b) => b.analyze(message, history).await,
        }
    }

    /// Generate a free-text follow-up question for a partially filled ticket.
    pub async fn follow_up(
        &self,
        ticket: &serde_json::Value,
        history: &[HistoryMessage],
    ) -> Result<String> {
        match self {
            Self::Mistral(b) => b.follow_up(ticket, history).await,
            Self::Ollama(b) => b.follow_up(ticket, history).await,
        }
    }

    pub fn status(&self) -> BackendStatus {
        match self {
            Self::Mistral(b) => b.status(),
            Self::Ollama(b) => b.status(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BackendStatus {
    pub backend: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_configured: Option<bool>,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_models: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// Model names for the three degradation tiers.
#[derive(Debug, Clone)]
pub struct ModelTiers {
    pub primary: String,
    pub secondary: String,
    pub tertiary: String,
}

impl ModelTiers {
    fn name(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Primary => &self.primary,
            ModelTier::Secondary => &self.secondary,
            ModelTier::Tertiary => &self.tertiary,
        }
    }
}

/// Hosted chat-completions backend with the retry/degradation cascade.
pub struct MistralBackend {
    client: ChatClient,
    prompts: Arc<PromptSet>,
    models: ModelTiers,
    policy: RetryPolicy,
    analyze_timeout: Duration,
    follow_up_timeout: Duration,
    fallback_timeout: Duration,
}

impl MistralBackend {
    pub fn new(
        config: &MistralConfig,
        policy: RetryPolicy,
        prompts: Arc<PromptSet>,
    ) -> Result<Self> {
        if config.api_key.is_empty() {
            warn!("mistral API key not configured");
        }
        let client = ChatClient::new(config.api_url.clone(), config.api_key.clone())?;
        Ok(Self {
            client,
            prompts,
            models: ModelTiers {
                primary: config.primary_model.clone(),
                secondary: config.secondary_model.clone(),
                tertiary: config.tertiary_model.clone(),
            },
            policy,
            analyze_timeout: Duration::from_secs(config.analyze_timeout_secs),
            follow_up_timeout: Duration::from_secs(config.follow_up_timeout_secs),
            fallback_timeout: Duration::from_secs(config.fallback_timeout_secs),
        })
    }

    /// Run the degradation cascade for one analysis request.
    ///
    /// State is the attempt index alone, threaded through the loop; model
    /// tier, prompt tier and sampling parameters are derived from it each
    /// iteration. Attempts are strictly sequential: one in-flight call at a
    /// time.
    pub async fn analyze(&self, message: &str, history: &[HistoryMessage]) -> Result<String> {
        self.ensure_configured()?;

        let mut attempt: u32 = 0;
        loop {
            let params = cascade::attempt_params(attempt);
            info!(
                attempt = attempt + 1,
                budget = self.policy.max_retries + 1,
                model = self.models.name(params.model),
                "analysis attempt"
            );

            match self
                .send(&params, message, history, self.analyze_timeout)
                .await
            {
                AttemptOutcome::Success(text) => {
                    info!(model = self.models.name(params.model), "analysis succeeded");
                    return Ok(text);
                }
                AttemptOutcome::RateLimited => {
                    if attempt < self.policy.max_retries {
                        let delay = self.policy.rate_limit_delay(attempt);
                        info!(delay_ms = delay.as_millis() as u64, "rate limited, backing off");
                        sleep(delay).await;
                        attempt += 1;
                    } else if self.models.primary != self.models.tertiary {
                        // Retry budget spent at every tier; one last attempt
                        // outside the budget unless the ladder is flat.
                        return self.rate_limit_fallback(message, history).await;
                    } else {
                        return Err(Error::CapacityExceeded);
                    }
                }
                AttemptOutcome::TimedOut => {
                    if attempt < self.policy.max_retries {
                        warn!(attempt, "attempt timed out, retrying");
                        sleep(self.policy.retry_delay()).await;
                        attempt += 1;
                    } else {
                        return Err(Error::UpstreamTimeout);
                    }
                }
                AttemptOutcome::ProviderError { status, message: m } => {
                    if attempt < self.policy.max_retries {
                        warn!(attempt, status, error = %m, "provider error, retrying");
                        sleep(self.policy.retry_delay()).await;
                        attempt += 1;
                    } else {
                        return Err(match status {
                            Some(code) => Error::upstream_http(code, m),
                            None => Error::upstream(m),
                        });
                    }
                }
                // A 2xx without completion content is a contract violation,
                // not a transient fault. Never retried.
                AttemptOutcome::Malformed(reason) => return Err(Error::upstream(reason)),
            }
        }
    }

    /// One extra attempt at the cheapest tier once rate limiting has
    /// exhausted the main schedule. Outside the retry budget; any failure
    /// here is capacity exhaustion.
    async fn rate_limit_fallback(
        &self,
        message: &str,
        history: &[HistoryMessage],
    ) -> Result<String> {
        info!(
            model = %self.models.tertiary,
            "retries exhausted, final attempt with minimal model"
        );
        let params = cascade::fallback_params();
        match self
            .send(&params, message, history, self.fallback_timeout)
            .await
        {
            AttemptOutcome::Success(text) => {
                info!("minimal-model fallback succeeded");
                Ok(text)
            }
            outcome => {
                warn!(?outcome, "minimal-model fallback failed");
                Err(Error::CapacityExceeded)
            }
        }
    }

    /// Follow-up generation bypasses the cascade: one attempt at the
    /// secondary tier, no retry, no fallback.
    pub async fn follow_up(
        &self,
        ticket: &serde_json::Value,
        history: &[HistoryMessage],
    ) -> Result<String> {
        self.ensure_configured()?;

        let context = prompts::build_follow_up_prompt(ticket, history);
        let request = ChatRequest {
            model: &self.models.secondary,
            messages: build_messages(self.prompts.follow_up(), history, &context),
            temperature: FOLLOW_UP_TEMPERATURE,
            top_p: TOP_P,
            max_tokens: FOLLOW_UP_MAX_TOKENS,
        };

        match self.client.chat(&request, self.follow_up_timeout).await {
            AttemptOutcome::Success(text) => Ok(text),
            AttemptOutcome::RateLimited => {
                Err(Error::upstream("rate limited during follow-up generation"))
            }
            AttemptOutcome::TimedOut => {
                Err(Error::upstream("timed out during follow-up generation"))
            }
            AttemptOutcome::ProviderError { status, message } => Err(Error::upstream(format!(
                "follow-up generation failed ({}): {message}",
                status.map_or_else(|| "transport".to_string(), |s| s.to_string())
            ))),
            AttemptOutcome::Malformed(reason) => Err(Error::upstream(reason)),
        }
    }

    async fn send(
        &self,
        params: &AttemptParams,
        message: &str,
        history: &[HistoryMessage],
        timeout: Duration,
    ) -> AttemptOutcome {
        let request = ChatRequest {
            model: self.models.name(params.model),
            messages: build_messages(self.prompts.for_tier(params.prompt), history, message),
            temperature: params.temperature,
            top_p: TOP_P,
            max_tokens: params.max_tokens,
        };
        self.client.chat(&request, timeout).await
    }

    fn ensure_configured(&self) -> Result<()> {
        if self.client.is_configured() {
            Ok(())
        } else {
            Err(Error::backend_unavailable(
                "mistral API key missing (set MISTRAL_API_KEY or mistral.api_key)",
            ))
        }
    }

    fn status(&self) -> BackendStatus {
        BackendStatus {
            backend: "mistral",
            api_key_configured: Some(self.client.is_configured()),
            model: self.models.primary.clone(),
            fallback_models: Some(vec![
                self.models.secondary.clone(),
                self.models.tertiary.clone(),
            ]),
            endpoint: None,
        }
    }
}

/// Local single-shot backend. One generation call with fixed parameters, no
/// retry, no degradation; transport failures surface immediately.
pub struct OllamaBackend {
    client: GenerateClient,
    prompts: Arc<PromptSet>,
    model: String,
    url: String,
    timeout: Duration,
}

impl OllamaBackend {
    pub fn new(config: &OllamaConfig, prompts: Arc<PromptSet>) -> Result<Self> {
        let client = GenerateClient::new(config.url.clone())?;
        Ok(Self {
            client,
            prompts,
            model: config.model.clone(),
            url: config.url.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    pub async fn analyze(&self, message: &str, history: &[HistoryMessage]) -> Result<String> {
        let conversation = flatten_history(history, message);
        let prompt = format!("{}\n\nUser message:\n{}", self.prompts.full(), conversation);
        let request = GenerateRequest {
            model: &self.model,
            prompt: &prompt,
            temperature: 0.2,
            top_p: TOP_P,
            stream: false,
        };
        self.client.generate(&request, self.timeout).await
    }

    pub async fn follow_up(
        &self,
        ticket: &serde_json::Value,
        history: &[HistoryMessage],
    ) -> Result<String> {
        let context = prompts::build_follow_up_prompt(ticket, history);
        let prompt = format!("{}\n\n{}", self.prompts.follow_up(), context);
        let request = GenerateRequest {
            model: &self.model,
            prompt: &prompt,
            temperature: 0.3,
            top_p: TOP_P,
            stream: false,
        };
        self.client.generate(&request, self.timeout).await
    }

    fn status(&self) -> BackendStatus {
        BackendStatus {
            backend: "ollama",
            api_key_configured: None,
            model: self.model.clone(),
            fallback_models: None,
            endpoint: Some(self.url.clone()),
        }
    }
}

/// Flatten the role-tagged history and the new message into one prompt body
/// for the generate API, which takes no message list.
fn flatten_history(history: &[HistoryMessage], message: &str) -> String {
    if history.is_empty() {
        return message.to_string();
    }
    let mut lines: Vec<String> = history
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str(), m.content))
        .collect();
    lines.push(message.to_string());
    lines.join("\n")
}
