use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Backend misconfiguration (missing credentials, unknown backend).
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("LLM provider timed out")]
    UpstreamTimeout,

    /// Non-2xx, non-rate-limit response from the provider.
    #[error("Provider HTTP error ({status}): {message}")]
    UpstreamHttp { status: u16, message: String },

    /// Rate limiting exhausted at every model tier, fallback included.
    #[error("Provider capacity exceeded at all model tiers")]
    CapacityExceeded,

    /// Malformed/empty provider response or uncategorized upstream failure.
    #[error("Provider error: {0}")]
    Upstream(String),

    /// Provider endpoint unreachable (connection refused, DNS failure).
    #[error("Provider unreachable: {0}")]
    Unavailable(String),

    #[error("Prompt template not found: {0}")]
    PromptNotFound(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    pub fn upstream_http(status: u16, message: impl Into<String>) -> Self {
        Self::UpstreamHttp {
            status,
            message: message.into(),
        }
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn backend_unavailable(msg: impl Into<String>) -> Self {
        Self::BackendUnavailable(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
