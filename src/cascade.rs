//! Degradation schedule for the hosted-provider cascade.
//!
//! Everything here is a pure, deterministic function of the attempt index:
//! the retry loop in `backend.rs` threads that index through each iteration
//! and derives model tier, prompt tier and sampling parameters from it, so
//! the state machine can be inspected and tested without a transport.

use std::time::Duration;

/// Model quality/cost level, degraded as attempts accumulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    Primary,
    Secondary,
    Tertiary,
}

/// System-prompt verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTier {
    Full,
    Minimal,
}

/// Generation parameters for one attempt, rebuilt fresh per attempt and
/// never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptParams {
    pub model: ModelTier,
    pub prompt: PromptTier,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Derive the attempt parameters for attempt `n`.
///
/// The first attempt runs at full fidelity; sustained failure trades answer
/// quality for availability by stepping down the model tier, then the prompt.
pub fn attempt_params(attempt: u32) -> AttemptParams {
    let model = match attempt {
        0 => ModelTier::Primary,
        1 => ModelTier::Secondary,
        _ => ModelTier::Tertiary,
    };
    let prompt = if attempt <= 1 {
        PromptTier::Full
    } else {
        PromptTier::Minimal
    };
    let temperature = (0.3 + 0.1 * attempt as f32).min(0.7);
    let max_tokens = if attempt == 0 { 800 } else { 600 };
    AttemptParams {
        model,
        prompt,
        temperature,
        max_tokens,
    }
}

/// Parameters for the one-shot fallback after rate limiting exhausts the
/// main schedule: cheapest model, minimal prompt, near-deterministic.
pub fn fallback_params() -> AttemptParams {
    AttemptParams {
        model: ModelTier::Tertiary,
        prompt: PromptTier::Minimal,
        temperature: 0.1,
        max_tokens: 400,
    }
}

/// Retry budget and backoff timing for the cascade.
///
/// The two delay shapes are intentionally asymmetric: rate limiting backs
/// off exponentially, timeouts and transport errors wait a fixed base delay.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub backoff_factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            backoff_factor: 2,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry that follows a rate-limited attempt `n`:
    /// `base_delay * backoff_factor^n`.
    pub fn rate_limit_delay(&self, attempt: u32) -> Duration {
        self.base_delay * self.backoff_factor.pow(attempt)
    }

    /// Delay before the retry that follows a timeout or transport error.
    /// Fixed, regardless of the attempt index.
    pub fn retry_delay(&self) -> Duration {
        self.base_delay
    }
}
