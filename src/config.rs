use crate::cascade::RetryPolicy;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default)]
    pub mistral: MistralConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
    #[serde(default)]
    pub locations: LocationsConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Mistral,
    Ollama,
}

#[derive(Debug, Deserialize)]
pub struct MistralConfig {
    #[serde(default = "default_mistral_api_url")]
    pub api_url: String,
    #[serde(default = "default_mistral_api_key")]
    pub api_key: String,
    #[serde(default = "default_primary_model")]
    pub primary_model: String,
    #[serde(default = "default_secondary_model")]
    pub secondary_model: String,
    #[serde(default = "default_tertiary_model")]
    pub tertiary_model: String,
    #[serde(default = "default_analyze_timeout")]
    pub analyze_timeout_secs: u64,
    #[serde(default = "default_short_timeout")]
    pub follow_up_timeout_secs: u64,
    #[serde(default = "default_short_timeout")]
    pub fallback_timeout_secs: u64,
}

impl Default for MistralConfig {
    fn default() -> Self {
        Self {
            api_url: default_mistral_api_url(),
            api_key: default_mistral_api_key(),
            primary_model: default_primary_model(),
            secondary_model: default_secondary_model(),
            tertiary_model: default_tertiary_model(),
            analyze_timeout_secs: default_analyze_timeout(),
            follow_up_timeout_secs: default_short_timeout(),
            fallback_timeout_secs: default_short_timeout(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_url")]
    pub url: String,
    #[serde(default = "default_ollama_model")]
    pub model: String,
    #[serde(default = "default_short_timeout")]
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            url: default_ollama_url(),
            model: default_ollama_model(),
            timeout_secs: default_short_timeout(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            backoff_factor: self.backoff_factor,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PromptsConfig {
    #[serde(default = "default_prompts_dir")]
    pub dir: PathBuf,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            dir: default_prompts_dir(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LocationsConfig {
    #[serde(default = "default_locations_path")]
    pub path: PathBuf,
    #[serde(default = "default_locations_column")]
    pub column: String,
    #[serde(default = "default_score_cutoff")]
    pub score_cutoff: u8,
}

impl Default for LocationsConfig {
    fn default() -> Self {
        Self {
            path: default_locations_path(),
            column: default_locations_column(),
            score_cutoff: default_score_cutoff(),
        }
    }
}

// Defaults
fn default_mistral_api_url() -> String {
    "https://api.mistral.ai/v1/chat/completions".into()
}
fn default_mistral_api_key() -> String {
    std::env::var("MISTRAL_API_KEY").unwrap_or_default()
}
fn default_primary_model() -> String {
    "mistral-large-latest".into()
}
fn default_secondary_model() -> String {
    "mistral-medium-latest".into()
}
fn default_tertiary_model() -> String {
    "mistral-small-latest".into()
}
fn default_analyze_timeout() -> u64 {
    60
}
fn default_short_timeout() -> u64 {
    30
}
fn default_ollama_url() -> String {
    "http://localhost:11434/api/generate".into()
}
fn default_ollama_model() -> String {
    "mistral:instruct".into()
}
fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    2000
}
fn default_backoff_factor() -> u32 {
    2
}
fn default_prompts_dir() -> PathBuf {
    "prompts".into()
}
fn default_locations_path() -> PathBuf {
    "data/locations.csv".into()
}
fn default_locations_column() -> String {
    "site".into()
}
fn default_score_cutoff() -> u8 {
    crate::catalog::DEFAULT_SCORE_CUTOFF
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            mistral: MistralConfig::default(),
            ollama: OllamaConfig::default(),
            retry: RetryConfig::default(),
            prompts: PromptsConfig::default(),
            locations: LocationsConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read config {}: {e}", path.display())))?;
        toml::from_str(&content).map_err(|e| Error::config(format!("Failed to parse config: {e}")))
    }

    /// Early sanity checks. A missing API key is only a warning here; the
    /// backend reports `BackendUnavailable` when actually called, so the
    /// service can still start (e.g. for the ollama backend or status).
    pub fn validate(&self) -> Result<()> {
        if self.retry.backoff_factor == 0 {
            return Err(Error::config("retry.backoff_factor must be at least 1"));
        }
        if self.backend == BackendKind::Mistral && self.mistral.api_key.is_empty() {
            warn!("mistral backend selected but no API key configured (MISTRAL_API_KEY)");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config_parses() {
        let toml = r#"
backend = "ollama"

[mistral]
api_url = "https://api.example.test/v1/chat/completions"
primary_model = "large-test"
analyze_timeout_secs = 10

[ollama]
url = "http://localhost:11434/api/generate"
model = "test:instruct"

[retry]
max_retries = 5
base_delay_ms = 100
backoff_factor = 3

[prompts]
dir = "templates"

[locations]
path = "fixtures/sites.csv"
column = "building"
score_cutoff = 90
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.backend, BackendKind::Ollama);
        assert_eq!(config.mistral.primary_model, "large-test");
        // Unspecified tier falls back to its default
        assert_eq!(config.mistral.secondary_model, "mistral-medium-latest");
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.locations.column, "building");
        assert_eq!(config.locations.score_cutoff, 90);
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.backend, BackendKind::Mistral);
        assert_eq!(config.mistral.analyze_timeout_secs, 60);
        assert_eq!(config.mistral.follow_up_timeout_secs, 30);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.base_delay_ms, 2000);
        assert_eq!(config.locations.score_cutoff, 80);
    }

    #[test]
    fn retry_config_builds_policy() {
        let retry = RetryConfig {
            max_retries: 2,
            base_delay_ms: 50,
            backoff_factor: 2,
        };
        let policy = retry.policy();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.rate_limit_delay(1), Duration::from_millis(200));
        assert_eq!(policy.retry_delay(), Duration::from_millis(50));
    }

    #[test]
    fn validate_rejects_zero_backoff_factor() {
        let mut config = Config::default();
        config.retry.backoff_factor = 0;
        assert!(config.validate().is_err());
    }
}
