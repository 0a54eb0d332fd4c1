use crate::cascade::PromptTier;
use crate::error::{Error, Result};
use crate::llm::HistoryMessage;
use std::path::Path;
use tracing::info;

const FULL_PROMPT_FILE: &str = "base_prompt.txt";
const MINIMAL_PROMPT_FILE: &str = "minimal_prompt.txt";
const FOLLOW_UP_PROMPT_FILE: &str = "followup_prompt.txt";

/// The three system-prompt templates, loaded once at startup and immutable
/// afterwards. Shared read-only across concurrent requests. The `Default`
/// set is empty and only suitable where prompt content is irrelevant.
#[derive(Debug, Clone, Default)]
pub struct PromptSet {
    full: String,
    minimal: String,
    follow_up: String,
}

impl PromptSet {
    /// Load all templates from `dir`. A missing or empty file is
    /// `PromptNotFound`; the service cannot run without its prompts.
    pub fn load(dir: &Path) -> Result<Self> {
        let set = Self {
            full: load_template(dir, FULL_PROMPT_FILE)?,
            minimal: load_template(dir, MINIMAL_PROMPT_FILE)?,
            follow_up: load_template(dir, FOLLOW_UP_PROMPT_FILE)?,
        };
        info!(dir = %dir.display(), "prompt templates loaded");
        Ok(set)
    }

    pub fn full(&self) -> &str {
        &self.full
    }

    pub fn minimal(&self) -> &str {
        &self.minimal
    }

    pub fn follow_up(&self) -> &str {
        &self.follow_up
    }

    pub fn for_tier(&self, tier: PromptTier) -> &str {
        match tier {
            PromptTier::Full => &self.full,
            PromptTier::Minimal => &self.minimal,
        }
    }
}

fn load_template(dir: &Path, name: &str) -> Result<String> {
    let path = dir.join(name);
    let content = std::fs::read_to_string(&path)
        .map_err(|_| Error::PromptNotFound(name.to_string()))?
        .trim()
        .to_string();
    if content.is_empty() {
        return Err(Error::PromptNotFound(name.to_string()));
    }
    Ok(content)
}

/// Render the follow-up user prompt: conversation so far, then the partial
/// ticket as `key: value` lines. The follow-up system prompt carries the
/// instructions; this is the context it operates on.
pub fn build_follow_up_prompt(ticket: &serde_json::Value, history: &[HistoryMessage]) -> String {
    let history_str = if history.is_empty() {
        "No prior conversation.".to_string()
    } else {
        history
            .iter()
            .map(|m| format!("{}: {}", m.role.as_str(), m.content))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let ticket_str = match ticket.as_object() {
        Some(fields) => fields
            .iter()
            .map(|(k, v)| match v.as_str() {
                Some(s) => format!("{k}: {s}"),
                None => format!("{k}: {v}"),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        None => ticket.to_string(),
    };

    format!("Conversation so far:\n{history_str}\n\nCurrent ticket:\n{ticket_str}\n")
}
