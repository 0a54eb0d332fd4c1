//! Ticket schema and response envelope for callers of the backend.
//!
//! The backend itself returns raw model text; parsing it into these types
//! (and normalizing the location through the catalog) is the caller's job.

use serde::{Deserialize, Serialize};

/// Sentinel the model uses for fields it could not extract.
pub const UNKNOWN_FIELD: &str = "[INCONNU]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TicketCategory {
    Bug,
    Request,
    Incident,
    Question,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TicketPriority {
    Critical,
    High,
    Medium,
    Low,
}

/// A fully analyzed ticket as the model is prompted to emit it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub title: String,
    pub category: TicketCategory,
    pub priority: TicketPriority,
    pub location: String,
    pub description: String,
    /// User frustration level, 1 (calm) to 5 (furious).
    pub frustration: u8,
}

impl Ticket {
    pub fn has_location(&self) -> bool {
        !self.location.is_empty() && self.location != UNKNOWN_FIELD
    }
}

/// Uniform success/failure envelope emitted by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiResponse {
    pub fn success(data: serde_json::Value, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: message.into(),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: message.into(),
            error: Some(error.into()),
        }
    }

    /// Soft failure: the model answered, but not with parseable JSON. The
    /// raw text is kept in `data` so nothing the user typed is lost.
    pub fn invalid_model_output(raw: String, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Some(serde_json::Value::String(raw)),
            message: "Model returned an invalid or empty response".into(),
            error: Some(error.into()),
        }
    }
}
