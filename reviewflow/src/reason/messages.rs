//! Deterministic skip/error message formatting.

use std::fmt;

use super::PipelineReason;
use crate::errors::StageError;

/// Payload appended to an error message.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorDetail {
    /// The message of an error value.
    Error(String),
    /// A plain string.
    Text(String),
    /// An arbitrary structured value, rendered as canonical JSON.
    Json(serde_json::Value),
}

impl ErrorDetail {
    /// Captures the display message of any error.
    #[must_use]
    pub fn from_error(err: &(dyn std::error::Error + '_)) -> Self {
        Self::Error(err.to_string())
    }

    fn render(&self) -> String {
        match self {
            Self::Error(message) | Self::Text(message) => message.clone(),
            // serde_json maps are key-sorted, so this is canonical
            Self::Json(value) => value.to_string(),
        }
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<&str> for ErrorDetail {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for ErrorDetail {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<serde_json::Value> for ErrorDetail {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

impl From<&StageError> for ErrorDetail {
    fn from(err: &StageError) -> Self {
        Self::Error(err.message.clone())
    }
}

/// `message`, then ` — action`, then ` (technical)`.
#[must_use]
pub fn skipped_with_reason(reason: &PipelineReason, technical: Option<&str>) -> String {
    let mut out = reason.message.clone();
    if let Some(action) = &reason.action {
        out.push_str(" — ");
        out.push_str(action);
    }
    if let Some(technical) = technical {
        out.push_str(" (");
        out.push_str(technical);
        out.push(')');
    }
    out
}

/// `user_message`, optionally followed by ` (Tech: reason)`.
#[must_use]
pub fn skipped(user_message: &str, technical_reason: Option<&str>) -> String {
    match technical_reason {
        Some(tech) => format!("{user_message} (Tech: {tech})"),
        None => user_message.to_string(),
    }
}

/// `user_message`, optionally followed by ` (Error: detail)`.
#[must_use]
pub fn error(user_message: &str, err: Option<&ErrorDetail>) -> String {
    match err {
        Some(detail) => format!("{user_message} (Error: {detail})"),
        None => user_message.to_string(),
    }
}
