//! Skip and failure reasons.
//!
//! A [`PipelineReason`] separates the stable user-facing message from
//! guidance (`action`) and diagnostic detail (`description`). The
//! [`messages`] functions turn reasons and errors into the only strings ever
//! shown outward.

pub mod messages;

use serde::{Deserialize, Serialize};

pub use messages::ErrorDetail;

/// Why a stage was skipped or failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineReason {
    /// Stable user-facing message.
    pub message: String,
    /// What the user can do about it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Diagnostic detail, never shown to end users.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PipelineReason {
    /// Creates a reason with only a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            action: None,
            description: None,
        }
    }

    /// Sets the user action.
    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Sets the diagnostic description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Formats this reason with [`messages::skipped_with_reason`].
    #[must_use]
    pub fn format(&self, technical: Option<&str>) -> String {
        messages::skipped_with_reason(self, technical)
    }
}

impl From<&str> for PipelineReason {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}
