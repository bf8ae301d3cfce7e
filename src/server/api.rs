//! Request and response types for the review API.

use serde::{Deserialize, Serialize};

/// Summary of one session log, as returned by `GET /api/sessions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Log filename, which is also the progress key for root views.
    pub filename: String,
    /// Label from the session header; empty when the log has none.
    pub label: String,
    /// Number of message entries in the log.
    pub total_messages: usize,
    /// Messages beyond the stored watermark.
    pub unread_messages: usize,
    /// Number of flagged tool calls in the log.
    pub danger_count: usize,
}

/// Body for `POST /api/progress`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    /// Log key the watermark belongs to (filename or child session key).
    pub key: String,
    /// Entry id acknowledged as read.
    pub entry_id: String,
}

/// Generic result body for mutating endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResponse {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Human-readable outcome.
    pub message: String,
    /// Error detail, present only on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OperationResponse {
    /// Successful outcome.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            error: None,
        }
    }

    /// Failed outcome with detail.
    #[must_use]
    pub fn error(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error: Some(error.into()),
        }
    }
}
