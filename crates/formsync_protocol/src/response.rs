//! Form responses, their answers, and the server's submit receipt.

use crate::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Lifecycle status of a form response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseStatus {
    /// Still being edited on the device.
    Draft,
    /// Submitted locally, waiting to reach the server.
    PendingSubmit,
    /// Accepted by the server.
    Synced,
    /// Saved by the server but rejected by post-processing.
    Rejected,
}

impl ResponseStatus {
    /// Returns the wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseStatus::Draft => "draft",
            ResponseStatus::PendingSubmit => "pending-submit",
            ResponseStatus::Synced => "synced",
            ResponseStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A captured formstack response, the unit the engine pushes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormResponse {
    /// Unique response id.
    pub id: String,
    /// Id of the form this response answers.
    pub fs_id: String,
    /// Slug of the form this response answers.
    pub fs_slug: String,
    /// Lifecycle status.
    pub status: ResponseStatus,
    /// When the server accepted the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<Timestamp>,
    /// Errors attached by the server on rejection.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<Value>,
}

impl FormResponse {
    /// Creates a new draft response.
    pub fn new(id: impl Into<String>, fs_id: impl Into<String>, fs_slug: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fs_id: fs_id.into(),
            fs_slug: fs_slug.into(),
            status: ResponseStatus::Draft,
            synced_at: None,
            errors: Vec::new(),
        }
    }

    /// Sets the status.
    pub fn with_status(mut self, status: ResponseStatus) -> Self {
        self.status = status;
        self
    }

    /// Returns true if the server rejected this response.
    pub fn is_rejected(&self) -> bool {
        self.status == ResponseStatus::Rejected
    }

    /// Returns true if the response is synced and was synced strictly more
    /// than `retention` before `now`.
    pub fn is_expired(&self, now: Timestamp, retention: Duration) -> bool {
        if self.status != ResponseStatus::Synced {
            return false;
        }
        let Some(synced_at) = self.synced_at else {
            return false;
        };
        match (now - synced_at).to_std() {
            Ok(age) => age > retention,
            // synced_at lies in the future
            Err(_) => false,
        }
    }
}

/// A single answer belonging to a form response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    /// Unique answer id.
    pub id: String,
    /// Id of the owning form response.
    pub fs_resp_id: String,
    /// Slug of the form inside the formstack.
    pub form_slug: String,
    /// Index of the repeatable block the answer belongs to.
    pub block: u32,
    /// Slug of the answered question.
    pub question_slug: String,
    /// Answer value as captured.
    pub value: Value,
}

/// Reply to a submission request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReceipt {
    /// Id of the submitted response.
    pub id: String,
    /// Status the server assigned.
    pub status: ResponseStatus,
    /// Slug of the form.
    #[serde(default)]
    pub fs_slug: String,
    /// Post-processing errors, present on rejection.
    #[serde(default)]
    pub errors: Vec<Value>,
}

impl SubmitReceipt {
    /// Returns true if the server saved the response but rejected it.
    pub fn is_rejected(&self) -> bool {
        self.status == ResponseStatus::Rejected
    }
}
