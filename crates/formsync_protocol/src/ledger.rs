//! Sync-attempt ledger entries.

use crate::Timestamp;
use serde::{Deserialize, Serialize};

/// Status of the latest attempt for a tracked resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerStatus {
    /// An attempt is in flight or never resolved.
    Pending,
    /// The last attempt reached the server.
    Success,
    /// The last attempt failed in transport or on the server.
    Fail,
}

/// Resolved outcome of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOutcome {
    /// The request reached the server and was answered.
    Success,
    /// The request failed.
    Fail,
}

impl From<LedgerOutcome> for LedgerStatus {
    fn from(outcome: LedgerOutcome) -> Self {
        match outcome {
            LedgerOutcome::Success => LedgerStatus::Success,
            LedgerOutcome::Fail => LedgerStatus::Fail,
        }
    }
}

/// HTTP method of a tracked request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// Reference data fetch.
    Get,
    /// Response submission.
    Post,
}

/// One tracked resource in the status ledger.
///
/// # Invariants
///
/// - At most one entry exists per `(collection, resource_id)`
/// - `attempts` counts every attempt, including the first
/// - `last_success`, when set, equals the `last_attempt` of the latest
///   successful attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    /// Store key of the entry.
    pub id: String,
    /// Collection owning the tracked resource.
    pub collection: String,
    /// Id of the tracked resource.
    pub resource_id: String,
    /// Status of the latest attempt.
    pub status: LedgerStatus,
    /// Number of attempts made.
    pub attempts: u32,
    /// Start time of the latest attempt.
    pub last_attempt: Timestamp,
    /// Start time of the latest successful attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success: Option<Timestamp>,
    /// HTTP method used.
    pub method: HttpMethod,
    /// Target resource URI.
    pub resource_uri: String,
}

impl LedgerEntry {
    /// Returns true if this entry tracks the given resource.
    pub fn tracks(&self, collection: &str, resource_id: &str) -> bool {
        self.collection == collection && self.resource_id == resource_id
    }

    /// Returns true if the latest attempt is unresolved.
    pub fn is_pending(&self) -> bool {
        self.status == LedgerStatus::Pending
    }
}
