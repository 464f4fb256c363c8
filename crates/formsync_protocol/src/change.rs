//! Change notifications emitted by the local store.

use serde::{Deserialize, Serialize};

/// Kind of mutation a notification describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    /// Document was inserted.
    Insert,
    /// Document was updated in place.
    Update,
    /// Document was removed.
    Remove,
}

/// A single mutation recorded by the local store.
///
/// Insert notifications carry no record id: the store logs them before
/// the record is keyed, so consumers see the record on its next update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNotification {
    /// Monotonic sequence number assigned by the store.
    pub sequence: u64,
    /// Collection the mutation applies to.
    pub collection: String,
    /// Kind of mutation.
    pub op: ChangeOp,
    /// Affected record id, absent for inserts.
    pub record_id: Option<String>,
}

impl ChangeNotification {
    /// Creates an insert notification.
    pub fn insert(sequence: u64, collection: impl Into<String>) -> Self {
        Self {
            sequence,
            collection: collection.into(),
            op: ChangeOp::Insert,
            record_id: None,
        }
    }

    /// Creates an update notification.
    pub fn update(sequence: u64, collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            sequence,
            collection: collection.into(),
            op: ChangeOp::Update,
            record_id: Some(id.into()),
        }
    }

    /// Creates a remove notification.
    pub fn remove(sequence: u64, collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            sequence,
            collection: collection.into(),
            op: ChangeOp::Remove,
            record_id: Some(id.into()),
        }
    }
}
