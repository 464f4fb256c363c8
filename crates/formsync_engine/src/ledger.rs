//! Status ledger: per-resource sync attempt tracking.

use crate::error::SyncResult;
use chrono::Utc;
use formsync_protocol::endpoints::watermark_epoch;
use formsync_protocol::{HttpMethod, LedgerEntry, LedgerOutcome, LedgerStatus, Timestamp};
use formsync_store::LocalStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Tracks sync attempts for every synced resource.
///
/// Entries live in the store's ledger collection and are keyed by
/// `(collection, resource_id)`. Nothing in the store prevents two callers
/// from racing to create the same entry, so every lookup checks for
/// duplicates, logs them, and carries on with the first match.
///
/// The ledger never persists on its own; callers save the store once the
/// operation they track has resolved.
#[derive(Clone)]
pub struct StatusLedger {
    store: Arc<LocalStore>,
}

impl StatusLedger {
    /// Creates a ledger over the given store.
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    /// Returns every entry tracking the resource. More than one is a bug.
    pub fn entries(&self, collection: &str, resource_id: &str) -> Vec<LedgerEntry> {
        self.store
            .find(|e: &LedgerEntry| e.tracks(collection, resource_id))
    }

    /// Returns the entry tracking the resource, warning on duplicates.
    pub fn entry(&self, collection: &str, resource_id: &str) -> Option<LedgerEntry> {
        let mut entries = self.entries(collection, resource_id);
        if entries.len() > 1 {
            warn!(
                collection,
                resource_id,
                count = entries.len(),
                "duplicate ledger entries, using the first one"
            );
        }
        (!entries.is_empty()).then(|| entries.swap_remove(0))
    }

    /// Returns the entries of a collection whose latest attempt is pending.
    pub fn pending(&self, collection: &str) -> Vec<LedgerEntry> {
        self.store
            .find(|e: &LedgerEntry| e.collection == collection && e.is_pending())
    }

    /// Records a new attempt for the resource.
    ///
    /// Creates the entry with one attempt if none exists; otherwise bumps
    /// the attempt count, resets the status to pending, and refreshes the
    /// attempt time, method and URI.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the update.
    pub fn record_attempt(
        &self,
        collection: &str,
        resource_id: &str,
        method: HttpMethod,
        uri: &str,
    ) -> SyncResult<LedgerEntry> {
        let now = Utc::now();
        let entry = match self.entry(collection, resource_id) {
            Some(mut entry) => {
                entry.attempts += 1;
                entry.status = LedgerStatus::Pending;
                entry.last_attempt = now;
                entry.method = method;
                entry.resource_uri = uri.to_string();
                self.store.update(entry.clone())?;
                entry
            }
            None => {
                let entry = LedgerEntry {
                    id: uuid::Uuid::new_v4().to_string(),
                    collection: collection.to_string(),
                    resource_id: resource_id.to_string(),
                    status: LedgerStatus::Pending,
                    attempts: 1,
                    last_attempt: now,
                    last_success: None,
                    method,
                    resource_uri: uri.to_string(),
                };
                self.store.insert(entry.clone());
                entry
            }
        };
        debug!(collection, resource_id, attempts = entry.attempts, "attempt recorded");
        Ok(entry)
    }

    /// Records the outcome of the latest attempt.
    ///
    /// A missing entry means tracking was lost somewhere; it is logged and
    /// otherwise ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the update.
    pub fn mark_outcome(
        &self,
        collection: &str,
        resource_id: &str,
        outcome: LedgerOutcome,
    ) -> SyncResult<()> {
        let Some(mut entry) = self.entry(collection, resource_id) else {
            warn!(collection, resource_id, ?outcome, "no ledger entry to mark");
            return Ok(());
        };
        entry.status = outcome.into();
        if outcome == LedgerOutcome::Success {
            entry.last_success = Some(entry.last_attempt);
        }
        self.store.update(entry)?;
        Ok(())
    }

    /// Removes every entry tracking the resource.
    ///
    /// Returns true if anything was removed.
    pub fn purge(&self, collection: &str, resource_id: &str) -> bool {
        let removed = self
            .store
            .remove_where(|e: &LedgerEntry| e.tracks(collection, resource_id));
        if removed.len() > 1 {
            warn!(collection, resource_id, count = removed.len(), "purged duplicate ledger entries");
        }
        !removed.is_empty()
    }

    /// Returns the time to fetch changes from: the start of the latest
    /// successful attempt, or the fixed epoch if there never was one.
    pub fn watermark(&self, collection: &str, resource_id: &str) -> Timestamp {
        self.entry(collection, resource_id)
            .and_then(|e| e.last_success)
            .unwrap_or_else(watermark_epoch)
    }
}
