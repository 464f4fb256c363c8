//! Retention sweeper for responses the server already holds.

use crate::error::SyncResult;
use crate::ledger::StatusLedger;
use chrono::Utc;
use formsync_protocol::{collections, Answer, FormResponse};
use formsync_store::LocalStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Removes synced responses once they are older than the retention window.
///
/// Only `synced` responses are ever swept. Drafts, pending and rejected
/// responses stay until something else changes their status.
#[derive(Clone)]
pub struct RetentionSweeper {
    store: Arc<LocalStore>,
    ledger: StatusLedger,
}

impl RetentionSweeper {
    /// Creates a sweeper over the store and its ledger.
    pub fn new(store: Arc<LocalStore>, ledger: StatusLedger) -> Self {
        Self { store, ledger }
    }

    /// Sweeps every synced response whose `syncedAt` lies strictly more
    /// than `retention` in the past, together with its answers and ledger
    /// entry.
    ///
    /// Returns the ids of the removed responses.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be persisted.
    pub fn sweep(&self, retention: Duration) -> SyncResult<Vec<String>> {
        let now = Utc::now();
        let expired = self
            .store
            .find(|r: &FormResponse| r.is_expired(now, retention));
        if expired.is_empty() {
            debug!("nothing to sweep");
            return Ok(Vec::new());
        }

        let mut removed = Vec::with_capacity(expired.len());
        for response in expired {
            if !self.ledger.purge(collections::RESPONSES, &response.id) {
                warn!(id = %response.id, "swept response had no ledger entry");
            }
            let answers = self
                .store
                .remove_where(|a: &Answer| a.fs_resp_id == response.id);
            self.store
                .remove_where(|r: &FormResponse| r.id == response.id);
            debug!(id = %response.id, answers = answers.len(), "response swept");
            if !removed.contains(&response.id) {
                removed.push(response.id);
            }
        }

        self.store.save()?;
        info!(count = removed.len(), "swept synced responses");
        Ok(removed)
    }
}
