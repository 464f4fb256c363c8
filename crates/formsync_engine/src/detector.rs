//! Change detection: which responses need a push.

use crate::ledger::StatusLedger;
use formsync_protocol::{collections, FormResponse};
use formsync_store::LocalStore;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Responses selected for a push, with the change notifications that led
/// to each of them.
#[derive(Debug, Clone, Default)]
pub struct PendingSet {
    records: Vec<FormResponse>,
    sequences: HashMap<String, Vec<u64>>,
    stale: Vec<u64>,
    high_water: Option<u64>,
}

impl PendingSet {
    /// Returns the selected responses, in discovery order.
    pub fn records(&self) -> &[FormResponse] {
        &self.records
    }

    /// Consumes the set, returning the selected responses.
    pub fn into_records(self) -> Vec<FormResponse> {
        self.records
    }

    /// Returns the ids of the selected responses, in discovery order.
    pub fn ids(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.id.as_str()).collect()
    }

    /// Returns the number of selected responses.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing needs a push.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the change sequences consumed for the given responses.
    pub fn sequences_for<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> Vec<u64> {
        ids.into_iter()
            .filter_map(|id| self.sequences.get(id))
            .flatten()
            .copied()
            .collect()
    }

    /// Returns the change sequences that selected nothing: inserts, and
    /// notifications for responses that are gone or rejected.
    pub fn stale_sequences(&self) -> &[u64] {
        &self.stale
    }

    /// Returns the highest change sequence consumed, if any.
    pub fn high_water(&self) -> Option<u64> {
        self.high_water
    }
}

/// Produces the set of responses needing a push.
///
/// The set is the union, deduplicated by id in discovery order, of:
///
/// 1. responses named by unacknowledged change notifications, and
/// 2. responses whose ledger entry is still pending (earlier attempts that
///    never resolved, typically because the device went offline).
///
/// Rejected responses are never selected. Insert notifications carry no id
/// and are dropped; the update that follows every insert names the record.
pub struct ChangeDetector {
    store: Arc<LocalStore>,
    ledger: StatusLedger,
}

impl ChangeDetector {
    /// Creates a detector over the store and its ledger.
    pub fn new(store: Arc<LocalStore>, ledger: StatusLedger) -> Self {
        Self { store, ledger }
    }

    /// Returns the responses that need a push.
    pub fn pending_push_set(&self) -> PendingSet {
        let mut set = PendingSet::default();

        for change in self.store.changes_since(&[collections::RESPONSES]) {
            set.high_water = set.high_water.max(Some(change.sequence));
            let Some(id) = change.record_id else {
                set.stale.push(change.sequence);
                continue;
            };
            match self.selectable(&id) {
                Some(record) => {
                    set.sequences.entry(id).or_default().push(change.sequence);
                    if !set.records.iter().any(|r| r.id == record.id) {
                        set.records.push(record);
                    }
                }
                None => set.stale.push(change.sequence),
            }
        }
        let changed = set.records.len();

        for entry in self.ledger.pending(collections::RESPONSES) {
            if set.records.iter().any(|r| r.id == entry.resource_id) {
                continue;
            }
            if let Some(record) = self.selectable(&entry.resource_id) {
                set.records.push(record);
            }
        }

        debug!(
            changed,
            retried = set.records.len() - changed,
            "pending push set built"
        );
        set
    }

    /// Returns the response if it exists and is not rejected.
    fn selectable(&self, id: &str) -> Option<FormResponse> {
        let mut matches = self.store.find(|r: &FormResponse| r.id == id);
        if matches.len() > 1 {
            warn!(id, count = matches.len(), "duplicate responses, using the first one");
        }
        if matches.is_empty() {
            return None;
        }
        let record = matches.swap_remove(0);
        (!record.is_rejected()).then_some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formsync_protocol::{HttpMethod, LedgerOutcome, ResponseStatus};

    fn setup() -> (Arc<LocalStore>, StatusLedger, ChangeDetector) {
        let store = Arc::new(LocalStore::in_memory());
        store.track_changes(collections::RESPONSES);
        let ledger = StatusLedger::new(Arc::clone(&store));
        let detector = ChangeDetector::new(Arc::clone(&store), ledger.clone());
        (store, ledger, detector)
    }

    fn save_response(store: &LocalStore, id: &str, status: ResponseStatus) {
        store.insert(FormResponse::new(id, "f1", "intake"));
        store
            .update(FormResponse::new(id, "f1", "intake").with_status(status))
            .unwrap();
    }

    #[test]
    fn repeated_changes_select_once() {
        let (store, _, detector) = setup();
        save_response(&store, "r1", ResponseStatus::PendingSubmit);
        store
            .update(FormResponse::new("r1", "f1", "intake").with_status(ResponseStatus::PendingSubmit))
            .unwrap();

        let set = detector.pending_push_set();
        assert_eq!(set.ids(), vec!["r1"]);
        assert_eq!(set.sequences_for(["r1"]), vec![2, 3]);
        assert_eq!(set.stale_sequences(), &[1]);
        assert_eq!(set.high_water(), Some(3));
    }

    #[test]
    fn insert_only_is_not_selected() {
        let (store, _, detector) = setup();
        store.insert(FormResponse::new("r1", "f1", "intake"));

        let set = detector.pending_push_set();
        assert!(set.is_empty());
        assert_eq!(set.stale_sequences(), &[1]);
    }

    #[test]
    fn untouched_draft_is_not_selected() {
        let store = Arc::new(LocalStore::in_memory());
        store.insert(FormResponse::new("r1", "f1", "intake"));
        store.track_changes(collections::RESPONSES);
        let detector = ChangeDetector::new(Arc::clone(&store), StatusLedger::new(Arc::clone(&store)));

        assert!(detector.pending_push_set().is_empty());
    }

    #[test]
    fn rejected_responses_are_excluded() {
        let (store, ledger, detector) = setup();
        save_response(&store, "r1", ResponseStatus::Rejected);
        ledger
            .record_attempt(collections::RESPONSES, "r1", HttpMethod::Post, "u")
            .unwrap();

        let set = detector.pending_push_set();
        assert!(set.is_empty());
        assert_eq!(set.stale_sequences(), &[1, 2]);
    }

    #[test]
    fn pending_ledger_entries_are_included() {
        let (store, ledger, detector) = setup();
        save_response(&store, "r3", ResponseStatus::Synced);
        save_response(&store, "r1", ResponseStatus::PendingSubmit);
        store.acknowledge_changes(4);
        save_response(&store, "r2", ResponseStatus::PendingSubmit);

        for id in ["r1", "r2", "r3"] {
            ledger
                .record_attempt(collections::RESPONSES, id, HttpMethod::Post, "u")
                .unwrap();
        }
        // Settled entries are not revisited.
        ledger
            .mark_outcome(collections::RESPONSES, "r3", LedgerOutcome::Success)
            .unwrap();

        let set = detector.pending_push_set();
        assert_eq!(set.ids(), vec!["r2", "r1"]);
        assert_eq!(set.sequences_for(["r1", "r2"]), vec![6]);
    }

    #[test]
    fn pending_entry_for_missing_response_is_skipped() {
        let (_, ledger, detector) = setup();
        ledger
            .record_attempt(collections::RESPONSES, "gone", HttpMethod::Post, "u")
            .unwrap();
        assert!(detector.pending_push_set().is_empty());
    }

    #[test]
    fn removed_response_notification_is_stale() {
        let (store, _, detector) = setup();
        save_response(&store, "r1", ResponseStatus::PendingSubmit);
        store.remove::<FormResponse>("r1").unwrap();

        let set = detector.pending_push_set();
        assert!(set.is_empty());
        assert_eq!(set.stale_sequences(), &[1, 2, 3]);
    }
}
