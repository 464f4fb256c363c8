//! The local document store.

use crate::backend::StoreBackend;
use crate::change_log::ChangeLog;
use crate::document::{Document, Tables};
use crate::error::{StoreError, StoreResult};
use crate::memory::InMemoryBackend;
use formsync_protocol::ChangeNotification;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// On-disk layout: the collections at the top level, the change log
/// beside them. Snapshots written without a change log load with an empty one.
#[derive(Serialize)]
struct SnapshotRef<'a> {
    #[serde(flatten)]
    tables: &'a Tables,
    #[serde(rename = "_changes")]
    changes: &'a ChangeLog,
}

#[derive(Deserialize)]
struct Snapshot {
    #[serde(flatten)]
    tables: Tables,
    #[serde(default, rename = "_changes")]
    changes: ChangeLog,
}

/// Typed collections, a change log, and a snapshot backend.
///
/// Only collections registered with [`LocalStore::track_changes`] feed the
/// change log. Collections behave like lists: nothing enforces id uniqueness, so
/// callers that need a single match must check for duplicates themselves.
/// Lookups by id return the first match.
///
/// # Example
///
/// ```rust
/// use formsync_protocol::FormResponse;
/// use formsync_store::LocalStore;
///
/// let store = LocalStore::in_memory();
/// store.track_changes("fsResp");
/// store.insert(FormResponse::new("r1", "f1", "intake"));
/// assert!(store.get::<FormResponse>("r1").is_some());
/// store.save().unwrap();
/// ```
pub struct LocalStore {
    tables: RwLock<Tables>,
    changes: RwLock<ChangeLog>,
    tracked: RwLock<Vec<&'static str>>,
    backend: Box<dyn StoreBackend>,
}

impl LocalStore {
    /// Opens a store, loading the backend's latest snapshot if any.
    ///
    /// Unacknowledged change notifications saved with the snapshot are
    /// restored.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be read or decoded.
    pub fn open(backend: Box<dyn StoreBackend>) -> StoreResult<Self> {
        let snapshot = match backend.load()? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => Snapshot {
                tables: Tables::default(),
                changes: ChangeLog::new(),
            },
        };
        if !snapshot.changes.is_empty() {
            debug!(changes = snapshot.changes.len(), "restored change log");
        }
        Ok(Self {
            tables: RwLock::new(snapshot.tables),
            changes: RwLock::new(snapshot.changes),
            tracked: RwLock::new(Vec::new()),
            backend,
        })
    }

    /// Creates an empty store backed by memory.
    pub fn in_memory() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            changes: RwLock::new(ChangeLog::new()),
            tracked: RwLock::new(Vec::new()),
            backend: Box::new(InMemoryBackend::new()),
        }
    }

    /// Starts logging mutations of the collection. Idempotent.
    pub fn track_changes(&self, collection: &'static str) {
        let mut tracked = self.tracked.write();
        if !tracked.contains(&collection) {
            tracked.push(collection);
        }
    }

    fn log_change(&self, collection: &str, make: impl FnOnce(u64) -> ChangeNotification) -> Option<u64> {
        if !self.tracked.read().contains(&collection) {
            return None;
        }
        Some(self.changes.write().record(make))
    }

    /// Returns every document matching the predicate, in insertion order.
    pub fn find<T: Document>(&self, predicate: impl Fn(&T) -> bool) -> Vec<T> {
        T::table(&self.tables.read())
            .iter()
            .filter(|doc| predicate(doc))
            .cloned()
            .collect()
    }

    /// Returns the first document with the given id.
    pub fn get<T: Document>(&self, id: &str) -> Option<T> {
        T::table(&self.tables.read())
            .iter()
            .find(|doc| doc.id() == id)
            .cloned()
    }

    /// Returns every document of the collection.
    pub fn all<T: Document>(&self) -> Vec<T> {
        T::table(&self.tables.read()).clone()
    }

    /// Returns the number of documents in the collection.
    pub fn count<T: Document>(&self) -> usize {
        T::table(&self.tables.read()).len()
    }

    /// Appends a document. The change log records an id-less insert.
    pub fn insert<T: Document>(&self, doc: T) {
        let mut tables = self.tables.write();
        T::table_mut(&mut tables).push(doc);
        self.log_change(T::COLLECTION, |seq| {
            ChangeNotification::insert(seq, T::COLLECTION)
        });
    }

    /// Replaces the first document with the same id.
    ///
    /// Returns the sequence number of the logged change, if the collection
    /// is tracked.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such document exists.
    pub fn update<T: Document>(&self, doc: T) -> StoreResult<Option<u64>> {
        let mut tables = self.tables.write();
        let slot = T::table_mut(&mut tables)
            .iter_mut()
            .find(|existing| existing.id() == doc.id())
            .ok_or_else(|| StoreError::NotFound {
                collection: T::COLLECTION,
                id: doc.id().to_string(),
            })?;
        let id = doc.id().to_string();
        *slot = doc;
        Ok(self.log_change(T::COLLECTION, |seq| {
            ChangeNotification::update(seq, T::COLLECTION, id)
        }))
    }

    /// Updates the document if present, inserts it otherwise.
    pub fn upsert<T: Document>(&self, doc: T) {
        let exists = self.get::<T>(doc.id()).is_some();
        if exists {
            // Only fails if the document vanished in between.
            if let Err(StoreError::NotFound { .. }) = self.update(doc.clone()) {
                self.insert(doc);
            }
        } else {
            self.insert(doc);
        }
    }

    /// Removes and returns the first document with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such document exists.
    pub fn remove<T: Document>(&self, id: &str) -> StoreResult<T> {
        let mut tables = self.tables.write();
        let table = T::table_mut(&mut tables);
        let index = table
            .iter()
            .position(|doc| doc.id() == id)
            .ok_or_else(|| StoreError::NotFound {
                collection: T::COLLECTION,
                id: id.to_string(),
            })?;
        let removed = table.remove(index);
        self.log_change(T::COLLECTION, |seq| {
            ChangeNotification::remove(seq, T::COLLECTION, id)
        });
        Ok(removed)
    }

    /// Removes every document matching the predicate and returns them.
    pub fn remove_where<T: Document>(&self, predicate: impl Fn(&T) -> bool) -> Vec<T> {
        let mut tables = self.tables.write();
        let table = T::table_mut(&mut tables);
        let (removed, kept): (Vec<T>, Vec<T>) = table.drain(..).partition(|doc| predicate(doc));
        *table = kept;

        for doc in &removed {
            self.log_change(T::COLLECTION, |seq| {
                ChangeNotification::remove(seq, T::COLLECTION, doc.id())
            });
        }
        removed
    }

    /// Persists a snapshot of every collection and of the unacknowledged
    /// change notifications.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the backend write fails.
    pub fn save(&self) -> StoreResult<()> {
        let bytes = {
            let tables = self.tables.read();
            let changes = self.changes.read();
            serde_json::to_vec(&SnapshotRef {
                tables: &tables,
                changes: &changes,
            })?
        };
        self.backend.persist(&bytes)?;
        debug!(bytes = bytes.len(), "store snapshot persisted");
        Ok(())
    }

    /// Returns the unacknowledged change notifications for the collections.
    pub fn changes_since(&self, collections: &[&str]) -> Vec<ChangeNotification> {
        self.changes.read().since(collections)
    }

    /// Drops change notifications up to and including `sequence`.
    pub fn acknowledge_changes(&self, sequence: u64) {
        self.changes.write().acknowledge_up_to(sequence);
    }

    /// Drops the change notifications with the given sequence numbers.
    pub fn discard_changes(&self, sequences: &[u64]) {
        if !sequences.is_empty() {
            self.changes.write().discard(sequences);
        }
    }

    /// Returns the number of unacknowledged change notifications.
    pub fn pending_change_count(&self) -> usize {
        self.changes.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formsync_protocol::{collections, Answer, ChangeOp, FormResponse, ResponseStatus};
    use serde_json::json;

    fn response(id: &str) -> FormResponse {
        FormResponse::new(id, "f1", "intake")
    }

    fn tracked_store() -> LocalStore {
        let store = LocalStore::in_memory();
        store.track_changes(collections::RESPONSES);
        store
    }

    #[test]
    fn untracked_collections_log_nothing() {
        let store = LocalStore::in_memory();
        store.insert(response("r1"));
        assert_eq!(store.update(response("r1")).unwrap(), None);
        assert_eq!(store.pending_change_count(), 0);
    }

    #[test]
    fn insert_logs_change_without_id() {
        let store = tracked_store();
        store.insert(response("r1"));

        let changes = store.changes_since(&[collections::RESPONSES]);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].op, ChangeOp::Insert);
        assert!(changes[0].record_id.is_none());
    }

    #[test]
    fn update_replaces_and_logs_id() {
        let store = tracked_store();
        store.insert(response("r1"));
        let seq = store
            .update(response("r1").with_status(ResponseStatus::PendingSubmit))
            .unwrap();
        assert_eq!(seq, Some(2));

        let stored: FormResponse = store.get("r1").unwrap();
        assert_eq!(stored.status, ResponseStatus::PendingSubmit);

        let changes = store.changes_since(&[collections::RESPONSES]);
        assert_eq!(changes[1].record_id.as_deref(), Some("r1"));
    }

    #[test]
    fn update_missing_is_not_found() {
        let store = LocalStore::in_memory();
        let err = store.update(response("nope")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { id, .. } if id == "nope"));
    }

    #[test]
    fn upsert_inserts_then_updates() {
        let store = LocalStore::in_memory();
        store.upsert(response("r1"));
        store.upsert(response("r1").with_status(ResponseStatus::Synced));
        assert_eq!(store.count::<FormResponse>(), 1);
        assert_eq!(
            store.get::<FormResponse>("r1").unwrap().status,
            ResponseStatus::Synced
        );
    }

    #[test]
    fn remove_and_remove_where() {
        let store = LocalStore::in_memory();
        store.insert(response("r1"));
        for (i, q) in ["q1", "q2"].iter().enumerate() {
            store.insert(Answer {
                id: format!("a{i}"),
                fs_resp_id: "r1".into(),
                form_slug: "intake".into(),
                block: 0,
                question_slug: (*q).into(),
                value: json!(i),
            });
        }

        let removed: FormResponse = store.remove("r1").unwrap();
        assert_eq!(removed.id, "r1");
        assert!(store.remove::<FormResponse>("r1").is_err());

        let answers: Vec<Answer> = store.remove_where(|a: &Answer| a.fs_resp_id == "r1");
        assert_eq!(answers.len(), 2);
        assert_eq!(store.count::<Answer>(), 0);
    }

    #[test]
    fn acknowledge_clears_changes() {
        let store = tracked_store();
        store.insert(response("r1"));
        store.update(response("r1")).unwrap();
        store.update(response("r1")).unwrap();
        assert_eq!(store.pending_change_count(), 3);

        store.discard_changes(&[3]);
        assert_eq!(store.pending_change_count(), 2);
        store.acknowledge_changes(2);
        assert_eq!(store.pending_change_count(), 0);
    }

    #[test]
    fn find_filters() {
        let store = LocalStore::in_memory();
        store.insert(response("r1"));
        store.insert(response("r2").with_status(ResponseStatus::Rejected));

        let open = store.find(|r: &FormResponse| !r.is_rejected());
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, "r1");
    }
}
