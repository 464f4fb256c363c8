//! In-memory snapshot backend for testing.

use crate::backend::StoreBackend;
use crate::error::StoreResult;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

/// An in-memory snapshot backend.
///
/// Keeps the latest snapshot in memory and counts how many times it was
/// persisted, which lets tests assert on save behavior.
///
/// # Example
///
/// ```rust
/// use formsync_store::{InMemoryBackend, StoreBackend};
///
/// let backend = InMemoryBackend::new();
/// backend.persist(b"{}").unwrap();
/// assert_eq!(backend.load().unwrap(), Some(b"{}".to_vec()));
/// assert_eq!(backend.persist_count(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    snapshot: RwLock<Option<Vec<u8>>>,
    persists: AtomicUsize,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend holding an existing snapshot.
    #[must_use]
    pub fn with_snapshot(snapshot: Vec<u8>) -> Self {
        Self {
            snapshot: RwLock::new(Some(snapshot)),
            persists: AtomicUsize::new(0),
        }
    }

    /// Returns how many times a snapshot was persisted.
    #[must_use]
    pub fn persist_count(&self) -> usize {
        self.persists.load(Ordering::SeqCst)
    }
}

impl StoreBackend for InMemoryBackend {
    fn load(&self) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.snapshot.read().clone())
    }

    fn persist(&self, snapshot: &[u8]) -> StoreResult<()> {
        *self.snapshot.write() = Some(snapshot.to_vec());
        self.persists.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_backend_loads_nothing() {
        let backend = InMemoryBackend::new();
        assert!(backend.load().unwrap().is_none());
        assert_eq!(backend.persist_count(), 0);
    }

    #[test]
    fn persist_replaces_snapshot() {
        let backend = InMemoryBackend::with_snapshot(b"old".to_vec());
        backend.persist(b"new").unwrap();
        assert_eq!(backend.load().unwrap(), Some(b"new".to_vec()));
        assert_eq!(backend.persist_count(), 1);
    }
}
