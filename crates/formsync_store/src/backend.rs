//! Snapshot backend trait definition.

use crate::error::StoreResult;

/// Durable home of the store snapshot.
///
/// Backends are **opaque byte stores** holding one snapshot at a time. The
/// store owns the snapshot format; backends never interpret it.
///
/// # Invariants
///
/// - `load` returns exactly the bytes of the latest successful `persist`
/// - A failed `persist` leaves the previous snapshot intact
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent storage
pub trait StoreBackend: Send + Sync {
    /// Loads the latest snapshot, or `None` if nothing was persisted yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot exists but cannot be read.
    fn load(&self) -> StoreResult<Option<Vec<u8>>>;

    /// Replaces the stored snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written durably.
    fn persist(&self, snapshot: &[u8]) -> StoreResult<()>;
}

impl<B: StoreBackend + ?Sized> StoreBackend for std::sync::Arc<B> {
    fn load(&self) -> StoreResult<Option<Vec<u8>>> {
        (**self).load()
    }

    fn persist(&self, snapshot: &[u8]) -> StoreResult<()> {
        (**self).persist(snapshot)
    }
}
