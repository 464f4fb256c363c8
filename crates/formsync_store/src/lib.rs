//! # FormSync Store
//!
//! The local document store the sync engine reads and mutates.
//!
//! This crate provides:
//! - `LocalStore`, typed collections with find/insert/update/remove
//! - `ChangeLog`, sequence-numbered change notifications
//! - `StoreBackend` trait for snapshot persistence
//! - `InMemoryBackend` and `FileBackend` implementations
//!
//! ## Persistence
//!
//! Mutations only touch memory. `save()` serializes every collection, and
//! the unacknowledged part of the change log, into one JSON snapshot and
//! hands it to the backend. Reopening the store restores both, so changes
//! a failed push left behind are still there after a restart.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod change_log;
mod document;
mod error;
mod file;
mod memory;
mod store;

pub use backend::StoreBackend;
pub use change_log::ChangeLog;
pub use document::{Document, Tables};
pub use error::{StoreError, StoreResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
pub use store::LocalStore;
