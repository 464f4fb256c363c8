//! Error types for store operations.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The snapshot could not be encoded or decoded.
    #[error("snapshot codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// No document with the given id exists.
    #[error("no document '{id}' in collection '{collection}'")]
    NotFound {
        /// Collection searched.
        collection: &'static str,
        /// Missing document id.
        id: String,
    },
}
