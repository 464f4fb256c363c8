//! CLI error type.

use formsync_engine::SyncError;
use formsync_store::StoreError;
use thiserror::Error;

/// Errors surfaced by CLI commands.
#[derive(Error, Debug)]
pub enum CliError {
    /// Missing or invalid arguments.
    #[error("{0}")]
    Usage(String),

    /// Store error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Sync error.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Output could not be encoded.
    #[error("output encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client could not be built.
    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),
}
