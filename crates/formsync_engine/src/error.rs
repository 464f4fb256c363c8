//! Error types for the sync engine.

use formsync_store::StoreError;
use serde_json::Value;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The connectivity check failed.
    #[error("no network connection")]
    NoNetwork,

    /// No user is signed in.
    #[error("no user found, sync cancelled")]
    NoUser,

    /// The server saved a response but rejected it in post-processing.
    #[error("response {id} rejected by the server")]
    Rejected {
        /// Id of the rejected response.
        id: String,
        /// Errors returned by the server.
        errors: Vec<Value>,
    },

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The server answered with a non-success status.
    #[error("server returned status {status}: {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// A request did not complete within the configured timeout.
    #[error("operation timed out")]
    Timeout,

    /// A local record the operation depends on does not exist.
    #[error("{collection} '{id}' not found")]
    MissingResource {
        /// Collection searched.
        collection: &'static str,
        /// Missing id or slug.
        id: String,
    },

    /// A payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),

    /// Local store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if the next cycle may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Server { status, .. } => *status >= 500,
            SyncError::NoNetwork | SyncError::Timeout => true,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Codec(err.to_string())
    }
}
