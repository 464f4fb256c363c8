//! Transport layer abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use formsync_protocol::{ResponseStatus, SubmitReceipt, Timestamp};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

/// A transport handles network communication with the forms server.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, mock for testing, etc.). Results are delivered
/// when the returned future resolves; implementations must not block.
pub trait Transport: Send + Sync {
    /// Checks whether the server is reachable.
    fn ping(&self) -> impl Future<Output = bool> + Send;

    /// Fetches a resource modified since `since`.
    ///
    /// Returns `Ok(None)` when the server reports no changes.
    fn fetch(
        &self,
        uri: &str,
        since: Timestamp,
    ) -> impl Future<Output = SyncResult<Option<Value>>> + Send;

    /// Submits a full response body.
    ///
    /// A response the server saved but rejected is reported as
    /// [`SyncError::Rejected`] or as a receipt with status `rejected`.
    fn submit(
        &self,
        uri: &str,
        body: &Value,
    ) -> impl Future<Output = SyncResult<SubmitReceipt>> + Send;
}

/// Scripted reply to a submission.
#[derive(Debug, Clone)]
pub enum MockSubmit {
    /// Accept with the given status.
    Accept(ResponseStatus),
    /// Save but reject with the given errors.
    Reject(Vec<Value>),
    /// Fail in transport with the given message.
    Fail(String),
    /// Never answer.
    Hang,
}

/// Scripted reply to a fetch.
#[derive(Debug, Clone)]
pub enum MockFetch {
    /// Return this payload.
    Data(Value),
    /// Report no changes.
    NoChanges,
    /// Fail in transport with the given message.
    Fail(String),
}

/// A mock transport for testing.
///
/// Submissions are scripted per response id (read from the body's `id`),
/// fetches per URI without the query string. Unscripted submissions are
/// accepted as `synced`; unscripted fetches report no changes. Scripted
/// replies are consumed in order and the last one repeats.
#[derive(Debug)]
pub struct MockTransport {
    connected: AtomicBool,
    submits: Mutex<HashMap<String, VecDeque<MockSubmit>>>,
    fetches: Mutex<HashMap<String, VecDeque<MockFetch>>>,
    submitted: Mutex<Vec<(String, Value)>>,
    fetched: Mutex<Vec<String>>,
}

impl MockTransport {
    /// Creates a new, connected mock transport.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            submits: Mutex::new(HashMap::new()),
            fetches: Mutex::new(HashMap::new()),
            submitted: Mutex::new(Vec::new()),
            fetched: Mutex::new(Vec::new()),
        }
    }

    /// Sets the connected state reported by `ping`.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Queues a reply for submissions of the given response id.
    pub fn script_submit(&self, response_id: impl Into<String>, reply: MockSubmit) {
        self.submits
            .lock()
            .entry(response_id.into())
            .or_default()
            .push_back(reply);
    }

    /// Queues a reply for fetches of the given URI.
    pub fn script_fetch(&self, uri: impl Into<String>, reply: MockFetch) {
        self.fetches
            .lock()
            .entry(uri.into())
            .or_default()
            .push_back(reply);
    }

    /// Returns every submission as `(uri, body)`, in call order.
    pub fn submitted(&self) -> Vec<(String, Value)> {
        self.submitted.lock().clone()
    }

    /// Returns every fetched URI including its query, in call order.
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().clone()
    }

    fn next<R: Clone>(queue: Option<&mut VecDeque<R>>) -> Option<R> {
        let queue = queue?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    async fn ping(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn fetch(&self, uri: &str, since: Timestamp) -> SyncResult<Option<Value>> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(SyncError::transport_retryable("not connected"));
        }
        self.fetched
            .lock()
            .push(formsync_protocol::endpoints::modified_since(uri, since));

        let reply = Self::next(self.fetches.lock().get_mut(uri));
        match reply.unwrap_or(MockFetch::NoChanges) {
            MockFetch::Data(value) => Ok(Some(value)),
            MockFetch::NoChanges => Ok(None),
            MockFetch::Fail(message) => Err(SyncError::transport_retryable(message)),
        }
    }

    async fn submit(&self, uri: &str, body: &Value) -> SyncResult<SubmitReceipt> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(SyncError::transport_retryable("not connected"));
        }
        self.submitted.lock().push((uri.to_string(), body.clone()));

        let id = body["id"].as_str().unwrap_or_default().to_string();
        let fs_slug = body["fsSlug"].as_str().unwrap_or_default().to_string();
        let reply = Self::next(self.submits.lock().get_mut(&id));

        match reply.unwrap_or(MockSubmit::Accept(ResponseStatus::Synced)) {
            MockSubmit::Accept(status) => Ok(SubmitReceipt {
                id,
                status,
                fs_slug,
                errors: Vec::new(),
            }),
            MockSubmit::Reject(errors) => Err(SyncError::Rejected { id, errors }),
            MockSubmit::Fail(message) => Err(SyncError::transport_retryable(message)),
            MockSubmit::Hang => std::future::pending().await,
        }
    }
}
