//! HTTP transport implementation.
//!
//! This module provides an HTTP-based transport for the sync engine.
//! The actual HTTP client is abstracted via a trait to allow different
//! implementations (reqwest, hyper, etc.).

use crate::error::{SyncError, SyncResult};
use crate::transport::Transport;
use formsync_protocol::endpoints::modified_since;
use formsync_protocol::{SubmitReceipt, Timestamp};
use parking_lot::RwLock;
use serde_json::Value;
use std::future::Future;

/// Status and body of an HTTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl HttpReply {
    /// Creates a reply.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport. Errors are
/// connection-level failures; any HTTP status, including 4xx and 5xx, is
/// an `Ok` reply.
pub trait HttpClient: Send + Sync {
    /// Sends a GET request.
    fn get(&self, url: &str) -> impl Future<Output = Result<HttpReply, String>> + Send;

    /// Sends a POST request with a JSON body.
    fn post_json(
        &self,
        url: &str,
        body: Vec<u8>,
    ) -> impl Future<Output = Result<HttpReply, String>> + Send;
}

/// HTTP-based transport speaking JSON to the forms server.
pub struct HttpTransport<C: HttpClient> {
    /// Base URL of the forms server (e.g., "https://forms.example.com").
    base_url: String,
    /// Path probed by `ping`.
    ping_path: String,
    /// HTTP client implementation.
    client: C,
    /// Last error message.
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ping_path: "/api/v2/".to_string(),
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Sets the path probed by the connectivity check.
    pub fn with_ping_path(mut self, path: impl Into<String>) -> Self {
        self.ping_path = path.into();
        self
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn url(&self, uri: &str) -> String {
        if uri.starts_with('/') {
            format!("{}{}", self.base_url, uri)
        } else {
            format!("{}/{}", self.base_url, uri)
        }
    }

    fn record<T>(&self, result: Result<T, String>) -> SyncResult<T> {
        match result {
            Ok(value) => {
                *self.last_error.write() = None;
                Ok(value)
            }
            Err(e) => {
                *self.last_error.write() = Some(e.clone());
                Err(SyncError::transport_retryable(e))
            }
        }
    }
}

impl<C: HttpClient> Transport for HttpTransport<C> {
    async fn ping(&self) -> bool {
        let url = self.url(&self.ping_path);
        match self.client.get(&url).await {
            Ok(reply) => reply.status < 500,
            Err(e) => {
                *self.last_error.write() = Some(e);
                false
            }
        }
    }

    async fn fetch(&self, uri: &str, since: Timestamp) -> SyncResult<Option<Value>> {
        let url = self.url(&modified_since(uri, since));
        let reply = self.record(self.client.get(&url).await)?;

        match reply.status {
            204 | 304 => Ok(None),
            _ if reply.is_success() => {
                if reply.body.iter().all(u8::is_ascii_whitespace) {
                    return Ok(None);
                }
                let value: Value = serde_json::from_slice(&reply.body)?;
                Ok((!value.is_null()).then_some(value))
            }
            status => Err(SyncError::Server {
                status,
                message: reply.body_text(),
            }),
        }
    }

    async fn submit(&self, uri: &str, body: &Value) -> SyncResult<SubmitReceipt> {
        let bytes = serde_json::to_vec(body)?;
        let reply = self.record(self.client.post_json(&self.url(uri), bytes).await)?;
        let receipt = serde_json::from_slice::<SubmitReceipt>(&reply.body);

        match receipt {
            Ok(receipt) if receipt.is_rejected() => Err(SyncError::Rejected {
                id: receipt.id,
                errors: receipt.errors,
            }),
            Ok(receipt) if reply.is_success() => Ok(receipt),
            Err(e) if reply.is_success() => Err(SyncError::Codec(format!(
                "unreadable submit receipt: {e}"
            ))),
            _ => Err(SyncError::Server {
                status: reply.status,
                message: reply.body_text(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formsync_protocol::endpoints::watermark_epoch;
    use formsync_protocol::ResponseStatus;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct TestClient {
        reply: Mutex<Option<Result<HttpReply, String>>>,
        urls: Mutex<Vec<String>>,
    }

    impl TestClient {
        fn replying(status: u16, body: &str) -> Self {
            let client = Self::default();
            *client.reply.lock() = Some(Ok(HttpReply::new(status, body)));
            client
        }

        fn failing(message: &str) -> Self {
            let client = Self::default();
            *client.reply.lock() = Some(Err(message.to_string()));
            client
        }

        fn respond(&self, url: &str) -> Result<HttpReply, String> {
            self.urls.lock().push(url.to_string());
            self.reply
                .lock()
                .clone()
                .unwrap_or_else(|| Err("no response set".into()))
        }
    }

    impl HttpClient for TestClient {
        async fn get(&self, url: &str) -> Result<HttpReply, String> {
            self.respond(url)
        }

        async fn post_json(&self, url: &str, _body: Vec<u8>) -> Result<HttpReply, String> {
            self.respond(url)
        }
    }

    #[test]
    fn url_joining() {
        let transport = HttpTransport::new("https://forms.example.com/", TestClient::default());
        assert_eq!(transport.base_url(), "https://forms.example.com");
        assert_eq!(
            transport.url("pforms/formstack/1/submit"),
            "https://forms.example.com/pforms/formstack/1/submit"
        );
        assert_eq!(
            transport.url("/api/v2/pforms/app/1"),
            "https://forms.example.com/api/v2/pforms/app/1"
        );
    }

    #[tokio::test]
    async fn ping_reflects_reachability() {
        let up = HttpTransport::new("https://f", TestClient::replying(401, ""));
        assert!(up.ping().await);

        let down = HttpTransport::new("https://f", TestClient::failing("dns"));
        assert!(!down.ping().await);
        assert_eq!(down.last_error().as_deref(), Some("dns"));
    }

    #[tokio::test]
    async fn submit_accepted() {
        let transport = HttpTransport::new(
            "https://f",
            TestClient::replying(201, r#"{"id": "r1", "status": "synced", "fsSlug": "intake"}"#),
        );
        let receipt = transport
            .submit("pforms/formstack/f1/submit", &json!({"id": "r1"}))
            .await
            .unwrap();
        assert_eq!(receipt.status, ResponseStatus::Synced);
        assert_eq!(receipt.fs_slug, "intake");
    }

    #[tokio::test]
    async fn submit_rejected_on_error_status() {
        let transport = HttpTransport::new(
            "https://f",
            TestClient::replying(
                400,
                r#"{"id": "r1", "status": "rejected", "fsSlug": "intake", "errors": ["q1 required"]}"#,
            ),
        );
        let err = transport.submit("x", &json!({"id": "r1"})).await.unwrap_err();
        match err {
            SyncError::Rejected { id, errors } => {
                assert_eq!(id, "r1");
                assert_eq!(errors, vec![json!("q1 required")]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn submit_server_error() {
        let transport = HttpTransport::new("https://f", TestClient::replying(500, "oops"));
        let err = transport.submit("x", &json!({"id": "r1"})).await.unwrap_err();
        assert!(matches!(err, SyncError::Server { status: 500, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn submit_connection_failure() {
        let transport = HttpTransport::new("https://f", TestClient::failing("reset"));
        let err = transport.submit("x", &json!({"id": "r1"})).await.unwrap_err();
        assert!(matches!(err, SyncError::Transport { retryable: true, .. }));
    }

    #[tokio::test]
    async fn fetch_handles_no_changes() {
        for (status, body) in [(304, ""), (200, ""), (200, "null")] {
            let transport = HttpTransport::new("https://f", TestClient::replying(status, body));
            let data = transport
                .fetch("/api/v2/pforms/app/a1", watermark_epoch())
                .await
                .unwrap();
            assert!(data.is_none(), "status {status} body {body:?}");
        }
    }

    #[tokio::test]
    async fn fetch_appends_watermark() {
        let client = TestClient::replying(200, r#"{"id": "a1", "slug": "app"}"#);
        let transport = HttpTransport::new("https://f", client);
        let data = transport
            .fetch("/api/v2/pforms/app/a1", watermark_epoch())
            .await
            .unwrap();
        assert_eq!(data.unwrap()["slug"], "app");
        assert_eq!(
            transport.client.urls.lock()[0],
            "https://f/api/v2/pforms/app/a1?modified_gte=2015-02-01T00:00:00.000Z"
        );
    }
}
