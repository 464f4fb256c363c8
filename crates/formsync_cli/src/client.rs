//! `reqwest`-backed HTTP client for the sync transport.

use crate::error::CliError;
use formsync_engine::{HttpClient, HttpReply};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder};
use std::time::Duration;
use tracing::debug;

/// HTTP client speaking to the forms server.
#[derive(Clone)]
pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    /// Builds a client whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, CliError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("formsync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    async fn send(&self, builder: RequestBuilder) -> Result<HttpReply, String> {
        let response = builder.send().await.map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| e.to_string())?;
        debug!(status, bytes = body.len(), "received HTTP response");
        Ok(HttpReply::new(status, body.to_vec()))
    }
}

impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str) -> Result<HttpReply, String> {
        debug!(url, "GET");
        self.send(self.client.get(url)).await
    }

    async fn post_json(&self, url: &str, body: Vec<u8>) -> Result<HttpReply, String> {
        debug!(url, bytes = body.len(), "POST");
        self.send(
            self.client
                .post(url)
                .header(CONTENT_TYPE, "application/json")
                .body(body),
        )
        .await
    }
}
