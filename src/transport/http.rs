use futures::TryStreamExt;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use crate::client::error_classification::Failure;
use crate::drivers::ChunkStream;
use crate::error::{Error, ErrorContext};
use crate::Result;

/// Pooled JSON-over-HTTP client for adapters that talk to HTTP APIs.
///
/// Every failure comes back as a [`Failure`], so adapters can return it unchanged and let
/// the classifier decide what it means.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpTransport {
    /// `timeout` bounds the whole exchange, including reading a streamed body.
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(32)
            .pool_idle_timeout(Some(Duration::from_secs(90)));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            Error::configuration(format!("cannot build HTTP client: {}", e))
                .with_context(ErrorContext::new().with_source("http_transport"))
        })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
        })
    }

    /// Send `Authorization: Bearer <key>` on every request.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    async fn send<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
        accept: &str,
    ) -> std::result::Result<reqwest::Response, Failure> {
        let mut req = self
            .client
            .post(self.url(path))
            .header("accept", accept)
            .json(body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        // The error body usually explains the status ("rate limit exceeded", ...).
        let text = response.text().await.unwrap_or_default();
        let message = if text.trim().is_empty() {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        } else {
            text
        };
        Err(Failure::http(status.as_u16(), message))
    }

    /// POST `body` as JSON and parse the JSON response.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> std::result::Result<Value, Failure> {
        let response = self.send(path, body, "application/json").await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// POST `body` as JSON and hand back the response body as it arrives.
    pub async fn post_stream<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> std::result::Result<ChunkStream, Failure> {
        let response = self.send(path, body, "text/event-stream").await?;
        let chunks = response.bytes_stream().map_err(Failure::from);
        Ok(Box::pin(chunks))
    }
}
