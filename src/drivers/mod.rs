//! Provider 适配层：通过 trait 对接多厂商 API 的窄能力接口
//!
//! Provider adapter abstraction.
//!
//! The relay core never speaks a provider's wire format. It talks to `Arc<dyn ProviderAdapter>`
//! values that translate a [`CompletionRequest`] into provider I/O and report failures as raw
//! [`Failure`]s; classification, retry, fan-out and stream decoding all happen on this side of
//! the trait.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::client::error_classification::Failure;
use crate::error::Error;
use crate::pipeline::Decoder;
use crate::resilience::RetryPolicy;
use crate::types::CompletionRequest;

/// Raw transport chunks of a still-open streaming response.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, Failure>> + Send + 'static>>;

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageInfo {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl UsageInfo {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// A finished, non-streamed completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageInfo>,
}

impl Completion {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: UsageInfo) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Capability interface every provider integration implements.
///
/// Capabilities are declared up front through the `supports_*` flags; the relay checks them
/// before calling the matching operation.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable, unique name used for lookup and in fan-out results.
    fn name(&self) -> &str;

    fn supports_streaming(&self) -> bool {
        false
    }

    fn supports_conversations(&self) -> bool {
        false
    }

    /// Adapter-specific retry policy; `None` uses the relay's configured default.
    fn retry_policy(&self) -> Option<RetryPolicy> {
        None
    }

    /// Decoder for this adapter's stream format. `None` uses the relay's SSE decoder.
    fn stream_decoder(&self) -> Option<Arc<dyn Decoder>> {
        None
    }

    async fn invoke(&self, request: &CompletionRequest) -> Result<Completion, Failure>;

    /// Open a streaming response. Unless [`ProviderAdapter::stream_decoder`] says otherwise,
    /// the chunks must be `data: <json>` frames understood by
    /// [`crate::pipeline::decode::SseDecoder`].
    async fn invoke_stream(&self, _request: &CompletionRequest) -> Result<ChunkStream, Failure> {
        Err(Failure::from(Error::configuration(format!(
            "adapter '{}' does not support streaming",
            self.name()
        ))))
    }
}

/// Bound one adapter call by `limit`. Expiry becomes a connection-level timeout, which
/// classifies as a retryable network failure.
pub(crate) async fn with_deadline<T, Fut>(
    adapter: &str,
    limit: Option<Duration>,
    call: Fut,
) -> Result<T, Failure>
where
    Fut: Future<Output = Result<T, Failure>>,
{
    let Some(limit) = limit else {
        return call.await;
    };
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(Failure::timeout(format!(
            "adapter '{}' timed out after {}ms",
            adapter,
            limit.as_millis()
        ))),
    }
}
