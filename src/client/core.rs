use futures::{stream, StreamExt};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cache::{CacheKey, ResponseCache};
use crate::client::builder::AiRelayBuilder;
use crate::client::session::ChatSession;
use crate::config::RelayConfig;
use crate::drivers::{with_deadline, Completion, ProviderAdapter};
use crate::error::{Error, ErrorContext};
use crate::pipeline::{Decoder, FanoutExecutor, FanoutOutcome};
use crate::resilience::{RetryExecutor, RetryPolicy};
use crate::telemetry::{MetricsAggregator, MetricsSnapshot};
use crate::types::{CompletionRequest, StreamEvent};
use crate::{BoxStream, Result};

/// Entry point tying adapters, retry, fan-out, streaming, caching and metrics together.
///
/// Build one with [`AiRelay::builder`]. Adapters are addressed by [`ProviderAdapter::name`].
pub struct AiRelay {
    pub(crate) adapters: Vec<Arc<dyn ProviderAdapter>>,
    pub(crate) config: RelayConfig,
    pub(crate) retry: RetryExecutor,
    pub(crate) decoder: Arc<dyn Decoder>,
    pub(crate) metrics: Arc<MetricsAggregator>,
    pub(crate) cache: ResponseCache,
}

impl std::fmt::Debug for AiRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiRelay")
            .field("adapters", &self.adapter_names())
            .field("config", &self.config)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl AiRelay {
    pub fn builder() -> AiRelayBuilder {
        AiRelayBuilder::new()
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Registered adapter names, in registration order.
    pub fn adapter_names(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    pub fn adapter(&self, name: &str) -> Result<&Arc<dyn ProviderAdapter>> {
        self.adapters
            .iter()
            .find(|a| a.name() == name)
            .ok_or_else(|| {
                Error::configuration(format!("no adapter named '{}'", name)).with_context(
                    ErrorContext::new()
                        .with_source("relay")
                        .with_details(format!("registered: {}", self.adapter_names().join(", "))),
                )
            })
    }

    fn policy_for(&self, adapter: &dyn ProviderAdapter) -> RetryPolicy {
        adapter
            .retry_policy()
            .unwrap_or_else(|| self.config.retry.clone())
    }

    /// Complete `request` with one adapter, retrying under its policy.
    ///
    /// With caching enabled an identical earlier request is answered from the cache and
    /// counted as a cache hit.
    pub async fn complete(&self, adapter: &str, request: &CompletionRequest) -> Result<Completion> {
        let adapter = self.adapter(adapter)?;
        if !self.config.cache.enabled {
            return self.execute(adapter, request).await;
        }

        let key = CacheKey::for_request(adapter.name(), request);
        match self.cache.get(&key).await {
            Ok(Some(hit)) => {
                debug!(provider = adapter.name(), key = %key, "cache hit");
                self.metrics.record_cache_hit();
                return Ok(hit);
            }
            Ok(None) => self.metrics.record_cache_miss(),
            Err(e) => {
                warn!(error = %e, "cache lookup failed");
                self.metrics.record_cache_miss();
            }
        }

        let completion = self.execute(adapter, request).await?;
        if let Err(e) = self.cache.put(&key, &completion).await {
            warn!(error = %e, "cache store failed");
        }
        Ok(completion)
    }

    /// Send `request` to every registered adapter concurrently.
    pub async fn fan_out(&self, request: &CompletionRequest) -> Vec<FanoutOutcome> {
        self.fan_out_executor().run(&self.adapters, request).await
    }

    /// Fan out to the named adapters only, in the order given.
    pub async fn fan_out_to(
        &self,
        names: &[&str],
        request: &CompletionRequest,
    ) -> Result<Vec<FanoutOutcome>> {
        let selected = names
            .iter()
            .map(|name| self.adapter(name).cloned())
            .collect::<Result<Vec<_>>>()?;
        Ok(self.fan_out_executor().run(&selected, request).await)
    }

    /// Open a decoded stream from one adapter.
    ///
    /// Opening the stream is retried like any other call; once events flow, a transport
    /// failure ends the stream with a `Stream` error and is not retried.
    pub async fn stream(
        &self,
        adapter: &str,
        request: &CompletionRequest,
    ) -> Result<BoxStream<'static, StreamEvent>> {
        let adapter = self.adapter(adapter)?;
        self.open_stream(adapter, request).await
    }

    /// Start a conversation with one adapter.
    pub fn chat(&self, adapter: &str) -> Result<ChatSession<'_>> {
        let adapter = self.adapter(adapter)?;
        if !adapter.supports_conversations() {
            return Err(Error::configuration(format!(
                "adapter '{}' does not support conversations",
                adapter.name()
            )));
        }
        Ok(ChatSession::new(self, Arc::clone(adapter)))
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// The shared aggregator, for callers that record their own outcomes into it.
    pub fn metrics_handle(&self) -> Arc<MetricsAggregator> {
        Arc::clone(&self.metrics)
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    fn fan_out_executor(&self) -> FanoutExecutor {
        FanoutExecutor::new(self.config.retry.clone())
            .with_retry_executor(self.retry.clone())
            .with_attempt_timeout(self.config.per_adapter_timeout)
            .with_metrics(Arc::clone(&self.metrics))
    }

    /// Retried, deadline-bounded, metered call without the cache.
    pub(crate) async fn execute(
        &self,
        adapter: &Arc<dyn ProviderAdapter>,
        request: &CompletionRequest,
    ) -> Result<Completion> {
        let policy = self.policy_for(adapter.as_ref());
        let timeout = self.config.per_adapter_timeout;
        let started = Instant::now();

        let result = self
            .retry
            .execute(&policy, || {
                with_deadline(adapter.name(), timeout, adapter.invoke(request))
            })
            .await;

        match &result {
            Ok(completion) => self.metrics.record_success(
                Some(started.elapsed()),
                completion.usage.map(|u| u.prompt_tokens),
                completion.usage.map(|u| u.completion_tokens),
            ),
            Err(_) => self.metrics.record_failure(),
        }
        result
    }

    pub(crate) async fn open_stream(
        &self,
        adapter: &Arc<dyn ProviderAdapter>,
        request: &CompletionRequest,
    ) -> Result<BoxStream<'static, StreamEvent>> {
        if !adapter.supports_streaming() {
            return Err(Error::configuration(format!(
                "adapter '{}' does not support streaming",
                adapter.name()
            )));
        }

        let request = request.clone().streaming(true);
        let policy = self.policy_for(adapter.as_ref());
        let timeout = self.config.per_adapter_timeout;
        let started = Instant::now();

        let chunks = self
            .retry
            .execute(&policy, || {
                with_deadline(adapter.name(), timeout, adapter.invoke_stream(&request))
            })
            .await;
        let chunks = match chunks {
            Ok(chunks) => chunks,
            Err(e) => {
                self.metrics.record_failure();
                return Err(e);
            }
        };

        let decoder = adapter
            .stream_decoder()
            .unwrap_or_else(|| Arc::clone(&self.decoder));
        let metrics = Arc::clone(&self.metrics);
        let provider = adapter.name().to_string();

        // Exactly one outcome is recorded per stream: at the final event, at the first error,
        // or when the decoder ends without a final event.
        let events = stream::unfold(Some(decoder.decode(chunks)), move |state| {
            let metrics = Arc::clone(&metrics);
            let provider = provider.clone();
            async move {
                let mut events = state?;
                match events.next().await {
                    Some(Ok(event)) if event.is_final => {
                        metrics.record_success(Some(started.elapsed()), None, None);
                        Some((Ok(event), None))
                    }
                    Some(Ok(event)) => Some((Ok(event), Some(events))),
                    Some(Err(e)) => {
                        warn!(
                            provider = %provider,
                            kind = %e.kind(),
                            "stream aborted: {}",
                            e.message()
                        );
                        metrics.record_failure();
                        Some((Err(e), None))
                    }
                    None => {
                        debug!(provider = %provider, "stream ended without a final event");
                        metrics.record_success(Some(started.elapsed()), None, None);
                        None
                    }
                }
            }
        });
        Ok(Box::pin(events))
    }
}
