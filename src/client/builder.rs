use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{MemoryCache, NullCache, ResponseCache};
use crate::client::core::AiRelay;
use crate::config::RelayConfig;
use crate::drivers::ProviderAdapter;
use crate::error::{Error, ErrorContext};
use crate::pipeline::{Decoder, SseDecoder};
use crate::resilience::{Clock, RetryExecutor, RetryPolicy, Sleeper, SystemClock, TokioSleeper};
use crate::telemetry::MetricsAggregator;
use crate::Result;

/// Builder for [`AiRelay`].
///
/// Only the adapters are required; everything else falls back to [`RelayConfig::default`],
/// the tokio timer and the system clock.
pub struct AiRelayBuilder {
    adapters: Vec<Arc<dyn ProviderAdapter>>,
    config: RelayConfig,
    metrics: Option<Arc<MetricsAggregator>>,
    decoder: Option<Arc<dyn Decoder>>,
    sleeper: Arc<dyn Sleeper>,
    clock: Arc<dyn Clock>,
}

impl Default for AiRelayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AiRelayBuilder {
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
            config: RelayConfig::default(),
            metrics: None,
            decoder: None,
            sleeper: Arc::new(TokioSleeper),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_adapter<A: ProviderAdapter + 'static>(self, adapter: A) -> Self {
        self.with_shared_adapter(Arc::new(adapter))
    }

    pub fn with_shared_adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn with_config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    /// Default retry policy, used by adapters that do not declare their own.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.per_adapter_timeout = Some(timeout);
        self
    }

    /// Record into an existing aggregator instead of a private one.
    pub fn with_metrics(mut self, metrics: Arc<MetricsAggregator>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Replace the SSE decoder built from `config.stream`.
    pub fn with_decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Clock for metrics and cache expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> Result<AiRelay> {
        if self.adapters.is_empty() {
            return Err(Error::configuration("at least one adapter is required")
                .with_context(ErrorContext::new().with_source("relay_builder")));
        }
        let mut seen = HashSet::new();
        for adapter in &self.adapters {
            if !seen.insert(adapter.name()) {
                return Err(Error::configuration(format!(
                    "adapter name '{}' is registered twice",
                    adapter.name()
                ))
                .with_context(ErrorContext::new().with_source("relay_builder")));
            }
        }
        self.config.validate()?;

        let metrics = self.metrics.unwrap_or_else(|| {
            let aggregator = MetricsAggregator::with_clock(Arc::clone(&self.clock));
            Arc::new(match self.config.metrics.latency_window {
                Some(window) => aggregator.with_latency_window(window),
                None => aggregator,
            })
        });

        let cache_config = &self.config.cache;
        let cache = if cache_config.enabled {
            ResponseCache::new(
                cache_config.ttl,
                Box::new(MemoryCache::with_clock(
                    cache_config.max_entries,
                    Arc::clone(&self.clock),
                )),
            )
        } else {
            ResponseCache::new(cache_config.ttl, Box::new(NullCache))
        };

        let decoder = self
            .decoder
            .unwrap_or_else(|| Arc::new(SseDecoder::from_config(self.config.stream.clone())));

        Ok(AiRelay {
            adapters: self.adapters,
            retry: RetryExecutor::with_sleeper(self.sleeper),
            decoder,
            metrics,
            cache,
            config: self.config,
        })
    }
}
