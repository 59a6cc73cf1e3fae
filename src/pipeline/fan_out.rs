//! Multi-provider fan-out
//!
//! Sends one request to several adapters at once. Every adapter runs under its own retry
//! policy and its failure stays in its own slot: the call resolves only after every adapter
//! has settled, and the outcomes come back in input order.

use futures::future::join_all;
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::duration_ms;
use crate::drivers::{with_deadline, Completion, ProviderAdapter};
use crate::error::Error;
use crate::resilience::{RetryExecutor, RetryPolicy};
use crate::telemetry::MetricsAggregator;
use crate::types::CompletionRequest;

/// Result for one adapter of a fan-out call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FanoutOutcome {
    pub provider_name: String,
    #[serde(serialize_with = "serialize_result")]
    pub result: Result<Completion, Error>,
    /// Wall time spent on this adapter, retries included.
    #[serde(rename = "latency_ms", with = "duration_ms")]
    pub latency: Duration,
}

impl FanoutOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn content(&self) -> Option<&str> {
        self.result.as_ref().ok().map(|c| c.content.as_str())
    }

    pub fn error(&self) -> Option<&Error> {
        self.result.as_ref().err()
    }
}

fn serialize_result<S: serde::Serializer>(
    result: &Result<Completion, Error>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    #[derive(Serialize)]
    #[serde(tag = "status", rename_all = "snake_case")]
    enum Wire<'a> {
        Success { content: &'a str },
        Failure { kind: crate::ErrorKind, message: &'a str },
    }
    match result {
        Ok(c) => Wire::Success {
            content: &c.content,
        },
        Err(e) => Wire::Failure {
            kind: e.kind(),
            message: e.message(),
        },
    }
    .serialize(serializer)
}

#[derive(Debug, Clone)]
pub struct FanoutExecutor {
    retry: RetryExecutor,
    default_policy: RetryPolicy,
    attempt_timeout: Option<Duration>,
    metrics: Option<Arc<MetricsAggregator>>,
}

impl FanoutExecutor {
    /// Executor using `default_policy` for adapters without a policy of their own.
    pub fn new(default_policy: RetryPolicy) -> Self {
        Self {
            retry: RetryExecutor::new(),
            default_policy,
            attempt_timeout: None,
            metrics: None,
        }
    }

    pub fn with_retry_executor(mut self, retry: RetryExecutor) -> Self {
        self.retry = retry;
        self
    }

    /// Deadline applied to every individual attempt.
    pub fn with_attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsAggregator>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run `request` against every adapter concurrently.
    ///
    /// Returns exactly one outcome per adapter, in the order given, no matter which adapter
    /// finishes first. This never fails as a whole.
    pub async fn run(
        &self,
        adapters: &[Arc<dyn ProviderAdapter>],
        request: &CompletionRequest,
    ) -> Vec<FanoutOutcome> {
        let request_id = Uuid::new_v4();
        let span = info_span!("fan_out", %request_id, adapters = adapters.len());

        join_all(adapters.iter().map(|adapter| self.run_one(adapter.as_ref(), request)))
            .instrument(span)
            .await
    }

    async fn run_one(
        &self,
        adapter: &dyn ProviderAdapter,
        request: &CompletionRequest,
    ) -> FanoutOutcome {
        let name = adapter.name().to_string();
        let policy = adapter
            .retry_policy()
            .unwrap_or_else(|| self.default_policy.clone());
        let started = Instant::now();

        let call = self.retry.execute(&policy, || {
            with_deadline(&name, self.attempt_timeout, adapter.invoke(request))
        });
        let result = match AssertUnwindSafe(call).catch_unwind().await {
            Ok(result) => result,
            Err(_) => {
                warn!(provider = %name, "adapter panicked");
                Err(Error::unknown())
            }
        };
        let latency = started.elapsed();

        match &result {
            Ok(completion) => {
                info!(
                    provider = %name,
                    latency_ms = latency.as_millis() as u64,
                    "adapter succeeded"
                );
                if let Some(metrics) = &self.metrics {
                    let usage = completion.usage;
                    metrics.record_success(
                        Some(latency),
                        usage.map(|u| u.prompt_tokens),
                        usage.map(|u| u.completion_tokens),
                    );
                }
            }
            Err(err) => {
                info!(provider = %name, kind = %err.kind(), "adapter failed: {}", err.message());
                if let Some(metrics) = &self.metrics {
                    metrics.record_failure();
                }
            }
        }

        FanoutOutcome {
            provider_name: name,
            result,
            latency,
        }
    }
}
