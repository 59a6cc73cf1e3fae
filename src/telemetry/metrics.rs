//! Request outcome counters and latency percentiles.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::config::duration_ms;
use crate::resilience::{Clock, SystemClock};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Keep only the most recent N latencies for percentiles. `None` keeps every observation.
    pub latency_window: Option<usize>,
}

/// Point-in-time, read-only view over a [`MetricsAggregator`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub success_rate_percent: f64,
    #[serde(rename = "average_latency_ms", with = "duration_ms")]
    pub average_latency: Duration,
    #[serde(rename = "p50_latency_ms", with = "duration_ms")]
    pub p50_latency: Duration,
    #[serde(rename = "p95_latency_ms", with = "duration_ms")]
    pub p95_latency: Duration,
    #[serde(rename = "p99_latency_ms", with = "duration_ms")]
    pub p99_latency: Duration,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate_percent: f64,
    #[serde(rename = "elapsed_since_reset_ms", with = "duration_ms")]
    pub elapsed_since_reset: Duration,
    pub requests_per_second: f64,
}

#[derive(Debug)]
struct State {
    succeeded: u64,
    failed: u64,
    prompt_tokens: u64,
    completion_tokens: u64,
    cache_hits: u64,
    cache_misses: u64,
    latencies: VecDeque<Duration>,
    started_at: Instant,
}

impl State {
    fn fresh(started_at: Instant) -> Self {
        Self {
            succeeded: 0,
            failed: 0,
            prompt_tokens: 0,
            completion_tokens: 0,
            cache_hits: 0,
            cache_misses: 0,
            latencies: VecDeque::new(),
            started_at,
        }
    }
}

/// Thread-safe metrics store shared by every task that reports outcomes.
///
/// Construct one explicitly and hand it (usually as `Arc<MetricsAggregator>`) to whatever
/// records into it; there is no process-wide instance.
pub struct MetricsAggregator {
    state: Mutex<State>,
    clock: Arc<dyn Clock>,
    latency_window: Option<usize>,
}

impl std::fmt::Debug for MetricsAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsAggregator")
            .field("latency_window", &self.latency_window)
            .finish_non_exhaustive()
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let started_at = clock.now();
        Self {
            state: Mutex::new(State::fresh(started_at)),
            clock,
            latency_window: None,
        }
    }

    pub fn from_config(config: &MetricsConfig) -> Self {
        let mut aggregator = Self::new();
        aggregator.latency_window = config.latency_window;
        aggregator
    }

    /// Bound the latency history to the most recent `window` observations.
    /// A zero window is treated as one.
    pub fn with_latency_window(mut self, window: usize) -> Self {
        self.latency_window = Some(window.max(1));
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // Counters stay meaningful even if a recorder panicked mid-update.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_success(
        &self,
        latency: Option<Duration>,
        prompt_tokens: Option<u64>,
        completion_tokens: Option<u64>,
    ) {
        let mut st = self.lock();
        st.succeeded += 1;
        st.prompt_tokens += prompt_tokens.unwrap_or(0);
        st.completion_tokens += completion_tokens.unwrap_or(0);
        if let Some(latency) = latency {
            if let Some(window) = self.latency_window {
                while st.latencies.len() >= window.max(1) {
                    st.latencies.pop_front();
                }
            }
            st.latencies.push_back(latency);
        }
    }

    pub fn record_failure(&self) {
        self.lock().failed += 1;
    }

    pub fn record_cache_hit(&self) {
        self.lock().cache_hits += 1;
    }

    pub fn record_cache_miss(&self) {
        self.lock().cache_misses += 1;
    }

    /// Zero every counter and restart the elapsed-time window.
    pub fn reset(&self) {
        let now = self.clock.now();
        *self.lock() = State::fresh(now);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = self.clock.now();
        let st = self.lock();

        let mut sorted: Vec<Duration> = st.latencies.iter().copied().collect();
        sorted.sort_unstable();

        let total_requests = st.succeeded + st.failed;
        let cache_lookups = st.cache_hits + st.cache_misses;
        let elapsed = now.saturating_duration_since(st.started_at);
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;

        MetricsSnapshot {
            total_requests,
            succeeded: st.succeeded,
            failed: st.failed,
            success_rate_percent: percent(st.succeeded, total_requests),
            average_latency: average(&sorted),
            p50_latency: percentile(&sorted, 50.0),
            p95_latency: percentile(&sorted, 95.0),
            p99_latency: percentile(&sorted, 99.0),
            prompt_tokens: st.prompt_tokens,
            completion_tokens: st.completion_tokens,
            total_tokens: st.prompt_tokens + st.completion_tokens,
            cache_hits: st.cache_hits,
            cache_misses: st.cache_misses,
            cache_hit_rate_percent: percent(st.cache_hits, cache_lookups),
            elapsed_since_reset: elapsed,
            requests_per_second: if elapsed_ms > 0.0 {
                total_requests as f64 * 1000.0 / elapsed_ms
            } else {
                0.0
            },
        }
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn average(values: &[Duration]) -> Duration {
    if values.is_empty() {
        return Duration::ZERO;
    }
    let total: u128 = values.iter().map(Duration::as_nanos).sum();
    let mean = total / values.len() as u128;
    Duration::from_nanos(u64::try_from(mean).unwrap_or(u64::MAX))
}

/// Nearest-rank percentile over an ascending slice: the value at `ceil(p/100 * n) - 1`.
pub fn percentile(sorted: &[Duration], p: f64) -> Duration {
    let n = sorted.len();
    if n == 0 {
        return Duration::ZERO;
    }
    // Multiply before dividing so exact ranks stay exact in floating point.
    let rank = (p * n as f64 / 100.0).ceil() as i64 - 1;
    let idx = rank.clamp(0, n as i64 - 1) as usize;
    sorted[idx]
}
