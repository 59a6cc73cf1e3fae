//! 遥测模块：请求结果计数、延迟百分位与吞吐统计。
//!
//! # Telemetry Module
//!
//! Collects request outcomes for later reporting. Nothing is collected unless the caller
//! creates a [`MetricsAggregator`] and hands it to the relay or a fan-out executor.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`MetricsAggregator`] | Mutex-guarded counters plus the latency history |
//! | [`MetricsSnapshot`] | Immutable derived view (rates, nearest-rank p50/p95/p99) |
//! | [`MetricsConfig`] | Optional latency window bound |
//!
//! ```rust
//! use ai_lib_relay::telemetry::MetricsAggregator;
//! use std::time::Duration;
//!
//! let metrics = MetricsAggregator::new();
//! metrics.record_success(Some(Duration::from_millis(120)), Some(42), Some(7));
//! metrics.record_failure();
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.total_requests, 2);
//! assert_eq!(snapshot.success_rate_percent, 50.0);
//! assert_eq!(snapshot.p50_latency, Duration::from_millis(120));
//! ```

pub mod metrics;

pub use metrics::{percentile, MetricsAggregator, MetricsConfig, MetricsSnapshot};
