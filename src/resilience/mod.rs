//! 弹性模式模块：退避策略、重试执行器与可注入的计时依赖。
//!
//! # Resilience Primitives Module
//!
//! This module provides the retry machinery every provider call runs under.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`backoff`] | Backoff strategies and [`RetryPolicy`] delay formulas |
//! | [`retry`] | [`RetryExecutor`] that classifies failures and schedules retries |
//! | [`clock`] | [`Sleeper`] / [`Clock`] abstractions over wall-clock time |
//!
//! ## Retry Policy
//!
//! `max_attempts` bounds the retries *after* the first attempt:
//!
//! ```rust
//! use ai_lib_relay::resilience::{BackoffStrategy, RetryPolicy};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(BackoffStrategy::ExponentialBackoff, 3, Duration::from_millis(100))
//!     .with_max_delay(Duration::from_millis(300));
//!
//! assert_eq!(policy.total_attempts(), 4);
//! assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
//! assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
//! assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(300));
//! ```

pub mod backoff;
pub mod clock;
pub mod retry;

pub use backoff::{BackoffStrategy, RetryPolicy};
pub use clock::{Clock, ManualClock, Sleeper, SystemClock, TokioSleeper};
pub use retry::RetryExecutor;
