//! Backoff strategies and the retry policy value type.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::duration_ms;

/// Exponents above this saturate; 2^40 ms is already decades.
const MAX_EXPONENT: u32 = 40;

/// Fraction of the exponential delay added as random jitter.
const JITTER_FRACTION: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Fixed,
    Linear,
    #[default]
    ExponentialBackoff,
    ExponentialWithJitter,
}

impl std::str::FromStr for BackoffStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "fixed" => Ok(BackoffStrategy::Fixed),
            "linear" => Ok(BackoffStrategy::Linear),
            "exponential" | "exponential_backoff" => Ok(BackoffStrategy::ExponentialBackoff),
            "jitter" | "exponential_with_jitter" => Ok(BackoffStrategy::ExponentialWithJitter),
            other => Err(format!("unknown backoff strategy: {}", other)),
        }
    }
}

/// Retry policy for a single operation.
///
/// `max_attempts` counts retries after the first attempt, so an operation runs at most
/// `max_attempts + 1` times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub strategy: BackoffStrategy,
    pub max_attempts: u32,
    #[serde(rename = "base_delay_ms", with = "duration_ms")]
    pub base_delay: Duration,
    #[serde(rename = "max_delay_ms", with = "duration_ms::option")]
    pub max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::ExponentialBackoff,
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Some(Duration::from_secs(30)),
        }
    }
}

impl RetryPolicy {
    pub fn new(strategy: BackoffStrategy, max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            strategy,
            max_attempts,
            base_delay,
            max_delay: None,
        }
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn without_max_delay(mut self) -> Self {
        self.max_delay = None;
        self
    }

    /// Total number of times the operation may run.
    pub fn total_attempts(&self) -> u32 {
        self.max_attempts.saturating_add(1)
    }

    /// Delay before the next attempt, given how many retries have already completed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let sample = match self.strategy {
            BackoffStrategy::ExponentialWithJitter => rand::thread_rng().gen_range(0.0..=1.0),
            _ => 0.0,
        };
        self.delay_with_sample(attempt, sample)
    }

    /// Deterministic core of [`Self::delay_for_attempt`]; `sample` in `[0, 1]` scales the jitter.
    pub(crate) fn delay_with_sample(&self, attempt: u32, sample: f64) -> Duration {
        let base_ms = as_millis_f64(self.base_delay);
        let growth = 2f64.powi(attempt.min(MAX_EXPONENT) as i32);

        let raw_ms = match self.strategy {
            BackoffStrategy::Fixed => base_ms,
            BackoffStrategy::Linear => base_ms * (f64::from(attempt) + 1.0),
            BackoffStrategy::ExponentialBackoff => base_ms * growth,
            BackoffStrategy::ExponentialWithJitter => {
                let exp = base_ms * growth;
                exp + sample.clamp(0.0, 1.0) * JITTER_FRACTION * exp
            }
        };

        let capped_ms = match self.max_delay {
            Some(max) => raw_ms.min(as_millis_f64(max)),
            None => raw_ms,
        };

        Duration::from_millis(capped_ms.floor().clamp(0.0, u64::MAX as f64) as u64)
    }
}

fn as_millis_f64(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1_000_000.0
}
