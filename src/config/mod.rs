//! 配置模块：重试、超时、流解码、指标与缓存的统一配置。
//!
//! # Relay Configuration
//!
//! [`RelayConfig`] is plain serde data. Load it from YAML, then let environment variables
//! override the retry and timeout knobs:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `AI_RELAY_RETRY_STRATEGY` | `retry.strategy` (`fixed`, `linear`, `exponential`, `jitter`, ...) |
//! | `AI_RELAY_MAX_ATTEMPTS` | `retry.max_attempts` |
//! | `AI_RELAY_BASE_DELAY_MS` | `retry.base_delay_ms` |
//! | `AI_RELAY_MAX_DELAY_MS` | `retry.max_delay_ms` |
//! | `AI_RELAY_TIMEOUT_MS` | `per_adapter_timeout_ms` |
//!
//! ```rust
//! use ai_lib_relay::config::RelayConfig;
//! use ai_lib_relay::resilience::BackoffStrategy;
//! use std::time::Duration;
//!
//! let yaml = r#"
//! retry:
//!   strategy: fixed
//!   max_attempts: 2
//!   base_delay_ms: 250
//! per_adapter_timeout_ms: 10000
//! "#;
//! let config = RelayConfig::from_yaml_str(yaml)?;
//! assert_eq!(config.retry.strategy, BackoffStrategy::Fixed);
//! assert_eq!(config.per_adapter_timeout, Some(Duration::from_secs(10)));
//! # Ok::<(), ai_lib_relay::Error>(())
//! ```

mod loader;

pub use loader::{
    ENV_BASE_DELAY_MS, ENV_MAX_ATTEMPTS, ENV_MAX_DELAY_MS, ENV_RETRY_STRATEGY, ENV_TIMEOUT_MS,
};

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use crate::cache::CacheConfig;
pub use crate::pipeline::decode::SseDecoderConfig;
use crate::resilience::RetryPolicy;
pub use crate::telemetry::MetricsConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Default policy for adapters that do not declare their own.
    pub retry: RetryPolicy,
    /// Deadline for a single adapter attempt. Expiry is a retryable network timeout.
    #[serde(rename = "per_adapter_timeout_ms", with = "duration_ms::option")]
    pub per_adapter_timeout: Option<Duration>,
    pub stream: SseDecoderConfig,
    pub metrics: MetricsConfig,
    pub cache: CacheConfig,
}

impl RelayConfig {
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.per_adapter_timeout = Some(timeout);
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }
}

/// `Duration` as integer milliseconds.
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
        }
    }
}
