//! YAML loading, environment overrides and validation for [`RelayConfig`].

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use super::RelayConfig;
use crate::error::{Error, ErrorContext};
use crate::resilience::BackoffStrategy;
use crate::Result;

pub const ENV_RETRY_STRATEGY: &str = "AI_RELAY_RETRY_STRATEGY";
pub const ENV_MAX_ATTEMPTS: &str = "AI_RELAY_MAX_ATTEMPTS";
pub const ENV_BASE_DELAY_MS: &str = "AI_RELAY_BASE_DELAY_MS";
pub const ENV_MAX_DELAY_MS: &str = "AI_RELAY_MAX_DELAY_MS";
pub const ENV_TIMEOUT_MS: &str = "AI_RELAY_TIMEOUT_MS";

fn parse_override<T: FromStr>(key: &str, raw: Option<String>) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    let raw = raw?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(variable = key, value = %raw, "ignoring unparseable override: {}", e);
            None
        }
    }
}

impl RelayConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: RelayConfig = serde_yaml::from_str(yaml).map_err(|e| {
            Error::configuration(format!("invalid relay config: {}", e))
                .with_context(ErrorContext::new().with_source("config_loader"))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration(format!("cannot read {}: {}", path.display(), e))
                .with_context(ErrorContext::new().with_source("config_loader"))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Apply `AI_RELAY_*` overrides from the process environment.
    pub fn apply_env_overrides(self) -> Result<Self> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides read through `lookup`. Values that fail to parse are logged and skipped;
    /// the merged result is validated.
    pub fn apply_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(strategy) =
            parse_override::<BackoffStrategy>(ENV_RETRY_STRATEGY, lookup(ENV_RETRY_STRATEGY))
        {
            self.retry.strategy = strategy;
        }
        if let Some(n) = parse_override::<u32>(ENV_MAX_ATTEMPTS, lookup(ENV_MAX_ATTEMPTS)) {
            self.retry.max_attempts = n;
        }
        if let Some(ms) = parse_override::<u64>(ENV_BASE_DELAY_MS, lookup(ENV_BASE_DELAY_MS)) {
            self.retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_override::<u64>(ENV_MAX_DELAY_MS, lookup(ENV_MAX_DELAY_MS)) {
            self.retry.max_delay = Some(Duration::from_millis(ms));
        }
        if let Some(ms) = parse_override::<u64>(ENV_TIMEOUT_MS, lookup(ENV_TIMEOUT_MS)) {
            self.per_adapter_timeout = Some(Duration::from_millis(ms));
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| {
            Err(Error::configuration(msg)
                .with_context(ErrorContext::new().with_source("config_validation")))
        };
        if let Some(max) = self.retry.max_delay {
            if max < self.retry.base_delay {
                return invalid(format!(
                    "retry.max_delay_ms ({}) is below retry.base_delay_ms ({})",
                    max.as_millis(),
                    self.retry.base_delay.as_millis()
                ));
            }
        }
        if self.per_adapter_timeout == Some(Duration::ZERO) {
            return invalid("per_adapter_timeout_ms must be greater than zero".to_string());
        }
        if self.stream.prefix.is_empty() {
            return invalid("stream.prefix must not be empty".to_string());
        }
        Ok(())
    }
}
