//! Completion cache in front of a [`CacheBackend`].

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::backend::{CacheBackend, MemoryCache, NullCache};
use super::key::CacheKey;
use crate::config::duration_ms;
use crate::drivers::Completion;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    #[serde(rename = "ttl_ms", with = "duration_ms")]
    pub ttl: Duration,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl: Duration::from_secs(300),
            max_entries: 1000,
        }
    }
}

impl CacheConfig {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }
}

pub struct ResponseCache {
    ttl: Duration,
    backend: Box<dyn CacheBackend>,
}

impl ResponseCache {
    pub fn new(ttl: Duration, backend: Box<dyn CacheBackend>) -> Self {
        Self { ttl, backend }
    }

    /// Memory-backed when enabled, a no-op otherwise.
    pub fn from_config(config: &CacheConfig) -> Self {
        let backend: Box<dyn CacheBackend> = if config.enabled {
            Box::new(MemoryCache::new(config.max_entries))
        } else {
            Box::new(NullCache)
        };
        Self::new(config.ttl, backend)
    }

    /// Cached completion for `key`. An undecodable entry is dropped and reported as a miss.
    pub async fn get(&self, key: &CacheKey) -> Result<Option<Completion>> {
        let Some(data) = self.backend.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_slice(&data) {
            Ok(completion) => Ok(Some(completion)),
            Err(e) => {
                debug!(key = %key, error = %e, "discarding undecodable cache entry");
                self.backend.delete(key).await?;
                Ok(None)
            }
        }
    }

    pub async fn put(&self, key: &CacheKey, completion: &Completion) -> Result<()> {
        let data = serde_json::to_vec(completion)
            .map_err(|e| crate::Error::parse(format!("cannot encode completion: {}", e)))?;
        self.backend.set(key, &data, self.ttl).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.backend.clear().await
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("ttl", &self.ttl)
            .field("backend", &self.backend.name())
            .finish()
    }
}
