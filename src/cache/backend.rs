//! Cache backend implementations.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::key::CacheKey;
use crate::resilience::{Clock, SystemClock};
use crate::Result;

#[derive(Clone)]
struct CacheEntry {
    data: Vec<u8>,
    expires_at: Instant,
    last_accessed: Instant,
}

#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &CacheKey) -> Result<bool>;
    async fn clear(&self) -> Result<()>;
    async fn len(&self) -> Result<usize>;
    fn name(&self) -> &'static str;
}

/// In-process map with per-entry TTL. When full, the least recently read entry goes first.
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    max_entries: usize,
    clock: Arc<dyn Clock>,
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        Self::with_clock(max_entries, Arc::new(SystemClock))
    }

    pub fn with_clock(max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries: max_entries.max(1),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn evict_if_needed(&self, entries: &mut HashMap<String, CacheEntry>, now: Instant) {
        entries.retain(|_, e| e.expires_at > now);
        while entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    entries.remove(&k);
                }
                None => break,
            }
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        let now = self.clock.now();
        let mut entries = self.lock();
        match entries.get_mut(key.as_str()) {
            Some(entry) if entry.expires_at > now => {
                entry.last_accessed = now;
                return Ok(Some(entry.data.clone()));
            }
            Some(_) => {}
            None => return Ok(None),
        }
        entries.remove(key.as_str());
        Ok(None)
    }

    async fn set(&self, key: &CacheKey, value: &[u8], ttl: Duration) -> Result<()> {
        let now = self.clock.now();
        let mut entries = self.lock();
        entries.remove(key.as_str());
        self.evict_if_needed(&mut entries, now);
        entries.insert(
            key.as_str().to_string(),
            CacheEntry {
                data: value.to_vec(),
                expires_at: now + ttl,
                last_accessed: now,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.lock().remove(key.as_str()).is_some())
    }

    async fn clear(&self) -> Result<()> {
        self.lock().clear();
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        let now = self.clock.now();
        Ok(self.lock().values().filter(|e| e.expires_at > now).count())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Backend that stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCache;

#[async_trait]
impl CacheBackend for NullCache {
    async fn get(&self, _: &CacheKey) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
    async fn set(&self, _: &CacheKey, _: &[u8], _: Duration) -> Result<()> {
        Ok(())
    }
    async fn delete(&self, _: &CacheKey) -> Result<bool> {
        Ok(false)
    }
    async fn clear(&self) -> Result<()> {
        Ok(())
    }
    async fn len(&self) -> Result<usize> {
        Ok(0)
    }
    fn name(&self) -> &'static str {
        "null"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::ManualClock;

    fn key(s: &str) -> CacheKey {
        CacheKey::new(s)
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let clock = Arc::new(ManualClock::new());
        let cache = MemoryCache::with_clock(10, clock.clone());
        cache.set(&key("a"), b"1", Duration::from_secs(5)).await.unwrap();

        clock.advance(Duration::from_secs(4));
        assert_eq!(cache.get(&key("a")).await.unwrap(), Some(b"1".to_vec()));

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get(&key("a")).await.unwrap(), None);
        assert_eq!(cache.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn least_recently_read_is_evicted_first() {
        let clock = Arc::new(ManualClock::new());
        let cache = MemoryCache::with_clock(2, clock.clone());
        let ttl = Duration::from_secs(60);
        cache.set(&key("a"), b"a", ttl).await.unwrap();
        clock.advance(Duration::from_millis(1));
        cache.set(&key("b"), b"b", ttl).await.unwrap();
        clock.advance(Duration::from_millis(1));
        cache.get(&key("a")).await.unwrap();
        clock.advance(Duration::from_millis(1));
        cache.set(&key("c"), b"c", ttl).await.unwrap();

        assert!(cache.get(&key("a")).await.unwrap().is_some());
        assert!(cache.get(&key("b")).await.unwrap().is_none());
        assert!(cache.get(&key("c")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn overwrite_does_not_evict_others() {
        let cache = MemoryCache::new(2);
        let ttl = Duration::from_secs(60);
        cache.set(&key("a"), b"1", ttl).await.unwrap();
        cache.set(&key("b"), b"1", ttl).await.unwrap();
        cache.set(&key("b"), b"2", ttl).await.unwrap();
        assert_eq!(cache.len().await.unwrap(), 2);
        assert_eq!(cache.get(&key("b")).await.unwrap(), Some(b"2".to_vec()));
    }

    #[tokio::test]
    async fn null_cache_stores_nothing() {
        let cache = NullCache;
        cache.set(&key("a"), b"1", Duration::from_secs(1)).await.unwrap();
        assert_eq!(cache.get(&key("a")).await.unwrap(), None);
        assert!(!cache.delete(&key("a")).await.unwrap());
    }
}
