//! 响应缓存模块：对相同请求复用已完成的响应，减少重复的 Provider 调用。
//!
//! # Response Caching Module
//!
//! Non-streamed completions can be cached per adapter. Keys hash the adapter name, model,
//! messages, temperature and token limit, so a changed parameter never returns a stale reply.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ResponseCache`] | Typed completion cache with a fixed TTL |
//! | [`CacheConfig`] | `enabled`, `ttl_ms`, `max_entries` |
//! | [`CacheBackend`] | Trait for storage backends |
//! | [`MemoryCache`] | In-process backend with TTL and least-recently-read eviction |
//! | [`NullCache`] | Backend used when caching is disabled |
//! | [`CacheKey`] | SHA-256 request fingerprint |
//!
//! ```rust
//! use ai_lib_relay::cache::{CacheConfig, ResponseCache};
//! use std::time::Duration;
//!
//! let config = CacheConfig::enabled()
//!     .with_ttl(Duration::from_secs(60))
//!     .with_max_entries(500);
//! let cache = ResponseCache::from_config(&config);
//! assert_eq!(cache.backend_name(), "memory");
//! ```

mod backend;
mod key;
mod manager;

pub use backend::{CacheBackend, MemoryCache, NullCache};
pub use key::CacheKey;
pub use manager::{CacheConfig, ResponseCache};
