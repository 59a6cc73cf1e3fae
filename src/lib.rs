//! # ai-lib-relay
//!
//! 面向多厂商 AI 补全服务的弹性请求编排核心：错误分类、退避重试、流式解码、并发扇出与指标统计。
//!
//! Resilient multi-provider request orchestration. Issue a prompt or a multi-turn
//! conversation against one or more interchangeable completion providers through one
//! interface, survive transient failures, and report latency and throughput.
//!
//! ## Overview
//!
//! Provider specifics (request JSON, auth, endpoints) live behind the narrow
//! [`ProviderAdapter`] trait. This crate supplies everything around it:
//!
//! - **Error classification**: every raw [`Failure`] maps to one [`ErrorKind`] plus a retry
//!   decision; callers only ever see the closed taxonomy
//! - **Retry**: four backoff strategies, capped delays, last-error-wins on exhaustion
//! - **Streaming**: an SSE decoder that reassembles frames split across transport chunks
//! - **Fan-out**: the same request to N adapters concurrently, outcomes in input order
//! - **Metrics**: success rates, nearest-rank latency percentiles, tokens, cache hit rate
//! - **Sessions**: conversations that roll back the user turn when a send fails
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ai_lib_relay::{
//!     AiRelay, Completion, CompletionRequest, Failure, ProviderAdapter,
//! };
//! use async_trait::async_trait;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl ProviderAdapter for Echo {
//!     fn name(&self) -> &str {
//!         "echo"
//!     }
//!
//!     async fn invoke(&self, request: &CompletionRequest) -> Result<Completion, Failure> {
//!         let last = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
//!         Ok(Completion::new(last))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> ai_lib_relay::Result<()> {
//!     let relay = AiRelay::builder().with_adapter(Echo).build()?;
//!
//!     for outcome in relay.fan_out(&CompletionRequest::prompt("ping")).await {
//!         println!("{}: {:?}", outcome.provider_name, outcome.content());
//!     }
//!     println!("{:?}", relay.metrics());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`AiRelay`] facade, builder, chat sessions, error classifier |
//! | [`drivers`] | [`ProviderAdapter`] trait and completion types |
//! | [`resilience`] | Backoff strategies, [`RetryExecutor`], injectable clock/sleeper |
//! | [`pipeline`] | SSE decoding, text accumulation, fan-out |
//! | [`telemetry`] | [`MetricsAggregator`] and [`MetricsSnapshot`] |
//! | [`cache`] | Optional response cache |
//! | [`config`] | [`RelayConfig`], YAML loading, environment overrides |
//! | [`transport`] | Pooled HTTP transport for adapter implementations |
//! | [`types`] | Messages, conversations, requests, stream events |

pub mod cache;
pub mod client;
pub mod config;
pub mod drivers;
pub mod pipeline;
pub mod resilience;
pub mod telemetry;
pub mod transport;
pub mod types;
pub mod utils;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext, ErrorKind};

// Re-export main types for convenience
pub use client::{AiRelay, AiRelayBuilder, ChatSession, Failure};
pub use config::RelayConfig;
pub use drivers::{ChunkStream, Completion, ProviderAdapter, UsageInfo};
pub use pipeline::{FanoutExecutor, FanoutOutcome, SseDecoder};
pub use resilience::{BackoffStrategy, RetryExecutor, RetryPolicy};
pub use telemetry::{MetricsAggregator, MetricsSnapshot};
pub use types::{CompletionRequest, Conversation, Message, MessageRole, StreamEvent};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream that emits `Result<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;
