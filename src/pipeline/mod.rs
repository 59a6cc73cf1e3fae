//! 流水线处理模块：流式解码、内容累积与多 Provider 并发扇出。
//!
//! # Pipeline Layer
//!
//! Everything between a provider's raw output and what the caller receives.
//!
//! ```text
//! Raw chunks ─→ Decoder ─→ StreamEvent* ─→ Accumulator ─→ text
//!
//! request ─→ FanoutExecutor ─┬─→ RetryExecutor ─→ adapter #1 ─┐
//!                            ├─→ RetryExecutor ─→ adapter #2 ─┼─→ [FanoutOutcome] (input order)
//!                            └─→ RetryExecutor ─→ adapter #n ─┘
//! ```
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`decode`] | SSE decoder with cross-chunk line reassembly |
//! | [`accumulate`] | Folds content deltas into the full reply |
//! | [`fan_out`] | Concurrent, failure-isolated multi-adapter execution |
//!
//! ## Example
//!
//! ```rust
//! use ai_lib_relay::pipeline::{collect_text, Decoder, SseDecoder};
//! use ai_lib_relay::Failure;
//! use bytes::Bytes;
//! use futures::stream;
//!
//! # tokio_test_block_on(async {
//! let frames: Vec<Result<Bytes, Failure>> = vec![
//!     Ok(Bytes::from_static(b"data: {\"delta\":\"He")),
//!     Ok(Bytes::from_static(b"llo\"}\ndata: [DONE]\n")),
//! ];
//! let chunks = Box::pin(stream::iter(frames));
//! let text = collect_text(SseDecoder::new().decode(chunks)).await?;
//! assert_eq!(text, "Hello");
//! # Ok::<(), ai_lib_relay::Error>(())
//! # }).unwrap();
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

pub mod accumulate;
pub mod decode;
pub mod fan_out;

pub use accumulate::{collect_text, TextAccumulator};
pub use decode::{SseDecoder, SseDecoderConfig};
pub use fan_out::{FanoutExecutor, FanoutOutcome};

use crate::drivers::ChunkStream;
use crate::types::StreamEvent;
use crate::BoxStream;

/// Turns a raw chunk feed into a lazy, single-consumer sequence of [`StreamEvent`]s.
///
/// The sequence ends after an event with `is_final == true` or after one error. A sequence that
/// simply ends is treated as a complete reply.
pub trait Decoder: Send + Sync {
    fn decode(&self, input: ChunkStream) -> BoxStream<'static, StreamEvent>;
}
