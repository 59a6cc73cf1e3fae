//! Streaming events produced by the SSE decoder.

use serde::{Deserialize, Serialize};

/// One step of an incremental response.
///
/// A decoded stream is a finite sequence of these, ended by exactly one event with
/// `is_final == true` (or by a `Stream` error).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub content_delta: String,
    pub is_final: bool,
}

impl StreamEvent {
    pub fn delta(content: impl Into<String>) -> Self {
        Self {
            content_delta: content.into(),
            is_final: false,
        }
    }

    pub fn finish() -> Self {
        Self {
            content_delta: String::new(),
            is_final: true,
        }
    }
}
