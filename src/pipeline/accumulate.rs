//! Content accumulation: folds decoded deltas back into the full reply text.

use crate::types::StreamEvent;
use crate::{BoxStream, Result};
use futures::StreamExt;

/// Buffers content deltas until the final event is seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextAccumulator {
    text: String,
    finished: bool,
}

impl TextAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one event; deltas arriving after the final event are ignored.
    pub fn push(&mut self, event: &StreamEvent) {
        if self.finished {
            return;
        }
        self.text.push_str(&event.content_delta);
        if event.is_final {
            self.finished = true;
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

/// Drain a decoded stream and return the concatenated content.
///
/// The first error aborts collection and is returned as-is.
pub async fn collect_text(mut events: BoxStream<'_, StreamEvent>) -> Result<String> {
    let mut acc = TextAccumulator::new();
    while let Some(event) = events.next().await {
        acc.push(&event?);
        if acc.is_finished() {
            break;
        }
    }
    Ok(acc.into_text())
}
