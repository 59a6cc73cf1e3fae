//! Multi-turn conversations with rollback on failure.

use futures::{stream, StreamExt};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::client::core::AiRelay;
use crate::drivers::{Completion, ProviderAdapter};
use crate::error::Error;
use crate::pipeline::TextAccumulator;
use crate::types::{CompletionRequest, Conversation, StreamEvent};
use crate::{BoxStream, Result};

/// One conversation with one adapter.
///
/// A turn is committed only when the adapter answers: if a send fails, the user message it
/// appended is removed again, so resending never duplicates a turn.
pub struct ChatSession<'a> {
    id: Uuid,
    relay: &'a AiRelay,
    adapter: Arc<dyn ProviderAdapter>,
    conversation: Conversation,
    model: Option<String>,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
}

impl<'a> ChatSession<'a> {
    pub(crate) fn new(relay: &'a AiRelay, adapter: Arc<dyn ProviderAdapter>) -> Self {
        Self {
            id: Uuid::new_v4(),
            relay,
            adapter,
            conversation: Conversation::new(),
            model: None,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Seed the conversation with a system prompt.
    pub fn with_system(mut self, prompt: impl Into<String>) -> Self {
        self.conversation.push_system(prompt);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn adapter_name(&self) -> &str {
        self.adapter.name()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    fn request(&self) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            messages: self.conversation.messages().to_vec(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: false,
        }
    }

    /// Append a user turn and wait for the full reply.
    pub async fn send(&mut self, text: impl Into<String>) -> Result<Completion> {
        let mark = self.conversation.len();
        self.conversation.push_user(text);
        let request = self.request();

        match self.relay.execute(&self.adapter, &request).await {
            Ok(completion) => {
                self.conversation.push_assistant(completion.content.clone());
                Ok(completion)
            }
            Err(e) => {
                debug!(session = %self.id, "send failed, rolling back user turn");
                self.conversation.rollback_to(mark);
                Err(e)
            }
        }
    }

    /// Append a user turn and stream the reply.
    ///
    /// The assistant turn is recorded when the final event arrives. If the stream fails, or is
    /// dropped before finishing, the user turn is rolled back.
    pub async fn send_streaming(
        &mut self,
        text: impl Into<String>,
    ) -> Result<BoxStream<'_, StreamEvent>> {
        if !self.adapter.supports_streaming() {
            return Err(Error::configuration(format!(
                "adapter '{}' does not support streaming",
                self.adapter.name()
            )));
        }

        let mark = self.conversation.len();
        self.conversation.push_user(text);
        let request = self.request();

        let events = match self.relay.open_stream(&self.adapter, &request).await {
            Ok(events) => events,
            Err(e) => {
                self.conversation.rollback_to(mark);
                return Err(e);
            }
        };

        let turn = PendingTurn {
            conversation: &mut self.conversation,
            mark,
            reply: TextAccumulator::new(),
            committed: false,
        };

        let relayed = stream::unfold(Some((events, turn)), |state| async move {
            let (mut events, mut turn) = state?;
            match events.next().await {
                Some(Ok(event)) => {
                    turn.reply.push(&event);
                    if event.is_final {
                        turn.commit();
                        return Some((Ok(event), None));
                    }
                    Some((Ok(event), Some((events, turn))))
                }
                // `turn` drops here and rolls the user message back.
                Some(Err(e)) => Some((Err(e), None)),
                None => {
                    turn.commit();
                    None
                }
            }
        });
        Ok(Box::pin(relayed))
    }
}

/// User turn waiting for its streamed reply.
struct PendingTurn<'c> {
    conversation: &'c mut Conversation,
    mark: usize,
    reply: TextAccumulator,
    committed: bool,
}

impl PendingTurn<'_> {
    fn commit(&mut self) {
        if !self.committed {
            let reply = std::mem::take(&mut self.reply).into_text();
            self.conversation.push_assistant(reply);
            self.committed = true;
        }
    }
}

impl Drop for PendingTurn<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.conversation.rollback_to(self.mark);
        }
    }
}
