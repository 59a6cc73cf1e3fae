//! Streaming decoder (raw chunks -> [`StreamEvent`])
//!
//! Decodes newline-delimited Server-Sent-Events frames of the form `data: <json>`, terminated by
//! `data: [DONE]` or by a provider-specific terminal event. Transport chunk boundaries do not
//! line up with frame boundaries, so the unterminated tail of every chunk is buffered and joined
//! with the next one before splitting into lines.

use crate::client::error_classification::classify_error;
use crate::drivers::ChunkStream;
use crate::error::ErrorKind;
use crate::pipeline::Decoder;
use crate::types::StreamEvent;
use crate::utils::PathMapper;
use crate::{BoxStream, Result};
use bytes::BytesMut;
use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// Frame-level settings for [`SseDecoder`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SseDecoderConfig {
    /// Line prefix carrying a payload. One space after it is optional.
    pub prefix: String,
    /// Payload that ends the stream.
    pub done_signal: String,
    /// Paths probed, in order, for a string content delta.
    pub content_paths: Vec<String>,
    /// Path of the event-type discriminator in a JSON payload.
    pub event_type_path: String,
    /// Event types that explicitly complete the stream.
    pub terminal_event_types: Vec<String>,
}

impl Default for SseDecoderConfig {
    fn default() -> Self {
        Self {
            prefix: "data:".to_string(),
            done_signal: "[DONE]".to_string(),
            content_paths: vec![
                "delta".to_string(),
                "choices.0.delta.content".to_string(),
                "delta.text".to_string(),
                "message.content".to_string(),
            ],
            event_type_path: "type".to_string(),
            terminal_event_types: vec![
                "message_stop".to_string(),
                "response.completed".to_string(),
            ],
        }
    }
}

/// What a single line contributes to the event sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Frame {
    Event(StreamEvent),
    Skip,
}

fn parse_line(config: &SseDecoderConfig, raw: &str) -> Frame {
    let line = raw.trim_end_matches('\r');
    let Some(rest) = line.strip_prefix(config.prefix.as_str()) else {
        // event:, id:, retry:, comments and blank separators carry nothing for us
        return Frame::Skip;
    };
    let payload = rest.strip_prefix(' ').unwrap_or(rest).trim();

    if payload == config.done_signal {
        return Frame::Event(StreamEvent::finish());
    }
    if payload.is_empty() {
        return Frame::Skip;
    }

    let value: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "skipping malformed SSE frame");
            return Frame::Skip;
        }
    };

    if let Some(event_type) = PathMapper::get_str(&value, &config.event_type_path) {
        if config.terminal_event_types.iter().any(|t| t == event_type) {
            return Frame::Event(StreamEvent::finish());
        }
    }

    config
        .content_paths
        .iter()
        .find_map(|path| PathMapper::get_str(&value, path))
        .map(|delta| Frame::Event(StreamEvent::delta(delta)))
        .unwrap_or(Frame::Skip)
}

struct DecodeState {
    input: ChunkStream,
    config: Arc<SseDecoderConfig>,
    buf: BytesMut,
    /// Bytes of `buf` already known to hold no newline.
    scanned: usize,
    pending: VecDeque<Result<StreamEvent>>,
    finished: bool,
}

impl DecodeState {
    fn handle_line(&mut self, bytes: &[u8]) {
        let text = String::from_utf8_lossy(bytes);
        if let Frame::Event(event) = parse_line(&self.config, &text) {
            let is_final = event.is_final;
            self.pending.push_back(Ok(event));
            if is_final {
                self.finished = true;
                self.buf.clear();
                self.scanned = 0;
            }
        }
    }

    /// Process every complete line currently buffered; stops early on a final event.
    fn drain_lines(&mut self) {
        while !self.finished {
            let Some(offset) = self.buf[self.scanned..].iter().position(|b| *b == b'\n') else {
                self.scanned = self.buf.len();
                break;
            };
            let line = self.buf.split_to(self.scanned + offset + 1);
            self.scanned = 0;
            self.handle_line(&line[..line.len() - 1]);
        }
    }
}

/// SSE decoder with provider-agnostic content extraction.
#[derive(Debug, Clone, Default)]
pub struct SseDecoder {
    config: Arc<SseDecoderConfig>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: SseDecoderConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &SseDecoderConfig {
        &self.config
    }
}

impl Decoder for SseDecoder {
    fn decode(&self, input: ChunkStream) -> BoxStream<'static, StreamEvent> {
        let state = DecodeState {
            input,
            config: Arc::clone(&self.config),
            buf: BytesMut::new(),
            scanned: 0,
            pending: VecDeque::new(),
            finished: false,
        };

        let events = stream::unfold(state, |mut st| async move {
            loop {
                if let Some(item) = st.pending.pop_front() {
                    return Some((item, st));
                }
                if st.finished {
                    return None;
                }

                st.drain_lines();
                if !st.pending.is_empty() || st.finished {
                    continue;
                }

                match st.input.next().await {
                    Some(Ok(chunk)) => st.buf.extend_from_slice(&chunk),
                    Some(Err(failure)) => {
                        // A half-received line is never trusted.
                        st.buf.clear();
                        st.scanned = 0;
                        st.finished = true;
                        let err = classify_error(&failure).into_kind(ErrorKind::Stream);
                        let context = err
                            .context()
                            .clone()
                            .with_source("sse_decoder")
                            .with_details(failure.to_string());
                        st.pending.push_back(Err(err.with_context(context)));
                    }
                    None => {
                        if !st.buf.is_empty() {
                            let tail = st.buf.split();
                            st.scanned = 0;
                            st.handle_line(&tail);
                        }
                        if !st.finished {
                            debug!("stream closed without a terminal frame");
                            st.pending.push_back(Ok(StreamEvent::finish()));
                            st.finished = true;
                        }
                    }
                }
            }
        });

        Box::pin(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::error_classification::Failure;
    use bytes::Bytes;

    fn chunks(parts: &[&str]) -> ChunkStream {
        let items: Vec<std::result::Result<Bytes, Failure>> = parts
            .iter()
            .map(|p| Ok(Bytes::from(p.to_string())))
            .collect();
        Box::pin(stream::iter(items))
    }

    async fn decode_all(parts: &[&str]) -> Vec<Result<StreamEvent>> {
        SseDecoder::new().decode(chunks(parts)).collect().await
    }

    #[test]
    fn parse_line_variants() {
        let cfg = SseDecoderConfig::default();
        assert_eq!(
            parse_line(&cfg, r#"data: {"delta":"x"}"#),
            Frame::Event(StreamEvent::delta("x"))
        );
        assert_eq!(
            parse_line(&cfg, r#"data:{"delta":"x"}"#),
            Frame::Event(StreamEvent::delta("x"))
        );
        assert_eq!(
            parse_line(&cfg, "data: [DONE]\r"),
            Frame::Event(StreamEvent::finish())
        );
        assert_eq!(parse_line(&cfg, "event: ping"), Frame::Skip);
        assert_eq!(parse_line(&cfg, ": keep-alive"), Frame::Skip);
        assert_eq!(parse_line(&cfg, ""), Frame::Skip);
        assert_eq!(parse_line(&cfg, r#"data: {"role":"assistant"}"#), Frame::Skip);
    }

    #[test]
    fn parse_line_understands_common_shapes() {
        let cfg = SseDecoderConfig::default();
        assert_eq!(
            parse_line(&cfg, r#"data: {"choices":[{"delta":{"content":"oa"}}]}"#),
            Frame::Event(StreamEvent::delta("oa"))
        );
        assert_eq!(
            parse_line(
                &cfg,
                r#"data: {"type":"content_block_delta","delta":{"type":"text_delta","text":"an"}}"#
            ),
            Frame::Event(StreamEvent::delta("an"))
        );
        assert_eq!(
            parse_line(&cfg, r#"data: {"type":"message_stop"}"#),
            Frame::Event(StreamEvent::finish())
        );
    }

    #[tokio::test]
    async fn reassembles_lines_split_across_chunks() {
        let events = decode_all(&["data: {\"delta\":\"He", "llo\"}\ndata: [DONE]\n"]).await;
        let events: Vec<_> = events.into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(events, vec![StreamEvent::delta("Hello"), StreamEvent::finish()]);
    }

    #[tokio::test]
    async fn malformed_frame_is_skipped() {
        let events = decode_all(&[
            "data: {\"delta\":\"a\"}\n",
            "data: {\"delta\": oops\n",
            "data: {\"delta\":\"b\"}\n\ndata: [DONE]\n\n",
        ])
        .await;
        let events: Vec<_> = events.into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(
            events,
            vec![
                StreamEvent::delta("a"),
                StreamEvent::delta("b"),
                StreamEvent::finish()
            ]
        );
    }

    #[tokio::test]
    async fn nothing_is_emitted_after_the_final_event() {
        let events = decode_all(&[
            "data: {\"type\":\"message_stop\"}\ndata: {\"delta\":\"late\"}\n",
            "data: {\"delta\":\"later\"}\n",
        ])
        .await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap(), &StreamEvent::finish());
    }

    #[tokio::test]
    async fn multibyte_characters_survive_chunk_splits() {
        let frame = "data: {\"delta\":\"héllo\"}\n".as_bytes();
        let split = frame.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let items: Vec<std::result::Result<Bytes, Failure>> = vec![
            Ok(Bytes::copy_from_slice(&frame[..split])),
            Ok(Bytes::copy_from_slice(&frame[split..])),
            Ok(Bytes::from_static(b"data: [DONE]\n")),
        ];
        let events: Vec<_> = SseDecoder::new()
            .decode(Box::pin(stream::iter(items)))
            .collect()
            .await;
        assert_eq!(events[0].as_ref().unwrap(), &StreamEvent::delta("héllo"));
    }

    #[tokio::test]
    async fn unterminated_tail_is_processed_at_eof() {
        let events = decode_all(&["data: {\"delta\":\"a\"}\ndata: {\"delta\":\"b\"}"]).await;
        let events: Vec<_> = events.into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(
            events,
            vec![
                StreamEvent::delta("a"),
                StreamEvent::delta("b"),
                StreamEvent::finish()
            ]
        );
    }

    #[tokio::test]
    async fn transport_failure_ends_stream_with_stream_error() {
        let items: Vec<std::result::Result<Bytes, Failure>> = vec![
            Ok(Bytes::from_static(b"data: {\"delta\":\"a\"}\ndata: {\"del")),
            Err(Failure::other("connection reset by peer")),
            Ok(Bytes::from_static(b"ta\":\"never\"}\n")),
        ];
        let events: Vec<_> = SseDecoder::new()
            .decode(Box::pin(stream::iter(items)))
            .collect()
            .await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap(), &StreamEvent::delta("a"));
        let err = events[1].as_ref().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Stream);
        assert_eq!(err.context().source.as_deref(), Some("sse_decoder"));
    }

    #[tokio::test]
    async fn single_large_chunk_decodes_every_line() {
        let mut body = String::new();
        for i in 0..60_000 {
            body.push_str(&format!("data: {{\"delta\":\"x{}\"}}\n", i));
        }
        body.push_str("data: [DONE]\n");

        let started = std::time::Instant::now();
        let events = decode_all(&[body.as_str()]).await;
        let elapsed = started.elapsed();

        assert_eq!(events.len(), 60_001);
        assert_eq!(events[0].as_ref().unwrap(), &StreamEvent::delta("x0"));
        assert_eq!(events[59_999].as_ref().unwrap(), &StreamEvent::delta("x59999"));
        assert_eq!(events[60_000].as_ref().unwrap(), &StreamEvent::finish());
        assert!(elapsed < std::time::Duration::from_secs(10), "took {:?}", elapsed);
    }

    #[tokio::test]
    async fn line_trickling_in_byte_by_byte_is_reassembled() {
        let frame = "data: {\"delta\":\"slow\"}\ndata: [DONE]\n";
        let parts: Vec<String> = frame.chars().map(|c| c.to_string()).collect();
        let parts: Vec<&str> = parts.iter().map(String::as_str).collect();
        let events: Vec<_> = decode_all(&parts)
            .await
            .into_iter()
            .map(|e| e.unwrap())
            .collect();
        assert_eq!(events, vec![StreamEvent::delta("slow"), StreamEvent::finish()]);
    }

    #[tokio::test]
    async fn mid_stream_http_failure_keeps_its_status() {
        let items: Vec<std::result::Result<Bytes, Failure>> = vec![
            Ok(Bytes::from_static(b"data: {\"delta\":\"a\"}\n")),
            Err(Failure::http(503, "upstream overloaded")),
        ];
        let events: Vec<_> = SseDecoder::new()
            .decode(Box::pin(stream::iter(items)))
            .collect()
            .await;

        let err = events[1].as_ref().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Stream);
        assert!(err.is_retryable());
        assert_eq!(err.context().status_code, Some(503));
        assert_eq!(err.context().source.as_deref(), Some("sse_decoder"));
    }

    #[tokio::test]
    async fn custom_config_changes_paths_and_terminal_types() {
        let decoder = SseDecoder::from_config(SseDecoderConfig {
            content_paths: vec!["out.text".to_string()],
            terminal_event_types: vec!["end".to_string()],
            ..SseDecoderConfig::default()
        });
        let events: Vec<_> = decoder
            .decode(chunks(&[
                "data: {\"out\":{\"text\":\"x\"}}\n",
                "data: {\"delta\":\"ignored\"}\n",
                "data: {\"type\":\"end\"}\n",
            ]))
            .collect()
            .await;
        let events: Vec<_> = events.into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(events, vec![StreamEvent::delta("x"), StreamEvent::finish()]);
    }
}
