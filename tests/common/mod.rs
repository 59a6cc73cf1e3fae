//! Shared fixtures for integration tests: scripted adapters and log setup.

#![allow(dead_code)]

use ai_lib_relay::{
    ChunkStream, Completion, CompletionRequest, Failure, ProviderAdapter, RetryPolicy, UsageInfo,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Route library logs to the test harness. Set `RUST_LOG=ai_lib_relay=debug` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

type StreamScript = Result<Vec<Result<Bytes, Failure>>, Failure>;

/// Adapter that replays queued replies, then repeats its fallback reply forever.
pub struct ScriptedAdapter {
    name: String,
    delay: Duration,
    conversations: bool,
    streaming: bool,
    policy: Option<RetryPolicy>,
    replies: Mutex<VecDeque<Result<Completion, Failure>>>,
    fallback: Result<Completion, Failure>,
    streams: Mutex<VecDeque<StreamScript>>,
    calls: AtomicU32,
    stream_calls: AtomicU32,
    seen: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedAdapter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            delay: Duration::ZERO,
            conversations: false,
            streaming: false,
            policy: None,
            replies: Mutex::new(VecDeque::new()),
            fallback: Ok(Completion::new(format!("{} reply", name))),
            streams: Mutex::new(VecDeque::new()),
            calls: AtomicU32::new(0),
            stream_calls: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, millis: u64) -> Self {
        self.delay = Duration::from_millis(millis);
        self
    }

    pub fn conversational(mut self) -> Self {
        self.conversations = true;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn then_ok(self, content: &str) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(Ok(Completion::new(content).with_usage(UsageInfo::new(3, 2))));
        self
    }

    pub fn then_err(self, failure: Failure) -> Self {
        self.replies.lock().unwrap().push_back(Err(failure));
        self
    }

    pub fn always_err(mut self, failure: Failure) -> Self {
        self.fallback = Err(failure);
        self
    }

    /// Queue a stream whose chunks are delivered one by one.
    pub fn then_stream(mut self, chunks: &[&str]) -> Self {
        self.streaming = true;
        let chunks = chunks
            .iter()
            .map(|c| Ok(Bytes::from(c.to_string())))
            .collect();
        self.streams.lock().unwrap().push_back(Ok(chunks));
        self
    }

    /// Queue a stream that delivers `chunks` and then fails with `failure`.
    pub fn then_broken_stream(mut self, chunks: &[&str], failure: Failure) -> Self {
        self.streaming = true;
        let mut items: Vec<Result<Bytes, Failure>> = chunks
            .iter()
            .map(|c| Ok(Bytes::from(c.to_string())))
            .collect();
        items.push(Err(failure));
        self.streams.lock().unwrap().push_back(Ok(items));
        self
    }

    /// Queue a failure to open the stream at all.
    pub fn then_stream_open_err(mut self, failure: Failure) -> Self {
        self.streaming = true;
        self.streams.lock().unwrap().push_back(Err(failure));
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn stream_calls(&self) -> u32 {
        self.stream_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    fn supports_conversations(&self) -> bool {
        self.conversations
    }

    fn retry_policy(&self) -> Option<RetryPolicy> {
        self.policy.clone()
    }

    async fn invoke(&self, request: &CompletionRequest) -> Result<Completion, Failure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.replies.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }

    async fn invoke_stream(&self, request: &CompletionRequest) -> Result<ChunkStream, Failure> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request.clone());
        let script = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Failure::other("no stream scripted")));
        let chunks = script?;
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

/// Retry policy with no waiting between attempts.
pub fn instant_retries(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(
        ai_lib_relay::BackoffStrategy::Fixed,
        max_attempts,
        Duration::ZERO,
    )
}
