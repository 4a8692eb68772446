//! Testing utilities.
//!
//! This module provides tools for integration testing:
//! - `MockGenerator` for deterministic generation without network calls
//! - `RecordingSink` to capture coordinator output
//! - `ManualClock` for controlled case timing
//! - `TestHarness` wiring a dispatcher to an in-memory store

use crate::case::CaseDraft;
use crate::clock::Clock;
use crate::coordinator::{Frame, OutputSink, StreamingCoordinator};
use crate::dispatcher::{Dispatcher, Response};
use crate::generation::{GenerationError, Generator};
use crate::model::{GameSession, GenerationConfig};
use crate::offline::DEMO_CASE;
use crate::store::SessionStore;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A generator that returns scripted responses in order.
#[derive(Default)]
pub struct MockGenerator {
    responses: Mutex<VecDeque<Result<String, GenerationError>>>,
    prompts: Mutex<Vec<String>>,
    delay: Duration,
    chunk_size: usize,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Stream in chunks of this many characters. 0 sends one chunk.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn push_response(&self, text: impl Into<String>) {
        lock(&self.responses).push_back(Ok(text.into()));
    }

    pub fn push_error(&self, error: GenerationError) {
        lock(&self.responses).push_back(Err(error));
    }

    /// Every prompt received so far.
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.prompts).len()
    }

    async fn next(&self, prompt: &str) -> Result<String, GenerationError> {
        lock(&self.prompts).push(prompt.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        lock(&self.responses).pop_front().unwrap_or_else(|| {
            Err(GenerationError::Malformed(
                "no scripted response left".to_string(),
            ))
        })
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(
        &self,
        prompt: &str,
        _config: &GenerationConfig,
    ) -> Result<String, GenerationError> {
        self.next(prompt).await
    }

    async fn generate_streaming(
        &self,
        prompt: &str,
        _config: &GenerationConfig,
        on_chunk: &mut (dyn for<'c> FnMut(&'c str) + Send),
    ) -> Result<String, GenerationError> {
        let text = self.next(prompt).await?;
        if self.chunk_size == 0 {
            on_chunk(&text);
        } else {
            let chars: Vec<char> = text.chars().collect();
            for piece in chars.chunks(self.chunk_size) {
                on_chunk(&piece.iter().collect::<String>());
            }
        }
        Ok(text)
    }
}

/// Sink that records every frame.
#[derive(Debug, Default)]
pub struct RecordingSink {
    frames: Mutex<Vec<Frame>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<Frame> {
        lock(&self.frames).clone()
    }

    /// Concatenated `Content` frames.
    pub fn content(&self) -> String {
        lock(&self.frames)
            .iter()
            .filter_map(|f| match f {
                Frame::Content(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.frames).clear();
    }
}

impl OutputSink for RecordingSink {
    fn emit(&self, frame: Frame) {
        lock(&self.frames).push(frame);
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, seconds: i64) {
        let mut now = lock(&self.now);
        *now += chrono::Duration::seconds(seconds);
    }

    pub fn set(&self, time: DateTime<Utc>) {
        *lock(&self.now) = time;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0)
                .single()
                .unwrap_or_else(Utc::now),
        )
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }
}

/// A session with the demo case installed and its clock started.
pub fn demo_session() -> GameSession {
    let mut session = GameSession::default();
    if let Ok(draft) = CaseDraft::parse(DEMO_CASE) {
        let start = ManualClock::default().now();
        draft
            .into_patch("MH25DEMO01".to_string(), session.difficulty, start)
            .apply(&mut session);
    }
    session
}

/// Test harness for running command scenarios.
pub struct TestHarness {
    pub generator: Arc<MockGenerator>,
    pub sink: Arc<RecordingSink>,
    pub clock: Arc<ManualClock>,
    pub store: SessionStore,
    pub dispatcher: Dispatcher,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_store(SessionStore::in_memory())
    }

    pub fn with_store(store: SessionStore) -> Self {
        Self::with_generator(MockGenerator::new(), store)
    }

    pub fn with_generator(generator: MockGenerator, store: SessionStore) -> Self {
        let generator = Arc::new(generator);
        let sink = Arc::new(RecordingSink::new());
        let clock = Arc::new(ManualClock::default());
        let coordinator = StreamingCoordinator::new(sink.clone())
            .with_filler_interval(Duration::from_millis(50));
        let dispatcher = Dispatcher::new(generator.clone(), coordinator, clock.clone());

        Self {
            generator,
            sink,
            clock,
            store,
            dispatcher,
        }
    }

    /// Queue the demo case as the next generation response.
    pub fn expect_case(&self) -> &Self {
        self.generator.push_response(DEMO_CASE);
        self
    }

    /// Queue a plain text response.
    pub fn expect_response(&self, text: impl Into<String>) -> &Self {
        self.generator.push_response(text);
        self
    }

    /// Run one command line to completion.
    pub async fn run(&mut self, line: &str) -> Response {
        self.dispatcher
            .execute(line, &mut self.store, &CancellationToken::new())
            .await
    }

    pub fn session(&self) -> &GameSession {
        self.store.get()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_streams_owned_chunks() {
        let generator = MockGenerator::new().with_chunk_size(2);
        generator.push_response("侦探小说");

        let mut chunks: Vec<String> = Vec::new();
        let mut collect = |chunk: &str| chunks.push(chunk.to_owned());
        let text = generator
            .generate_streaming("prompt", &GenerationConfig::default(), &mut collect)
            .await
            .unwrap();

        assert_eq!(text, "侦探小说");
        assert_eq!(chunks, vec!["侦探".to_string(), "小说".to_string()]);
        assert_eq!(generator.prompts(), vec!["prompt".to_string()]);
    }
}
