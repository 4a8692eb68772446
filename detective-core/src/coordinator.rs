//! Streaming coordinator.
//!
//! While a generation request is pending, a filler task prints rotating
//! "Analyzing: ..." lines. As soon as real content is available the filler is
//! stopped and joined, a completion banner is printed once, and only real
//! content follows.

use crate::generation::{GenerationError, Generator};
use crate::model::GenerationConfig;
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default delay between filler lines.
pub const DEFAULT_FILLER_INTERVAL: Duration = Duration::from_millis(800);

const FILLER_TOPICS: &[&str] = &[
    // weather
    "weather data",
    "environmental conditions",
    "meteorological factors",
    "temperature and humidity",
    "wind direction changes",
    // location
    "scene layout",
    "room dimensions",
    "window and door status",
    "terrain features",
    "location coordinates",
    // people
    "character relationships",
    "identity information",
    "behavior patterns",
    "witness testimony",
    "psychological state",
    // forensics
    "evidence samples",
    "DNA results",
    "fingerprint data",
    "bloodstain distribution",
    "the timeline",
];

/// A unit of console output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A full status line.
    Banner(String),
    /// A transient progress line that overwrites the current one.
    Filler(String),
    /// Blank out the current line.
    ClearLine,
    /// Real generated text.
    Content(String),
}

/// Where frames go.
pub trait OutputSink: Send + Sync {
    fn emit(&self, frame: Frame);
}

/// When the hand-off from filler to real content happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// On the first chunk; chunks are shown as they arrive.
    Streaming,
    /// On completion; the caller decides what to show.
    Buffered,
}

/// Banners and mode for one coordinated request.
#[derive(Debug, Clone)]
pub struct Job {
    pub mode: Mode,
    pub start_banner: String,
    pub complete_banner: String,
}

impl Job {
    pub fn streaming(start: impl Into<String>, complete: impl Into<String>) -> Self {
        Self {
            mode: Mode::Streaming,
            start_banner: start.into(),
            complete_banner: complete.into(),
        }
    }

    pub fn buffered(start: impl Into<String>, complete: impl Into<String>) -> Self {
        Self {
            mode: Mode::Buffered,
            start_banner: start.into(),
            complete_banner: complete.into(),
        }
    }
}

/// Runs generation requests with filler output.
#[derive(Clone)]
pub struct StreamingCoordinator {
    sink: Arc<dyn OutputSink>,
    filler_interval: Duration,
}

impl StreamingCoordinator {
    pub fn new(sink: Arc<dyn OutputSink>) -> Self {
        Self {
            sink,
            filler_interval: DEFAULT_FILLER_INTERVAL,
        }
    }

    pub fn with_filler_interval(mut self, interval: Duration) -> Self {
        self.filler_interval = interval;
        self
    }

    /// Run one request. Resolves with the full generated text.
    ///
    /// The filler task has always terminated when this returns. If `cancel`
    /// fires first, the request is dropped and `Cancelled` is returned.
    pub async fn run(
        &self,
        generator: &dyn Generator,
        prompt: &str,
        config: &GenerationConfig,
        job: &Job,
        cancel: &CancellationToken,
    ) -> Result<String, GenerationError> {
        self.sink.emit(Frame::Banner(job.start_banner.clone()));

        let stop = CancellationToken::new();
        let mut filler = Some(tokio::spawn(filler_loop(
            self.sink.clone(),
            self.filler_interval,
            stop.clone(),
        )));

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let mode = job.mode;
        let call = async move {
            let mut forward = move |chunk: &str| {
                if !chunk.is_empty() {
                    // The receiver outlives the call.
                    let _ = tx.send(chunk.to_string());
                }
            };
            match mode {
                Mode::Streaming => {
                    generator
                        .generate_streaming(prompt, config, &mut forward)
                        .await
                }
                Mode::Buffered => generator.generate(prompt, config).await,
            }
        };
        tokio::pin!(call);

        let mut handed_off = false;
        let mut shown = false;

        let outcome = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break Err(GenerationError::Cancelled),

                Some(chunk) = rx.recv() => {
                    if !handed_off {
                        self.hand_off(&stop, &mut filler, job).await;
                        handed_off = true;
                    }
                    shown = true;
                    self.sink.emit(Frame::Content(chunk));
                }

                result = &mut call => break result,
            }
        };

        match outcome {
            Ok(text) => {
                while let Ok(chunk) = rx.try_recv() {
                    if !handed_off {
                        self.hand_off(&stop, &mut filler, job).await;
                        handed_off = true;
                    }
                    shown = true;
                    self.sink.emit(Frame::Content(chunk));
                }
                if !handed_off {
                    self.hand_off(&stop, &mut filler, job).await;
                }
                if mode == Mode::Streaming && !shown && !text.is_empty() {
                    self.sink.emit(Frame::Content(text.clone()));
                }
                Ok(text)
            }
            Err(e) => {
                debug!(error = %e, "Generation failed, stopping filler");
                stop_filler(&stop, &mut filler).await;
                Err(e)
            }
        }
    }

    async fn hand_off(
        &self,
        stop: &CancellationToken,
        filler: &mut Option<JoinHandle<()>>,
        job: &Job,
    ) {
        stop_filler(stop, filler).await;
        debug!("Handing off from filler to content");
        self.sink.emit(Frame::Banner(job.complete_banner.clone()));
    }
}

/// Signal the filler to stop and wait for it to finish.
async fn stop_filler(stop: &CancellationToken, filler: &mut Option<JoinHandle<()>>) {
    stop.cancel();
    if let Some(handle) = filler.take() {
        if let Err(e) = handle.await {
            warn!(error = %e, "Filler task did not finish cleanly");
        }
    }
}

async fn filler_loop(sink: Arc<dyn OutputSink>, period: Duration, stop: CancellationToken) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = stop.cancelled() => {
                sink.emit(Frame::ClearLine);
                break;
            }

            _ = ticker.tick() => {
                sink.emit(Frame::Filler(filler_phrase()));
            }
        }
    }
}

/// A random "Analyzing: <topic>..." line.
pub fn filler_phrase() -> String {
    let topic = FILLER_TOPICS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("the case");
    format!("Analyzing: {topic}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockGenerator, RecordingSink};

    fn coordinator(sink: &Arc<RecordingSink>) -> StreamingCoordinator {
        StreamingCoordinator::new(sink.clone()).with_filler_interval(Duration::from_millis(100))
    }

    fn count_banners(frames: &[Frame], text: &str) -> usize {
        frames
            .iter()
            .filter(|f| matches!(f, Frame::Banner(b) if b == text))
            .count()
    }

    #[test]
    fn test_filler_phrase_shape() {
        let phrase = filler_phrase();
        assert!(phrase.starts_with("Analyzing: "));
        assert!(phrase.ends_with("..."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_streaming_no_filler_after_first_chunk() {
        let sink = Arc::new(RecordingSink::new());
        let generator = MockGenerator::new()
            .with_delay(Duration::from_millis(450))
            .with_chunk_size(4);
        generator.push_response("The butler did not do it.");

        let job = Job::streaming("Starting", "Done");
        let text = coordinator(&sink)
            .run(
                &generator,
                "prompt",
                &GenerationConfig::default(),
                &job,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(text, "The butler did not do it.");

        let frames = sink.frames();
        assert_eq!(frames.first(), Some(&Frame::Banner("Starting".to_string())));
        assert_eq!(count_banners(&frames, "Done"), 1);

        let first_content = frames
            .iter()
            .position(|f| matches!(f, Frame::Content(_)))
            .unwrap();
        let banner = frames
            .iter()
            .position(|f| *f == Frame::Banner("Done".to_string()))
            .unwrap();
        let clear = frames.iter().position(|f| *f == Frame::ClearLine).unwrap();

        // filler ran while waiting
        assert!(frames[..clear]
            .iter()
            .any(|f| matches!(f, Frame::Filler(_))));
        assert!(clear < banner && banner < first_content);
        assert!(!frames[clear..]
            .iter()
            .any(|f| matches!(f, Frame::Filler(_))));

        let shown: String = frames
            .iter()
            .filter_map(|f| match f {
                Frame::Content(c) => Some(c.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(shown, "The butler did not do it.");
    }

    #[tokio::test(start_paused = true)]
    async fn test_buffered_hands_off_on_completion() {
        let sink = Arc::new(RecordingSink::new());
        let generator = MockGenerator::new().with_delay(Duration::from_millis(350));
        generator.push_response("{\"case\": true}");

        let job = Job::buffered("Generating", "Case file ready");
        let text = coordinator(&sink)
            .run(
                &generator,
                "prompt",
                &GenerationConfig::default(),
                &job,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(text, "{\"case\": true}");

        let frames = sink.frames();
        let fillers = frames
            .iter()
            .filter(|f| matches!(f, Frame::Filler(_)))
            .count();
        assert_eq!(fillers, 3);
        assert_eq!(count_banners(&frames, "Case file ready"), 1);
        assert_eq!(frames.last(), Some(&Frame::Banner("Case file ready".to_string())));
        assert!(!frames.iter().any(|f| matches!(f, Frame::Content(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_stops_filler_without_completion_banner() {
        let sink = Arc::new(RecordingSink::new());
        let generator = MockGenerator::new().with_delay(Duration::from_millis(250));
        generator.push_error(GenerationError::Unreachable("connection refused".to_string()));

        let job = Job::streaming("Starting", "Done");
        let result = coordinator(&sink)
            .run(
                &generator,
                "prompt",
                &GenerationConfig::default(),
                &job,
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(GenerationError::Unreachable(_))));

        let frames = sink.frames();
        assert_eq!(count_banners(&frames, "Done"), 0);
        assert_eq!(frames.last(), Some(&Frame::ClearLine));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_aborts_pending_call() {
        let sink = Arc::new(RecordingSink::new());
        let generator = MockGenerator::new().with_delay(Duration::from_secs(60));
        generator.push_response("never shown");

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            trigger.cancel();
        });

        let job = Job::streaming("Starting", "Done");
        let result = coordinator(&sink)
            .run(&generator, "prompt", &GenerationConfig::default(), &job, &cancel)
            .await;
        assert!(matches!(result, Err(GenerationError::Cancelled)));

        let frames = sink.frames();
        assert_eq!(count_banners(&frames, "Done"), 0);
        assert!(!frames.iter().any(|f| matches!(f, Frame::Content(_))));
        assert_eq!(frames.last(), Some(&Frame::ClearLine));
    }
}
