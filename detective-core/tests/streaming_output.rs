//! Output ordering of coordinated commands.
//!
//! Uses a paused tokio clock so filler ticks are deterministic.

use detective_core::model::GameSession;
use detective_core::store::SessionStore;
use detective_core::{Frame, GenerationError, MockGenerator, TestHarness};
use std::time::Duration;

fn frames_after_start(frames: &[Frame]) -> (usize, usize) {
    let fillers = frames
        .iter()
        .filter(|f| matches!(f, Frame::Filler(_)))
        .count();
    let clears = frames.iter().filter(|f| **f == Frame::ClearLine).count();
    (fillers, clears)
}

/// Asserts no filler appears after the first real content and that exactly
/// one completion banner sits between them.
fn assert_no_interleaving(frames: &[Frame], complete_banner: &str) {
    let banners: Vec<usize> = frames
        .iter()
        .enumerate()
        .filter(|(_, f)| matches!(f, Frame::Banner(b) if b == complete_banner))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(banners.len(), 1, "exactly one completion banner: {frames:?}");

    let banner = banners[0];
    assert!(!frames[banner..]
        .iter()
        .any(|f| matches!(f, Frame::Filler(_)) || *f == Frame::ClearLine));
    assert!(!frames[..banner]
        .iter()
        .any(|f| matches!(f, Frame::Content(_))));
}

fn harness_with(generator: MockGenerator) -> TestHarness {
    TestHarness::with_generator(generator, SessionStore::in_memory())
}

#[tokio::test(start_paused = true)]
async fn test_interrogation_output_never_interleaves() {
    let generator = MockGenerator::new()
        .with_delay(Duration::from_millis(420))
        .with_chunk_size(3);
    let mut harness = harness_with(generator);
    harness.expect_case();
    harness.run("new_case").await;
    harness.sink.clear();

    harness.expect_response("Perimeter, like every night.");
    let response = harness.run("interrogate 3").await;
    assert!(!response.is_error, "{}", response.text);

    let frames = harness.sink.frames();
    assert_eq!(
        frames.first(),
        Some(&Frame::Banner(
            "Bringing Jonas Eklund into the interview room...".to_string()
        ))
    );
    assert_no_interleaving(&frames, "--- Interview with Jonas Eklund ---");

    // 50ms filler interval over a 420ms call
    let (fillers, clears) = frames_after_start(&frames);
    assert_eq!(fillers, 8);
    assert_eq!(clears, 1);
    assert_eq!(harness.sink.content(), "Perimeter, like every night.");
}

#[tokio::test(start_paused = true)]
async fn test_new_case_hands_off_once_per_attempt() {
    let generator = MockGenerator::new().with_delay(Duration::from_millis(120));
    let mut harness = harness_with(generator);
    harness.expect_response("garbage");
    harness.expect_case();

    let response = harness.run("new_case").await;
    assert!(!response.is_error, "{}", response.text);

    let frames = harness.sink.frames();
    let completions = frames
        .iter()
        .filter(|f| **f == Frame::Banner("Case file generated.".to_string()))
        .count();
    assert_eq!(completions, 2);
    let (_, clears) = frames_after_start(&frames);
    assert_eq!(clears, 2);
    assert!(!frames.iter().any(|f| matches!(f, Frame::Content(_))));
}

#[tokio::test(start_paused = true)]
async fn test_failed_generation_leaves_no_banner_or_state() {
    let generator = MockGenerator::new().with_delay(Duration::from_millis(200));
    let mut harness = harness_with(generator);
    harness
        .generator
        .push_error(GenerationError::Unreachable("connection refused".to_string()));

    let response = harness.run("new_case").await;
    assert!(response.is_error);
    assert!(response.text.contains("unreachable"));
    assert_eq!(harness.session(), &GameSession::default());

    let frames = harness.sink.frames();
    assert!(!frames
        .iter()
        .any(|f| *f == Frame::Banner("Case file generated.".to_string())));
    assert_eq!(frames.last(), Some(&Frame::ClearLine));
}
