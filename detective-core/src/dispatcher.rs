//! Command dispatcher.
//!
//! Turns one input line into output text and session changes. Pure handlers
//! build the patches; only this module merges them into the store, and it
//! does so at the points where ordering matters:
//!
//! - an interrogation's patch is merged before the generation call starts
//! - a wrong guess is merged and read back before the case is scored
//! - a failed generation leaves the session as it was before the command

use crate::case::{new_case_id, CaseDraft, MAX_ATTEMPTS};
use crate::clock::Clock;
use crate::commands::{Command, CommandError};
use crate::coordinator::{Job, StreamingCoordinator};
use crate::generation::{GenerationError, Generator};
use crate::handlers::{self, Outcome};
use crate::model::GameSession;
use crate::prompts;
use crate::store::SessionStore;
use std::fmt::Write;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Why a command produced an error message instead of a result.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Export failed: {0}")]
    Export(#[from] std::io::Error),
}

/// What the shell should do after showing a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    #[default]
    Continue,
    ClearScreen,
    Exit,
}

/// The result of one command line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Response {
    pub text: String,
    pub action: Action,
    /// True when the command failed validation or generation.
    pub is_error: bool,
}

impl Response {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    fn error(error: &DispatchError) -> Self {
        Self {
            text: error.to_string(),
            action: Action::Continue,
            is_error: true,
        }
    }
}

/// Executes commands against a session store.
pub struct Dispatcher {
    generator: Arc<dyn Generator>,
    coordinator: StreamingCoordinator,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    pub fn new(
        generator: Arc<dyn Generator>,
        coordinator: StreamingCoordinator,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            generator,
            coordinator,
            clock,
        }
    }

    /// Run one line to completion.
    ///
    /// Never fails: errors come back as response text and the session is
    /// left untouched by a failed command.
    pub async fn execute(
        &self,
        line: &str,
        store: &mut SessionStore,
        cancel: &CancellationToken,
    ) -> Response {
        let command = match Command::parse(line) {
            Ok(Some(command)) => command,
            Ok(None) => return Response::default(),
            Err(e) => {
                debug!(error = %e, "Rejected command line");
                return Response::error(&e.into());
            }
        };

        let verb = line.split_whitespace().next().unwrap_or_default();
        info!(verb, "Executing command");

        let mut response = match self.dispatch(command, store, cancel).await {
            Ok(response) => response,
            Err(e) => {
                if let DispatchError::Generation(ref cause) = e {
                    warn!(verb, error = %cause, "Generation failed");
                }
                Response::error(&e)
            }
        };

        if let Some(notice) = store.take_notice() {
            response.text = format!("{notice}\n{}", response.text);
        }
        response
    }

    async fn dispatch(
        &self,
        command: Command,
        store: &mut SessionStore,
        cancel: &CancellationToken,
    ) -> Result<Response, DispatchError> {
        let now = self.clock.now();

        let outcome = match command {
            Command::NewCase => return self.new_case(store, cancel).await,
            Command::Interrogate(n) => return self.interrogate(n, store, cancel).await,
            Command::Recreate => return self.recreate(store, cancel).await,
            Command::Submit(n) => return self.submit(n, store),
            Command::Export(path) => return self.export(path, store.get()),
            Command::Clear => {
                return Ok(Response {
                    action: Action::ClearScreen,
                    ..Response::default()
                })
            }
            Command::Exit => {
                return Ok(Response {
                    text: "Case files closed. Goodbye, detective.".to_string(),
                    action: Action::Exit,
                    is_error: false,
                })
            }

            Command::Help => handlers::help(),
            Command::Status => handlers::status(store.get(), now)?,
            Command::ListSuspects => handlers::list_suspects(store.get())?,
            Command::Evidence => handlers::evidence(store.get())?,
            Command::Difficulty(level) => handlers::difficulty(store.get(), level),
            Command::Config(change) => handlers::config(store.get(), change)?,
            Command::Records => handlers::records(store.get()),
            Command::Achievements => handlers::achievements(store.get()),
            Command::Stats => handlers::stats(store.get()),
            Command::ResetProgress { confirmed } => {
                handlers::reset_progress(store.get(), confirmed)
            }
            Command::ClearCase => handlers::clear_case(store.get())?,
        };

        Ok(apply(outcome, store))
    }

    async fn new_case(
        &self,
        store: &mut SessionStore,
        cancel: &CancellationToken,
    ) -> Result<Response, DispatchError> {
        let session = store.get();
        let difficulty = session.difficulty;
        let config = session.generation_config.clone();
        let prompt = prompts::case_prompt(difficulty);

        let mut last_error = GenerationError::InvalidCase("no attempt made".to_string());
        for attempt in 1..=MAX_ATTEMPTS {
            let job = Job::buffered(
                format!(
                    "Opening a new {} case file...",
                    difficulty.name().to_lowercase()
                ),
                "Case file generated.",
            );
            let raw = self
                .coordinator
                .run(self.generator.as_ref(), &prompt, &config, &job, cancel)
                .await?;

            match CaseDraft::parse(&raw) {
                Ok(draft) => {
                    let now = self.clock.now();
                    let case_id = new_case_id(now);
                    info!(%case_id, %difficulty, attempt, "Installing new case");
                    let session = store.merge(draft.into_patch(case_id, difficulty, now));
                    return Ok(Response::text(case_summary(session)));
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Discarding generated case");
                    last_error = e;
                }
            }
        }

        Err(last_error.into())
    }

    async fn interrogate(
        &self,
        number: usize,
        store: &mut SessionStore,
        cancel: &CancellationToken,
    ) -> Result<Response, DispatchError> {
        let (suspect, patch) = handlers::begin_interrogation(store.get(), number)?;
        let undo = handlers::undo_interrogation(store.get());

        let session = store.merge(patch).clone();
        let prompt = prompts::interrogation_prompt(&session, &suspect);
        let job = Job::streaming(
            format!("Bringing {} into the interview room...", suspect.name),
            format!("--- Interview with {} ---", suspect.name),
        );

        match self
            .coordinator
            .run(
                self.generator.as_ref(),
                &prompt,
                &session.generation_config,
                &job,
                cancel,
            )
            .await
        {
            Ok(_) => Ok(Response::text(format!(
                "\n--- End of interview ({} interrogations this case) ---",
                session.case_stats.interrogation_count
            ))),
            Err(e) => {
                store.merge(undo);
                Err(e.into())
            }
        }
    }

    async fn recreate(
        &self,
        store: &mut SessionStore,
        cancel: &CancellationToken,
    ) -> Result<Response, DispatchError> {
        handlers::require_active(store.get())?;

        let session = store.get();
        let prompt = prompts::scene_prompt(session);
        let job = Job::streaming("Reconstructing the crime scene...", "--- Scene recreation ---");

        self.coordinator
            .run(
                self.generator.as_ref(),
                &prompt,
                &session.generation_config,
                &job,
                cancel,
            )
            .await?;

        Ok(Response::text(
            "\n--- End of recreation. Compare it with the evidence before you accuse anyone. ---",
        ))
    }

    fn submit(&self, number: usize, store: &mut SessionStore) -> Result<Response, DispatchError> {
        handlers::require_active(store.get())?;
        let accused = handlers::suspect(store.get(), number)?.clone();

        if store.get().solution != accused.id {
            let patch = handlers::wrong_guess(store.get());
            store.merge(patch);
        }

        // Score from the merged state, not a snapshot taken before it.
        let outcome = handlers::resolve_case(store.get(), &accused, self.clock.now())?;
        info!(case_id = %store.get().case_id, accused = %accused.name, "Case resolved");

        Ok(apply(outcome, store))
    }

    fn export(&self, path: Option<String>, session: &GameSession) -> Result<Response, DispatchError> {
        let markdown = handlers::export_markdown(session, self.clock.now())?;
        match path {
            None => Ok(Response::text(markdown.trim_end())),
            Some(path) => {
                std::fs::write(&path, &markdown)?;
                info!(%path, "Exported case file");
                Ok(Response::text(format!("Case file written to {path}")))
            }
        }
    }
}

fn apply(outcome: Outcome, store: &mut SessionStore) -> Response {
    if !outcome.patch.is_empty() {
        store.merge(outcome.patch);
    }
    Response::text(outcome.text)
}

fn case_summary(session: &GameSession) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "=== CASE {} ({}) ===", session.case_id, session.active_difficulty().name());
    let _ = writeln!(text, "Victim: {}", session.victim_info);
    let _ = writeln!(text, "{}\n", session.description);
    let _ = writeln!(text, "Suspects:");
    for (i, s) in session.suspects.iter().enumerate() {
        let _ = writeln!(text, "  {}. {} - {}", i + 1, s.name, s.occupation);
    }
    let _ = writeln!(text, "Evidence items: {}\n", session.evidence.len());
    let _ = write!(
        text,
        "The clock is running. Use 'list_suspects', 'evidence', 'interrogate <n>' and 'recreate' to investigate, then 'submit <n>' to accuse."
    );
    text
}

#[cfg(test)]
mod tests {
    use crate::clock::Clock;
    use crate::coordinator::Frame;
    use crate::dispatcher::Action;
    use crate::generation::GenerationError;
    use crate::model::CaseState;
    use crate::testing::TestHarness;

    #[tokio::test]
    async fn test_unknown_command_is_error_without_mutation() {
        let mut harness = TestHarness::new();
        let before = harness.session().clone();

        let response = harness.run("teleport 3").await;
        assert!(response.is_error);
        assert!(response.text.contains("Unknown command"));
        assert_eq!(harness.session(), &before);
    }

    #[tokio::test]
    async fn test_blank_line_does_nothing() {
        let mut harness = TestHarness::new();
        let response = harness.run("   ").await;
        assert_eq!(response.text, "");
        assert!(!response.is_error);
    }

    #[tokio::test]
    async fn test_new_case_installs_and_starts_clock() {
        let mut harness = TestHarness::new();
        harness.expect_case();

        let response = harness.run("new_case").await;
        assert!(!response.is_error, "{}", response.text);
        assert!(response.text.contains("Rune Dahl"));

        let session = harness.session();
        assert_eq!(session.case_state(), CaseState::Active);
        assert!(session.case_id.starts_with("MH25"));
        assert_eq!(session.case_stats.start_time, Some(harness.clock.now()));
        assert!(session.check_invariants().is_ok());

        let frames = harness.sink.frames();
        assert_eq!(
            frames
                .iter()
                .filter(|f| **f == Frame::Banner("Case file generated.".to_string()))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_invalid_case_retried_then_installed() {
        let mut harness = TestHarness::new();
        harness.expect_response("not a case at all");
        harness.expect_case();

        let response = harness.run("new_case").await;
        assert!(!response.is_error, "{}", response.text);
        assert_eq!(harness.generator.call_count(), 2);
        assert!(harness.session().has_case());
    }

    #[tokio::test]
    async fn test_new_case_gives_up_after_max_attempts() {
        let mut harness = TestHarness::new();
        for _ in 0..3 {
            harness.expect_response("{}");
        }

        let response = harness.run("new_case").await;
        assert!(response.is_error);
        assert_eq!(harness.generator.call_count(), 3);
        assert!(!harness.session().has_case());
    }

    #[tokio::test]
    async fn test_interrogation_failure_restores_counters() {
        let mut harness = TestHarness::new();
        harness.expect_case();
        harness.run("new_case").await;

        harness.generator.push_error(GenerationError::MissingCredential);
        let before = harness.session().clone();
        let response = harness.run("interrogate 2").await;

        assert!(response.is_error);
        assert!(response.text.contains("API key"));
        assert_eq!(harness.session(), &before);
    }

    #[tokio::test]
    async fn test_interrogation_streams_content() {
        let mut harness = TestHarness::new();
        harness.expect_case();
        harness.run("new_case").await;
        harness.sink.clear();

        harness.expect_response("I was asleep the whole night.");
        let response = harness.run("interrogate 2").await;
        assert!(!response.is_error);
        assert_eq!(harness.sink.content(), "I was asleep the whole night.");

        let session = harness.session();
        assert_eq!(session.case_stats.interrogation_count, 1);
        assert_eq!(session.active_interrogation_suspect_id.as_deref(), Some("2"));

        let prompts = harness.generator.prompts();
        assert!(prompts[1].starts_with("You are interrogating suspect Priya Venkataraman"));
    }

    #[tokio::test]
    async fn test_recreate_requires_active_case() {
        let mut harness = TestHarness::new();
        let response = harness.run("recreate").await;
        assert!(response.is_error);
        assert_eq!(harness.generator.call_count(), 0);
    }

    #[tokio::test]
    async fn test_wrong_submit_counts_guess_before_scoring() {
        let mut harness = TestHarness::new();
        harness.expect_case();
        harness.run("new_case").await;
        harness.clock.advance(100);

        let response = harness.run("submit 3").await;
        assert!(response.text.contains("WRONG"));

        let progress = &harness.session().progress;
        let record = &progress.completed_cases[0];
        assert!(!record.is_correct);
        assert_eq!(record.wrong_guess_count, 1);
        assert_eq!(record.stars, 0);
        assert_eq!(record.completion_time_seconds, 100);
        assert_eq!(harness.session().case_state(), CaseState::Resolved);

        // one accusation per case
        let again = harness.run("submit 1").await;
        assert!(again.is_error);
        assert_eq!(harness.session().progress.completed_cases.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_and_exit_actions() {
        let mut harness = TestHarness::new();
        assert_eq!(harness.run("clear").await.action, Action::ClearScreen);
        assert_eq!(harness.run("EXIT").await.action, Action::Exit);
    }

    #[tokio::test]
    async fn test_export_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("case.md");

        let mut harness = TestHarness::new();
        harness.expect_case();
        harness.run("new_case").await;

        let response = harness
            .run(&format!("export {}", path.display()))
            .await;
        assert!(!response.is_error, "{}", response.text);

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("## Suspects"));
        assert!(written.contains("Rune Dahl"));
    }
}
