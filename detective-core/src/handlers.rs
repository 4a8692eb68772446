//! Command handlers.
//!
//! Each handler reads the session and returns the text to show plus the
//! patch to merge. None of them touch the store or suspend.

use crate::commands::{CommandError, ConfigItem};
use crate::model::{CaseState, Difficulty, GameSession, Progress, Suspect};
use crate::scoring::{
    achievement_catalog, calculate_stats, format_duration, format_stars, record_case_completion,
};
use crate::store::SessionPatch;
use chrono::{DateTime, Utc};
use std::fmt::Write;

/// Records shown by `records`.
pub const RECORDS_SHOWN: usize = 10;

/// Text to show and the state change to apply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    pub text: String,
    pub patch: SessionPatch,
}

impl Outcome {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            patch: SessionPatch::default(),
        }
    }

    pub fn with_patch(text: impl Into<String>, patch: SessionPatch) -> Self {
        Self {
            text: text.into(),
            patch,
        }
    }
}

/// A case must be loaded, active or closed.
pub fn require_case(session: &GameSession) -> Result<(), CommandError> {
    if session.has_case() {
        Ok(())
    } else {
        Err(CommandError::NoActiveCase)
    }
}

/// A case must be loaded and still open.
pub fn require_active(session: &GameSession) -> Result<(), CommandError> {
    match session.case_state() {
        CaseState::Idle => Err(CommandError::NoActiveCase),
        CaseState::Resolved => Err(CommandError::CaseClosed),
        CaseState::Active => Ok(()),
    }
}

/// Resolve a 1-based suspect number against the roster.
pub fn suspect(session: &GameSession, number: usize) -> Result<&Suspect, CommandError> {
    session
        .suspect_at(number)
        .ok_or_else(|| CommandError::InvalidSuspectIndex(number.to_string()))
}

pub fn welcome() -> String {
    "\
=== MURDER MYSTERY DETECTIVE ===
Each case is generated fresh. Question the suspects, study the evidence,
then name the culprit. You only get one accusation per case.

Type 'help' for commands or 'new_case' to begin."
        .to_string()
}

pub fn help() -> Outcome {
    Outcome::text(
        "\
Available commands:
  new_case                 Generate a new case
  status                   Case summary and investigation stats
  list_suspects            Show the suspects
  evidence                 Show the evidence
  interrogate <n>          Question suspect n
  recreate                 Reconstruct the crime scene
  submit <n>               Accuse suspect n (ends the case)
  difficulty [level]       Show or set difficulty (easy, normal, hard)
  config [item value]      Show or set url, key or model
  records                  Recent case records
  achievements             Achievement list
  stats                    Overall statistics
  export [path]            Export the case file as Markdown
  reset_progress [confirm] Erase records and achievements
  clear_case               Put the current case away
  clear                    Clear the screen
  help                     This list
  exit                     Leave the game",
    )
}

pub fn status(session: &GameSession, now: DateTime<Utc>) -> Result<Outcome, CommandError> {
    require_case(session)?;
    let stats = &session.case_stats;

    let mut text = String::new();
    let _ = writeln!(text, "=== CASE {} ===", session.case_id);
    let _ = writeln!(text, "Difficulty: {}", session.active_difficulty().name());
    let _ = writeln!(text, "Victim: {}", session.victim_info);
    let _ = writeln!(text, "{}", session.description);
    let _ = writeln!(text);

    match session.case_state() {
        CaseState::Active => {
            let _ = writeln!(
                text,
                "Time elapsed: {}",
                format_duration(stats.elapsed_seconds(now))
            );
            let _ = writeln!(text, "Interrogations: {}", stats.interrogation_count);
            let _ = writeln!(text, "Wrong guesses: {}", stats.wrong_guess_count);
            if let Some(suspect) = session
                .active_interrogation_suspect_id
                .as_deref()
                .and_then(|id| session.suspect_by_id(id))
            {
                let _ = writeln!(text, "Last questioned: {}", suspect.name);
            }
        }
        _ => {
            let _ = writeln!(text, "Status: closed");
        }
    }
    let _ = write!(
        text,
        "Suspects: {}  Evidence: {}",
        session.suspects.len(),
        session.evidence.len()
    );

    Ok(Outcome::text(text))
}

pub fn list_suspects(session: &GameSession) -> Result<Outcome, CommandError> {
    require_case(session)?;

    let mut text = String::from("=== SUSPECTS ===\n");
    for (i, s) in session.suspects.iter().enumerate() {
        let _ = writeln!(text, "\n{}. {} ({})", i + 1, s.name, s.occupation);
        let _ = writeln!(text, "   Relationship: {}", s.relationship_to_victim);
        let _ = writeln!(text, "   Motive: {}", s.motive);
        let _ = writeln!(text, "   Alibi: {}", s.alibi);
    }
    let _ = write!(text, "\nUse 'interrogate <n>' to question a suspect.");

    Ok(Outcome::text(text))
}

pub fn evidence(session: &GameSession) -> Result<Outcome, CommandError> {
    require_case(session)?;

    let mut text = String::from("=== EVIDENCE ===\n");
    for (i, e) in session.evidence.iter().enumerate() {
        let _ = writeln!(text, "\n{}. {}", i + 1, e.name);
        let _ = writeln!(text, "   Found: {}", e.location);
        let _ = writeln!(text, "   {}", e.description);
    }

    Ok(Outcome::text(text.trim_end().to_string()))
}

/// Validate an interrogation and build the patch that opens it.
///
/// The patch sets the active suspect and bumps the counter together.
pub fn begin_interrogation(
    session: &GameSession,
    number: usize,
) -> Result<(Suspect, SessionPatch), CommandError> {
    require_active(session)?;
    let suspect = suspect(session, number)?.clone();

    let mut stats = session.case_stats.clone();
    stats.interrogation_count += 1;

    let patch = SessionPatch {
        active_interrogation_suspect_id: Some(Some(suspect.id.clone())),
        case_stats: Some(stats),
        ..SessionPatch::default()
    };
    Ok((suspect, patch))
}

/// Patch restoring the interrogation fields to what `session` had.
pub fn undo_interrogation(session: &GameSession) -> SessionPatch {
    SessionPatch {
        active_interrogation_suspect_id: Some(session.active_interrogation_suspect_id.clone()),
        case_stats: Some(session.case_stats.clone()),
        ..SessionPatch::default()
    }
}

/// Patch recording one wrong accusation.
pub fn wrong_guess(session: &GameSession) -> SessionPatch {
    let mut stats = session.case_stats.clone();
    stats.wrong_guess_count += 1;
    SessionPatch {
        case_stats: Some(stats),
        ..SessionPatch::default()
    }
}

/// Close the case against `accused` and score it.
///
/// `session` must already carry any wrong-guess increment for this accusation.
pub fn resolve_case(
    session: &GameSession,
    accused: &Suspect,
    now: DateTime<Utc>,
) -> Result<Outcome, CommandError> {
    require_active(session)?;

    let culprit = session.culprit().ok_or(CommandError::NoActiveCase)?;
    let is_correct = culprit.id == accused.id;
    let stats = &session.case_stats;
    let elapsed = stats.elapsed_seconds(now);

    let (record, unlocked) = record_case_completion(
        session,
        elapsed,
        stats.interrogation_count,
        stats.wrong_guess_count,
        is_correct,
        now,
    );

    let mut progress = session.progress.clone();
    progress.completed_cases.push(record.clone());
    progress.achievements.extend(unlocked.iter().cloned());
    progress.aggregate_stats = calculate_stats(&progress.completed_cases);
    progress.aggregate_stats.achievements_unlocked = progress.unlocked_count() as u32;

    let mut text = String::from("=== VERDICT ===\n");
    let _ = writeln!(text, "You accused {}.", accused.name);
    if is_correct {
        let _ = writeln!(text, "CORRECT! {} is the culprit.", culprit.name);
    } else {
        let _ = writeln!(text, "WRONG. The real culprit was {}.", culprit.name);
    }
    let _ = writeln!(text, "\nMotive: {}", culprit.motive);
    if !session.solution_narrative.is_empty() {
        let _ = writeln!(text, "What happened: {}", session.solution_narrative);
    }
    let _ = writeln!(
        text,
        "\nTime: {}  Interrogations: {}  Wrong guesses: {}",
        format_duration(record.completion_time_seconds),
        record.interrogation_count,
        record.wrong_guess_count
    );
    if is_correct {
        let _ = writeln!(text, "Rating: {}", format_stars(record.stars));
    }
    for achievement in &unlocked {
        let _ = writeln!(
            text,
            "Achievement unlocked: {} - {}",
            achievement.name, achievement.description
        );
    }
    let _ = write!(text, "\nType 'new_case' to take another case.");

    let patch = SessionPatch {
        active_interrogation_suspect_id: Some(None),
        case_stats: Some(Default::default()),
        progress: Some(progress),
        ..SessionPatch::default()
    };

    Ok(Outcome::with_patch(text, patch))
}

pub fn difficulty(session: &GameSession, level: Option<Difficulty>) -> Outcome {
    match level {
        None => {
            let mut text = String::from("=== DIFFICULTY ===\n");
            for d in Difficulty::ALL {
                let marker = if d == session.difficulty { "*" } else { " " };
                let params = d.params();
                let _ = writeln!(
                    text,
                    "{marker} {:<7} {} ({} suspects, {} evidence)",
                    d.name(),
                    d.description(),
                    params.suspect_count,
                    params.evidence_count
                );
            }
            let _ = write!(text, "\nUse 'difficulty <easy|normal|hard>' to change.");
            Outcome::text(text)
        }
        Some(level) => {
            let mut text = format!("Difficulty set to {}.", level.name());
            if session.case_state() == CaseState::Active {
                text.push_str(" It applies from the next case.");
            }
            Outcome::with_patch(
                text,
                SessionPatch {
                    difficulty: Some(level),
                    ..SessionPatch::default()
                },
            )
        }
    }
}

pub fn config(session: &GameSession, change: Option<(ConfigItem, String)>) -> Result<Outcome, CommandError> {
    let current = &session.generation_config;

    let Some((item, value)) = change else {
        let key = current.masked_key().unwrap_or_else(|| "(not set)".to_string());
        return Ok(Outcome::text(format!(
            "=== GENERATION CONFIG ===\nurl:   {}\nkey:   {}\nmodel: {}\n\nUse 'config <url|key|model> <value>' to change.",
            current.url, key, current.model
        )));
    };

    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(CommandError::EmptyConfigValue(item));
    }

    let mut updated = current.clone();
    let shown = match item {
        ConfigItem::Url => {
            updated.url = value.clone();
            value
        }
        ConfigItem::Key => {
            updated.key = value;
            updated.masked_key().unwrap_or_default()
        }
        ConfigItem::Model => {
            updated.model = value.clone();
            value
        }
    };

    Ok(Outcome::with_patch(
        format!("Config {item} set to {shown}"),
        SessionPatch {
            generation_config: Some(updated),
            ..SessionPatch::default()
        },
    ))
}

pub fn records(session: &GameSession) -> Outcome {
    let cases = &session.progress.completed_cases;
    if cases.is_empty() {
        return Outcome::text("No case records yet.");
    }

    let mut text = format!(
        "=== CASE RECORDS (last {} of {}) ===\n",
        cases.len().min(RECORDS_SHOWN),
        cases.len()
    );
    let _ = writeln!(
        text,
        "{:<12} {:<8} {:>6} {:<5} {:<8} {}",
        "Case", "Level", "Time", "Stars", "Result", "Date"
    );
    for record in cases.iter().rev().take(RECORDS_SHOWN) {
        let _ = writeln!(
            text,
            "{:<12} {:<8} {:>6} {:<5} {:<8} {}",
            record.case_id,
            record.difficulty.name(),
            format_duration(record.completion_time_seconds),
            format_stars(record.stars),
            if record.is_correct { "Solved" } else { "Failed" },
            record.completed_at.format("%Y-%m-%d %H:%M")
        );
    }

    Outcome::text(text.trim_end().to_string())
}

pub fn achievements(session: &GameSession) -> Outcome {
    let progress = &session.progress;
    let catalog = achievement_catalog();

    let mut text = format!(
        "=== ACHIEVEMENTS ({}/{}) ===\n",
        progress.unlocked_count(),
        catalog.len()
    );
    for entry in &catalog {
        let unlocked = progress
            .achievements
            .iter()
            .find(|a| a.id == entry.id && a.is_unlocked);
        match unlocked {
            Some(a) => {
                let when = a
                    .unlocked_at
                    .map(|t| format!(" ({})", t.format("%Y-%m-%d")))
                    .unwrap_or_default();
                let _ = writeln!(text, "[x] {} - {}{}", a.name, a.description, when);
            }
            None => {
                let _ = writeln!(text, "[ ] {} - {}", entry.name, entry.description);
            }
        }
    }

    Outcome::text(text.trim_end().to_string())
}

pub fn stats(session: &GameSession) -> Outcome {
    let stats = &session.progress.aggregate_stats;
    if stats.total_cases_played == 0 {
        return Outcome::text("No cases played yet.");
    }

    let rate = f64::from(stats.total_cases_solved) / f64::from(stats.total_cases_played) * 100.0;

    let mut text = String::from("=== STATISTICS ===\n");
    let _ = writeln!(text, "Cases played: {}", stats.total_cases_played);
    let _ = writeln!(text, "Cases solved: {} ({rate:.0}%)", stats.total_cases_solved);
    let _ = writeln!(
        text,
        "Average time: {}",
        format_duration(stats.average_completion_time)
    );
    let _ = writeln!(text, "Best time: {}", format_duration(stats.best_completion_time));
    let _ = writeln!(text, "Total stars: {}", stats.total_stars);
    let _ = writeln!(text, "Achievements: {}", stats.achievements_unlocked);
    let _ = writeln!(text, "\nBy difficulty:");
    for d in Difficulty::ALL {
        let entry = stats.for_difficulty(d);
        let _ = writeln!(
            text,
            "  {:<7} played {}  solved {}  best {}",
            d.name(),
            entry.played,
            entry.solved,
            format_duration(entry.best_time)
        );
    }

    Outcome::text(text.trim_end().to_string())
}

/// Erase progress, but only with the literal `confirm` argument.
pub fn reset_progress(session: &GameSession, confirmed: bool) -> Outcome {
    if !confirmed {
        return Outcome::text(format!(
            "This will erase {} case records and {} achievements.\nType 'reset_progress confirm' to proceed.",
            session.progress.completed_cases.len(),
            session.progress.unlocked_count()
        ));
    }

    Outcome::with_patch(
        "Progress reset. Records and achievements cleared.",
        SessionPatch {
            progress: Some(Progress::default()),
            ..SessionPatch::default()
        },
    )
}

pub fn clear_case(session: &GameSession) -> Result<Outcome, CommandError> {
    require_case(session)?;
    Ok(Outcome::with_patch(
        format!("Case {} cleared. Type 'new_case' to start another.", session.case_id),
        SessionPatch::clear_case(),
    ))
}

/// The current case as a Markdown case file.
pub fn export_markdown(session: &GameSession, now: DateTime<Utc>) -> Result<String, CommandError> {
    require_case(session)?;

    let mut md = String::new();
    let _ = writeln!(md, "# Case File {}\n", session.case_id);
    let _ = writeln!(md, "- **Difficulty:** {}", session.active_difficulty().name());
    let _ = writeln!(md, "- **Exported:** {}\n", now.format("%Y-%m-%d %H:%M UTC"));
    let _ = writeln!(md, "## Description\n\n{}\n", session.description);
    let _ = writeln!(md, "## Victim\n\n{}\n", session.victim_info);

    let _ = writeln!(md, "## Suspects\n");
    for (i, s) in session.suspects.iter().enumerate() {
        let _ = writeln!(md, "### {}. {}\n", i + 1, s.name);
        let _ = writeln!(md, "- **Occupation:** {}", s.occupation);
        let _ = writeln!(md, "- **Relationship:** {}", s.relationship_to_victim);
        let _ = writeln!(md, "- **Motive:** {}", s.motive);
        let _ = writeln!(md, "- **Alibi:** {}\n", s.alibi);
    }

    let _ = writeln!(md, "## Evidence\n");
    for (i, e) in session.evidence.iter().enumerate() {
        let _ = writeln!(md, "{}. **{}** ({}): {}", i + 1, e.name, e.location, e.description);
    }

    match session.case_state() {
        CaseState::Active => {
            let stats = &session.case_stats;
            let _ = writeln!(md, "\n## Investigation\n");
            let _ = writeln!(md, "- **Time elapsed:** {}", format_duration(stats.elapsed_seconds(now)));
            let _ = writeln!(md, "- **Interrogations:** {}", stats.interrogation_count);
            let _ = writeln!(md, "- **Wrong guesses:** {}", stats.wrong_guess_count);
        }
        _ => {
            if let Some(culprit) = session.culprit() {
                let _ = writeln!(md, "\n## Solution\n\n**Culprit:** {}\n", culprit.name);
                if !session.solution_narrative.is_empty() {
                    let _ = writeln!(md, "{}", session.solution_narrative);
                }
            }
        }
    }

    Ok(md)
}
