//! Star ratings, achievements and aggregate statistics.
//!
//! Everything here is a pure function of its inputs.

use crate::model::{
    Achievement, AggregateStats, CaseRecord, Difficulty, GameSession,
};
use chrono::{DateTime, Utc};

pub const FIRST_CASE: &str = "first_case";
pub const PERFECT_CASE: &str = "perfect_case";
pub const SPEED_DEMON: &str = "speed_demon";
pub const HARD_MODE: &str = "hard_mode";
pub const STREAK_MASTER: &str = "streak_master";

/// Solves under this many seconds earn `speed_demon`.
pub const SPEED_DEMON_SECONDS: u64 = 300;

/// Consecutive correct cases needed for `streak_master`.
pub const STREAK_LENGTH: usize = 5;

/// (id, name, description)
const CATALOG: &[(&str, &str, &str)] = &[
    (FIRST_CASE, "First Case Solved", "Solve your first case"),
    (PERFECT_CASE, "Perfect Detective", "Solve a case with 3 stars"),
    (SPEED_DEMON, "Speed Demon", "Solve a case in under 5 minutes"),
    (HARD_MODE, "Hard Mode Master", "Solve a hard difficulty case"),
    (STREAK_MASTER, "Streak Master", "Solve 5 cases in a row correctly"),
];

/// Every achievement in its locked state.
pub fn achievement_catalog() -> Vec<Achievement> {
    CATALOG
        .iter()
        .map(|(id, name, description)| Achievement {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            is_unlocked: false,
            unlocked_at: None,
        })
        .collect()
}

fn unlock(id: &str, now: DateTime<Utc>) -> Option<Achievement> {
    CATALOG
        .iter()
        .find(|(catalog_id, _, _)| *catalog_id == id)
        .map(|(id, name, description)| Achievement {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            is_unlocked: true,
            unlocked_at: Some(now),
        })
}

/// Time thresholds in seconds: (good, fair).
fn time_thresholds(difficulty: Difficulty) -> (u64, u64) {
    match difficulty {
        Difficulty::Easy => (300, 600),
        Difficulty::Normal => (480, 900),
        Difficulty::Hard => (600, 1200),
    }
}

/// Rate a solved case from 1 to 3 stars.
pub fn calculate_stars(
    completion_time_seconds: u64,
    interrogation_count: u32,
    wrong_guess_count: u32,
    difficulty: Difficulty,
) -> u8 {
    let (good, fair) = time_thresholds(difficulty);
    let mut stars = 3.0_f64;

    if completion_time_seconds > fair {
        stars -= 1.0;
    } else if completion_time_seconds > good {
        stars = (stars - 0.5).max(1.0);
    }

    if interrogation_count > 6 {
        stars -= 1.0;
    } else if interrogation_count > 4 {
        stars = (stars - 0.5).max(1.0);
    }

    stars -= f64::from(wrong_guess_count) * 0.5;

    stars.max(1.0).round().min(3.0) as u8
}

/// Build the record for a resolved case and work out which achievements it unlocks.
///
/// Achievements already unlocked in `session.progress` are never returned again.
pub fn record_case_completion(
    session: &GameSession,
    completion_time_seconds: u64,
    interrogation_count: u32,
    wrong_guess_count: u32,
    is_correct: bool,
    now: DateTime<Utc>,
) -> (CaseRecord, Vec<Achievement>) {
    let stars = if is_correct {
        calculate_stars(
            completion_time_seconds,
            interrogation_count,
            wrong_guess_count,
            session.active_difficulty(),
        )
    } else {
        0
    };

    let record = CaseRecord {
        case_id: session.case_id.clone(),
        difficulty: session.active_difficulty(),
        completed_at: now,
        completion_time_seconds,
        interrogation_count,
        wrong_guess_count,
        stars,
        is_correct,
    };

    let achievements = check_achievements(session, &record, now);
    (record, achievements)
}

fn check_achievements(
    session: &GameSession,
    record: &CaseRecord,
    now: DateTime<Utc>,
) -> Vec<Achievement> {
    let progress = &session.progress;

    let streak = record.is_correct
        && progress.completed_cases.len() + 1 >= STREAK_LENGTH
        && progress
            .completed_cases
            .iter()
            .rev()
            .take(STREAK_LENGTH - 1)
            .all(|r| r.is_correct);

    let earned = [
        (FIRST_CASE, record.is_correct),
        (PERFECT_CASE, record.stars == 3),
        (
            SPEED_DEMON,
            record.is_correct && record.completion_time_seconds < SPEED_DEMON_SECONDS,
        ),
        (
            HARD_MODE,
            record.is_correct && record.difficulty == Difficulty::Hard,
        ),
        (STREAK_MASTER, streak),
    ];

    earned
        .into_iter()
        .filter(|(id, earned)| *earned && !progress.is_unlocked(id))
        .filter_map(|(id, _)| unlock(id, now))
        .collect()
}

/// Aggregate statistics over a case history.
///
/// `achievements_unlocked` is left at zero; the caller fills it from progress.
pub fn calculate_stats(records: &[CaseRecord]) -> AggregateStats {
    let mut stats = AggregateStats::default();

    let solved: Vec<&CaseRecord> = records.iter().filter(|r| r.is_correct).collect();

    for record in records {
        let entry = stats.for_difficulty_mut(record.difficulty);
        entry.played += 1;
        if record.is_correct {
            entry.solved += 1;
            entry.best_time = if entry.solved == 1 {
                record.completion_time_seconds
            } else {
                entry.best_time.min(record.completion_time_seconds)
            };
        }
    }

    stats.total_cases_played = records.len() as u32;
    stats.total_cases_solved = solved.len() as u32;

    if !solved.is_empty() {
        let total: u64 = solved.iter().map(|r| r.completion_time_seconds).sum();
        stats.average_completion_time = (total as f64 / solved.len() as f64).round() as u64;
        stats.best_completion_time = solved
            .iter()
            .map(|r| r.completion_time_seconds)
            .min()
            .unwrap_or(0);
    }

    stats.total_stars = records.iter().map(|r| u32::from(r.stars)).sum();
    stats
}

/// `m:ss`
pub fn format_duration(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// `★★☆`
pub fn format_stars(stars: u8) -> String {
    let filled = usize::from(stars.min(3));
    format!("{}{}", "★".repeat(filled), "☆".repeat(3 - filled))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Progress;

    fn record(difficulty: Difficulty, time: u64, stars: u8, is_correct: bool) -> CaseRecord {
        CaseRecord {
            case_id: "MH25TEST01".to_string(),
            difficulty,
            completed_at: Utc::now(),
            completion_time_seconds: time,
            interrogation_count: 2,
            wrong_guess_count: 0,
            stars,
            is_correct,
        }
    }

    fn session_with(difficulty: Difficulty, progress: Progress) -> GameSession {
        GameSession {
            case_id: "MH25TEST01".to_string(),
            difficulty,
            progress,
            ..GameSession::default()
        }
    }

    #[test]
    fn test_fast_clean_solve_is_three_stars() {
        assert_eq!(calculate_stars(120, 2, 0, Difficulty::Normal), 3);
    }

    #[test]
    fn test_time_thresholds_per_difficulty() {
        // 500s is past "good" on easy and normal, but not on hard
        assert_eq!(calculate_stars(500, 0, 0, Difficulty::Easy), 3); // 2.5 rounds up
        assert_eq!(calculate_stars(500, 0, 0, Difficulty::Hard), 3);
        assert_eq!(calculate_stars(700, 0, 0, Difficulty::Easy), 2);
        assert_eq!(calculate_stars(1000, 0, 0, Difficulty::Normal), 2);
        assert_eq!(calculate_stars(1000, 0, 0, Difficulty::Hard), 3);
    }

    #[test]
    fn test_penalties_stack() {
        // slow (-1) and too many interrogations (-1)
        assert_eq!(calculate_stars(1300, 7, 0, Difficulty::Hard), 1);
        // -0.5 -0.5 -> 2
        assert_eq!(calculate_stars(400, 5, 0, Difficulty::Easy), 2);
        // wrong guesses
        assert_eq!(calculate_stars(10, 0, 2, Difficulty::Normal), 2);
    }

    #[test]
    fn test_stars_never_below_one() {
        assert_eq!(calculate_stars(10_000, 50, 20, Difficulty::Easy), 1);
    }

    #[test]
    fn test_stars_monotonic_and_bounded() {
        for difficulty in Difficulty::ALL {
            for wrong in 0..4 {
                for interrogations in 0..10 {
                    let mut previous = u8::MAX;
                    for time in (0..1500).step_by(50) {
                        let stars = calculate_stars(time, interrogations, wrong, difficulty);
                        assert!((1..=3).contains(&stars));
                        assert!(stars <= previous, "time must not raise stars");
                        previous = stars;

                        assert!(calculate_stars(time, interrogations + 1, wrong, difficulty) <= stars);
                        assert!(calculate_stars(time, interrogations, wrong + 1, difficulty) <= stars);
                    }
                }
            }
        }
    }

    #[test]
    fn test_incorrect_case_gets_zero_stars() {
        let session = session_with(Difficulty::Normal, Progress::default());
        let (record, achievements) =
            record_case_completion(&session, 60, 1, 1, false, Utc::now());
        assert_eq!(record.stars, 0);
        assert!(!record.is_correct);
        assert!(achievements.is_empty());
    }

    #[test]
    fn test_first_fast_hard_solve_unlocks_everything_it_earns() {
        let session = session_with(Difficulty::Hard, Progress::default());
        let (record, achievements) =
            record_case_completion(&session, 200, 2, 0, true, Utc::now());
        assert_eq!(record.stars, 3);

        let ids: Vec<&str> = achievements.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec![FIRST_CASE, PERFECT_CASE, SPEED_DEMON, HARD_MODE]);
        assert!(achievements.iter().all(|a| a.is_unlocked && a.unlocked_at.is_some()));
    }

    #[test]
    fn test_already_unlocked_achievements_not_reemitted() {
        let now = Utc::now();
        let first = session_with(Difficulty::Hard, Progress::default());
        let (_, unlocked) = record_case_completion(&first, 200, 2, 0, true, now);

        let second = session_with(
            Difficulty::Hard,
            Progress {
                achievements: unlocked,
                ..Progress::default()
            },
        );
        let (_, again) = record_case_completion(&second, 200, 2, 0, true, now);
        assert!(again.is_empty());
    }

    #[test]
    fn test_streak_master_needs_five_in_a_row() {
        let mut progress = Progress::default();
        for _ in 0..4 {
            progress.completed_cases.push(record(Difficulty::Easy, 400, 2, true));
        }
        let session = session_with(Difficulty::Easy, progress.clone());
        let (_, achievements) = record_case_completion(&session, 400, 2, 0, true, Utc::now());
        assert!(achievements.iter().any(|a| a.id == STREAK_MASTER));

        progress.completed_cases[2].is_correct = false;
        let session = session_with(Difficulty::Easy, progress);
        let (_, achievements) = record_case_completion(&session, 400, 2, 0, true, Utc::now());
        assert!(!achievements.iter().any(|a| a.id == STREAK_MASTER));
    }

    #[test]
    fn test_calculate_stats() {
        let records = vec![
            record(Difficulty::Easy, 300, 3, true),
            record(Difficulty::Easy, 200, 2, true),
            record(Difficulty::Normal, 100, 0, false),
            record(Difficulty::Hard, 501, 1, true),
        ];
        let stats = calculate_stats(&records);

        assert_eq!(stats.total_cases_played, 4);
        assert_eq!(stats.total_cases_solved, 3);
        assert_eq!(stats.average_completion_time, 334); // 1001 / 3 rounded
        assert_eq!(stats.best_completion_time, 200);
        assert_eq!(stats.total_stars, 6);

        assert_eq!(stats.easy.played, 2);
        assert_eq!(stats.easy.solved, 2);
        assert_eq!(stats.easy.best_time, 200);
        // played but never solved: best time stays 0, not "infinite"
        assert_eq!(stats.normal.played, 1);
        assert_eq!(stats.normal.solved, 0);
        assert_eq!(stats.normal.best_time, 0);
        assert_eq!(stats.hard.best_time, 501);
    }

    #[test]
    fn test_calculate_stats_empty() {
        let stats = calculate_stats(&[]);
        assert_eq!(stats, AggregateStats::default());
    }

    #[test]
    fn test_formatting() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(125), "2:05");
        assert_eq!(format_stars(2), "★★☆");
        assert_eq!(format_stars(0), "☆☆☆");
    }
}
