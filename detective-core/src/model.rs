//! Game session data model.
//!
//! `GameSession` is the single root aggregate. Case-scoped fields are filled
//! by a new case and cleared by `clear_case`; `progress` and
//! `generation_config` survive across cases.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// A person of interest in the current case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suspect {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub occupation: String,
    #[serde(default, alias = "relationship")]
    pub relationship_to_victim: String,
    #[serde(default)]
    pub motive: String,
    #[serde(default)]
    pub alibi: String,
}

/// A piece of evidence in the current case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
}

/// Case difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Normal,
    Hard,
}

/// Fixed generation parameters for a difficulty level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DifficultyParams {
    pub suspect_count: usize,
    pub evidence_count: usize,
    pub complexity: &'static str,
    pub avoid: &'static [&'static str],
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Normal, Difficulty::Hard];

    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Normal => "normal",
            Difficulty::Hard => "hard",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Normal => "Normal",
            Difficulty::Hard => "Hard",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Difficulty::Easy => "Simple cases with clear clues",
            Difficulty::Normal => "Balanced cases with moderate complexity",
            Difficulty::Hard => "Complex cases with misleading clues",
        }
    }

    pub fn params(self) -> DifficultyParams {
        match self {
            Difficulty::Easy => DifficultyParams {
                suspect_count: 3,
                evidence_count: 3,
                complexity: "low",
                avoid: &["multiple motives", "red herrings", "complex relationships"],
            },
            Difficulty::Normal => DifficultyParams {
                suspect_count: 4,
                evidence_count: 4,
                complexity: "medium",
                avoid: &["excessive red herrings"],
            },
            Difficulty::Hard => DifficultyParams {
                suspect_count: 5,
                evidence_count: 5,
                complexity: "high",
                avoid: &[],
            },
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "normal" => Ok(Difficulty::Normal),
            "hard" => Ok(Difficulty::Hard),
            _ => Err(()),
        }
    }
}

/// Accepts both `"hard"` and the older `{"level": "hard", "name": ...}` shape.
fn deserialize_difficulty<'de, D>(deserializer: D) -> Result<Difficulty, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Plain(Difficulty),
        Legacy { level: Difficulty },
    }

    Ok(match Repr::deserialize(deserializer)? {
        Repr::Plain(difficulty) | Repr::Legacy { level: difficulty } => difficulty,
    })
}

/// Per-case counters and clock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaseStats {
    pub start_time: Option<DateTime<Utc>>,
    pub interrogation_count: u32,
    pub wrong_guess_count: u32,
    pub is_active: bool,
}

impl CaseStats {
    /// Fresh stats for a case starting at `now`.
    pub fn started(now: DateTime<Utc>) -> Self {
        Self {
            start_time: Some(now),
            interrogation_count: 0,
            wrong_guess_count: 0,
            is_active: true,
        }
    }

    /// Seconds since the case clock started, or 0 if it never did.
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> u64 {
        self.start_time
            .map(|start| (now - start).num_seconds().max(0) as u64)
            .unwrap_or(0)
    }
}

/// Immutable record of a resolved case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseRecord {
    pub case_id: String,
    pub difficulty: Difficulty,
    pub completed_at: DateTime<Utc>,
    #[serde(alias = "completionTime")]
    pub completion_time_seconds: u64,
    pub interrogation_count: u32,
    #[serde(alias = "wrongGuesses")]
    pub wrong_guess_count: u32,
    /// 1-3 for a solved case, 0 for a failed accusation.
    pub stars: u8,
    pub is_correct: bool,
}

/// An achievement. Unlocking is one-way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub is_unlocked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlocked_at: Option<DateTime<Utc>>,
}

/// Played/solved/best-time for one difficulty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DifficultyStats {
    pub played: u32,
    pub solved: u32,
    /// Fastest solve in seconds, 0 if nothing solved.
    pub best_time: u64,
}

/// Aggregate statistics derived from the completed-case history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AggregateStats {
    pub total_cases_played: u32,
    pub total_cases_solved: u32,
    pub average_completion_time: u64,
    pub best_completion_time: u64,
    pub total_stars: u32,
    pub achievements_unlocked: u32,
    pub easy: DifficultyStats,
    pub normal: DifficultyStats,
    pub hard: DifficultyStats,
}

impl AggregateStats {
    pub fn for_difficulty(&self, difficulty: Difficulty) -> &DifficultyStats {
        match difficulty {
            Difficulty::Easy => &self.easy,
            Difficulty::Normal => &self.normal,
            Difficulty::Hard => &self.hard,
        }
    }

    pub fn for_difficulty_mut(&mut self, difficulty: Difficulty) -> &mut DifficultyStats {
        match difficulty {
            Difficulty::Easy => &mut self.easy,
            Difficulty::Normal => &mut self.normal,
            Difficulty::Hard => &mut self.hard,
        }
    }
}

/// Cross-case history. Append-only except for an explicit reset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Progress {
    pub completed_cases: Vec<CaseRecord>,
    pub achievements: Vec<Achievement>,
    #[serde(alias = "stats")]
    pub aggregate_stats: AggregateStats,
}

impl Progress {
    pub fn is_unlocked(&self, achievement_id: &str) -> bool {
        self.achievements
            .iter()
            .any(|a| a.id == achievement_id && a.is_unlocked)
    }

    pub fn unlocked_count(&self) -> usize {
        self.achievements.iter().filter(|a| a.is_unlocked).count()
    }
}

/// Generation backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub url: String,
    pub key: String,
    pub model: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            url: llm::DEFAULT_ENDPOINT.to_string(),
            key: String::new(),
            model: llm::DEFAULT_MODEL.to_string(),
        }
    }
}

impl GenerationConfig {
    /// Key with everything after the first ten characters hidden.
    pub fn masked_key(&self) -> Option<String> {
        if self.key.is_empty() {
            None
        } else {
            let prefix: String = self.key.chars().take(10).collect();
            Some(format!("{prefix}..."))
        }
    }
}

/// Where a session stands in the case lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseState {
    /// No case loaded.
    Idle,
    /// Case loaded and the clock running.
    Active,
    /// Case loaded but already accused; awaiting `clear_case` or `new_case`.
    Resolved,
}

/// The full durable game state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameSession {
    pub case_id: String,
    #[serde(alias = "caseDescription")]
    pub description: String,
    #[serde(alias = "victim")]
    pub victim_info: String,
    pub suspects: Vec<Suspect>,
    pub evidence: Vec<Evidence>,
    /// Id of the culprit within `suspects`.
    pub solution: String,
    /// How the crime happened, revealed with the verdict.
    pub solution_narrative: String,
    /// Level used for the next generated case.
    #[serde(deserialize_with = "deserialize_difficulty")]
    pub difficulty: Difficulty,
    /// Level the loaded case was generated at.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_difficulty: Option<Difficulty>,
    #[serde(alias = "currentInterrogation")]
    pub active_interrogation_suspect_id: Option<String>,
    pub case_stats: CaseStats,
    #[serde(alias = "gameProgress")]
    pub progress: Progress,
    #[serde(alias = "apiConfig")]
    pub generation_config: GenerationConfig,
}

impl Default for GameSession {
    fn default() -> Self {
        Self {
            case_id: String::new(),
            description: String::new(),
            victim_info: String::new(),
            suspects: Vec::new(),
            evidence: Vec::new(),
            solution: String::new(),
            solution_narrative: String::new(),
            difficulty: Difficulty::default(),
            case_difficulty: None,
            active_interrogation_suspect_id: None,
            case_stats: CaseStats::default(),
            progress: Progress::default(),
            generation_config: GenerationConfig::default(),
        }
    }
}

impl GameSession {
    pub fn case_state(&self) -> CaseState {
        if self.case_id.is_empty() {
            CaseState::Idle
        } else if self.case_stats.is_active {
            CaseState::Active
        } else {
            CaseState::Resolved
        }
    }

    pub fn has_case(&self) -> bool {
        !self.case_id.is_empty()
    }

    /// Level the loaded case is scored at. Sessions saved before the case
    /// level was tracked fall back to the selected level.
    pub fn active_difficulty(&self) -> Difficulty {
        self.case_difficulty.unwrap_or(self.difficulty)
    }

    /// Suspect for a 1-based index as typed by the player.
    pub fn suspect_at(&self, one_based: usize) -> Option<&Suspect> {
        one_based
            .checked_sub(1)
            .and_then(|index| self.suspects.get(index))
    }

    pub fn suspect_by_id(&self, id: &str) -> Option<&Suspect> {
        self.suspects.iter().find(|s| s.id == id)
    }

    pub fn culprit(&self) -> Option<&Suspect> {
        self.suspect_by_id(&self.solution)
    }

    /// Check the case-scoped invariants. Returns a description of the first violation.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.case_stats.is_active && self.case_stats.start_time.is_none() {
            return Err("case is active without a start time".to_string());
        }
        if let Some(ref id) = self.active_interrogation_suspect_id {
            if self.suspect_by_id(id).is_none() {
                return Err(format!("interrogated suspect '{id}' is not in the roster"));
            }
        }
        if self.has_case() {
            let matches = self.suspects.iter().filter(|s| s.id == self.solution).count();
            if matches != 1 {
                return Err(format!(
                    "solution '{}' resolves to {matches} suspects",
                    self.solution
                ));
            }
        }
        Ok(())
    }
}
