//! Parsing and validating generated cases.
//!
//! A generated case is only installed once its culprit resolves to exactly
//! one suspect. Anything else is an `InvalidCase` and the caller retries.

use crate::generation::GenerationError;
use crate::model::{CaseStats, Difficulty, Evidence, Suspect};
use crate::store::SessionPatch;
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Generation attempts before `new_case` gives up.
pub const MAX_ATTEMPTS: usize = 3;

/// Accepts strings and numbers, since models are loose about `"id": 1`.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSuspect {
    #[serde(default, deserialize_with = "lenient_string")]
    id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    occupation: String,
    #[serde(default, alias = "relationshipToVictim", deserialize_with = "lenient_string")]
    relationship: String,
    #[serde(default, deserialize_with = "lenient_string")]
    motive: String,
    #[serde(default, deserialize_with = "lenient_string")]
    alibi: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvidence {
    #[serde(default, deserialize_with = "lenient_string")]
    name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    description: String,
    #[serde(default, deserialize_with = "lenient_string")]
    location: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCase {
    #[serde(default, alias = "caseDescription", deserialize_with = "lenient_string")]
    description: String,
    #[serde(default, alias = "victimInfo", deserialize_with = "lenient_string")]
    victim: String,
    #[serde(default)]
    suspects: Vec<RawSuspect>,
    #[serde(default)]
    evidence: Vec<RawEvidence>,
    #[serde(default, alias = "culprit", deserialize_with = "lenient_string")]
    culprit_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    solution: String,
}

/// A validated case, ready to install.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseDraft {
    pub description: String,
    pub victim_info: String,
    pub suspects: Vec<Suspect>,
    pub evidence: Vec<Evidence>,
    /// Id of the culprit within `suspects`.
    pub solution: String,
    pub solution_narrative: String,
}

impl CaseDraft {
    /// Parse and validate a generated case.
    pub fn parse(response: &str) -> Result<Self, GenerationError> {
        let json = extract_json(response);
        let raw: RawCase = serde_json::from_str(json)
            .map_err(|e| GenerationError::InvalidCase(format!("not valid case JSON: {e}")))?;

        if raw.description.trim().is_empty() {
            return Err(GenerationError::InvalidCase("missing description".to_string()));
        }
        if raw.suspects.len() < 2 {
            return Err(GenerationError::InvalidCase(format!(
                "expected at least 2 suspects, got {}",
                raw.suspects.len()
            )));
        }
        if raw.suspects.iter().any(|s| s.name.trim().is_empty()) {
            return Err(GenerationError::InvalidCase("suspect without a name".to_string()));
        }
        if raw.evidence.is_empty() {
            return Err(GenerationError::InvalidCase("no evidence".to_string()));
        }

        let culprit = resolve_culprit(&raw)?;

        let suspects: Vec<Suspect> = raw
            .suspects
            .into_iter()
            .enumerate()
            .map(|(i, s)| Suspect {
                id: (i + 1).to_string(),
                name: s.name.trim().to_string(),
                occupation: s.occupation,
                relationship_to_victim: s.relationship,
                motive: s.motive,
                alibi: s.alibi,
            })
            .collect();

        let evidence = raw
            .evidence
            .into_iter()
            .enumerate()
            .map(|(i, e)| Evidence {
                id: (i + 1).to_string(),
                name: e.name,
                description: e.description,
                location: e.location,
            })
            .collect();

        let narrative = if raw.solution.trim() == raw.culprit_id.trim()
            || raw.solution.trim().chars().all(|c| c.is_ascii_digit())
        {
            String::new()
        } else {
            raw.solution.trim().to_string()
        };

        Ok(Self {
            description: raw.description,
            victim_info: raw.victim,
            solution: suspects[culprit].id.clone(),
            suspects,
            evidence,
            solution_narrative: narrative,
        })
    }

    pub fn culprit_name(&self) -> Option<&str> {
        self.suspects
            .iter()
            .find(|s| s.id == self.solution)
            .map(|s| s.name.as_str())
    }

    /// Patch installing this case with a fresh case clock.
    pub fn into_patch(
        self,
        case_id: String,
        difficulty: Difficulty,
        now: DateTime<Utc>,
    ) -> SessionPatch {
        SessionPatch {
            case_id: Some(case_id),
            case_difficulty: Some(Some(difficulty)),
            description: Some(self.description),
            victim_info: Some(self.victim_info),
            suspects: Some(self.suspects),
            evidence: Some(self.evidence),
            solution: Some(self.solution),
            solution_narrative: Some(self.solution_narrative),
            active_interrogation_suspect_id: Some(None),
            case_stats: Some(CaseStats::started(now)),
            ..SessionPatch::default()
        }
    }
}

/// Strip a Markdown code fence or surrounding prose from a JSON answer.
fn extract_json(response: &str) -> &str {
    let trimmed = response.trim();

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after[body_start..];
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// Index of the single suspect the case names as culprit.
fn resolve_culprit(raw: &RawCase) -> Result<usize, GenerationError> {
    let by_id = |id: &str| -> Option<usize> {
        let id = id.trim();
        if id.is_empty() {
            return None;
        }
        let matches: Vec<usize> = raw
            .suspects
            .iter()
            .enumerate()
            .filter(|(_, s)| s.id.trim() == id)
            .map(|(i, _)| i)
            .collect();
        (matches.len() == 1).then(|| matches[0])
    };

    let by_name = |text: &str| -> Option<usize> {
        let text = text.to_lowercase();
        if text.trim().is_empty() {
            return None;
        }
        let matches: Vec<usize> = raw
            .suspects
            .iter()
            .enumerate()
            .filter(|(_, s)| text.contains(&s.name.trim().to_lowercase()))
            .map(|(i, _)| i)
            .collect();
        (matches.len() == 1).then(|| matches[0])
    };

    by_id(&raw.culprit_id)
        .or_else(|| by_name(&raw.culprit_id))
        .or_else(|| by_id(&raw.solution))
        .or_else(|| by_name(&raw.solution))
        .ok_or_else(|| {
            GenerationError::InvalidCase(
                "culprit does not resolve to exactly one suspect".to_string(),
            )
        })
}

/// `MH` + two-digit year + six uppercase alphanumerics.
pub fn new_case_id(now: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect::<String>()
        .to_uppercase();
    format!("MH{}{}", now.format("%y"), suffix)
}
