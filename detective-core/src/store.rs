//! Session store and persistence.
//!
//! `SessionStore` owns the one `GameSession`. Every mutation is a
//! `SessionPatch` applied through [`SessionStore::merge`], which persists
//! before returning, so a read after a merge always sees the merged value.

use crate::model::{
    CaseStats, Difficulty, Evidence, GameSession, GenerationConfig, Progress, Suspect,
};
use crate::scoring::calculate_stats;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Key holding the full session record.
pub const SESSION_KEY: &str = "session";

/// Key holding a copy of the generation config, for snapshots that predate
/// it being part of the session record.
pub const GENERATION_CONFIG_KEY: &str = "generation_config";

/// Errors from the storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("read-back of '{0}' did not match what was written")]
    Mismatch(String),
}

/// A durable string key/value store.
pub trait Storage: Send {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write `value` under `key`. Must not return until the value is durable.
    fn write(&mut self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Move an unreadable value out of the way, keeping it under `<key>.corrupt`.
    fn set_aside(&mut self, key: &str) -> Result<(), StoreError>;
}

/// One JSON file per key in a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl Storage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;

        let path = self.path_for(key);
        let tmp = self.dir.join(format!("{key}.json.tmp"));
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;

        if fs::read_to_string(&path)? != value {
            return Err(StoreError::Mismatch(key.to_string()));
        }
        Ok(())
    }

    fn set_aside(&mut self, key: &str) -> Result<(), StoreError> {
        let aside = self.dir.join(format!("{key}.json.corrupt"));
        match fs::rename(self.path_for(key), &aside) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process storage. Used for tests, `--no-persist`, and after a write failure.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn set_aside(&mut self, key: &str) -> Result<(), StoreError> {
        if let Some(value) = self.entries.remove(key) {
            self.entries.insert(format!("{key}.corrupt"), value);
        }
        Ok(())
    }
}

/// A shallow update to the session. `None` leaves a field untouched.
///
/// `case_difficulty` and `active_interrogation_suspect_id` are doubly optional:
/// `Some(None)` clears them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionPatch {
    pub case_id: Option<String>,
    pub description: Option<String>,
    pub victim_info: Option<String>,
    pub suspects: Option<Vec<Suspect>>,
    pub evidence: Option<Vec<Evidence>>,
    pub solution: Option<String>,
    pub solution_narrative: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub case_difficulty: Option<Option<Difficulty>>,
    pub active_interrogation_suspect_id: Option<Option<String>>,
    pub case_stats: Option<CaseStats>,
    pub progress: Option<Progress>,
    pub generation_config: Option<GenerationConfig>,
}

impl SessionPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Clears every case-scoped field. Progress, config and difficulty are kept.
    pub fn clear_case() -> Self {
        Self {
            case_id: Some(String::new()),
            description: Some(String::new()),
            victim_info: Some(String::new()),
            suspects: Some(Vec::new()),
            evidence: Some(Vec::new()),
            solution: Some(String::new()),
            solution_narrative: Some(String::new()),
            case_difficulty: Some(None),
            active_interrogation_suspect_id: Some(None),
            case_stats: Some(CaseStats::default()),
            ..Self::default()
        }
    }

    pub fn apply(self, session: &mut GameSession) {
        macro_rules! set {
            ($($field:ident),*) => {
                $(if let Some(value) = self.$field { session.$field = value; })*
            };
        }
        set!(
            case_id,
            description,
            victim_info,
            suspects,
            evidence,
            solution,
            solution_narrative,
            difficulty,
            case_difficulty,
            active_interrogation_suspect_id,
            case_stats,
            progress,
            generation_config
        );
    }
}

/// Owner of the canonical `GameSession`.
pub struct SessionStore {
    session: GameSession,
    storage: Box<dyn Storage>,
    degraded: bool,
    notice: Option<String>,
}

impl SessionStore {
    /// Load the session from `storage`, falling back to defaults.
    ///
    /// `seed` is the generation config used when nothing was persisted yet.
    pub fn open(storage: Box<dyn Storage>, seed: GenerationConfig) -> Self {
        let mut store = Self {
            session: GameSession::default(),
            storage,
            degraded: false,
            notice: None,
        };

        match load(store.storage.as_ref(), seed.clone()) {
            Ok(Some(session)) => {
                info!(case_id = %session.case_id, "Restored saved session");
                store.session = session;
            }
            Ok(None) => {
                debug!("No saved session, starting fresh");
                store.session.generation_config = seed;
            }
            Err(StoreError::Json(e)) => {
                warn!(error = %e, "Saved session is unreadable, setting it aside");
                store.session.generation_config = seed;
                match store.storage.set_aside(SESSION_KEY) {
                    Ok(()) => {
                        store.notice = Some(format!(
                            "Warning: the saved session could not be read ({e}). It was kept as {SESSION_KEY}.corrupt and a fresh session started."
                        ));
                    }
                    Err(e) => store.degrade(&e),
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to load saved session, starting fresh");
                store.session.generation_config = seed;
                store.degrade(&e);
            }
        }

        store
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self::open(Box::new(MemoryStorage::new()), GenerationConfig::default())
    }

    pub fn get(&self) -> &GameSession {
        &self.session
    }

    /// Apply `patch`, persist, and return the new state.
    pub fn merge(&mut self, patch: SessionPatch) -> &GameSession {
        if patch.is_empty() {
            return &self.session;
        }

        patch.apply(&mut self.session);

        if let Err(e) = self.persist() {
            warn!(error = %e, "Failed to persist session");
            self.degrade(&e);
        }

        &self.session
    }

    /// True once persistence has failed and the store is memory-only.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// One-time message for the player after the store degraded.
    pub fn take_notice(&mut self) -> Option<String> {
        self.notice.take()
    }

    fn persist(&mut self) -> Result<(), StoreError> {
        let record = serde_json::to_string_pretty(&self.session)?;
        let config = serde_json::to_string_pretty(&self.session.generation_config)?;
        self.storage.write(SESSION_KEY, &record)?;
        self.storage.write(GENERATION_CONFIG_KEY, &config)?;
        Ok(())
    }

    fn degrade(&mut self, cause: &StoreError) {
        if self.degraded {
            return;
        }
        warn!("Switching to in-memory session storage");
        self.degraded = true;
        self.storage = Box::new(MemoryStorage::new());
        self.notice = Some(format!(
            "Warning: progress can no longer be saved ({cause}). This session will not persist."
        ));
    }
}

/// Read, backfill and repair a persisted session.
fn load(storage: &dyn Storage, seed: GenerationConfig) -> Result<Option<GameSession>, StoreError> {
    let Some(content) = storage.read(SESSION_KEY)? else {
        return Ok(None);
    };

    let value: Value = serde_json::from_str(&content)?;
    let has_config = value.get("generationConfig").is_some() || value.get("apiConfig").is_some();
    let mut session: GameSession = serde_json::from_value(value)?;

    if !has_config {
        session.generation_config = match storage.read(GENERATION_CONFIG_KEY)? {
            Some(config) => serde_json::from_str(&config)?,
            None => seed,
        };
    }

    for repair in repair(&mut session) {
        warn!(repair = %repair, "Repaired saved session");
    }

    Ok(Some(session))
}

/// Restore the case-scoped invariants on a loaded session. Returns what was fixed.
pub fn repair(session: &mut GameSession) -> Vec<String> {
    let mut repairs = Vec::new();

    if session.has_case() {
        let matches = session
            .suspects
            .iter()
            .filter(|s| s.id == session.solution)
            .count();
        if matches != 1 {
            repairs.push(format!(
                "discarded case {} with unresolvable solution",
                session.case_id
            ));
            SessionPatch::clear_case().apply(session);
        }
    }

    if let Some(id) = session.active_interrogation_suspect_id.clone() {
        if session.suspect_by_id(&id).is_none() {
            repairs.push(format!("dropped dangling interrogation of '{id}'"));
            session.active_interrogation_suspect_id = None;
        }
    }

    let stats = &session.case_stats;
    if stats.is_active && (stats.start_time.is_none() || !session.has_case()) {
        repairs.push("reset case stats without a running case".to_string());
        session.case_stats = CaseStats::default();
    }

    let mut aggregate = calculate_stats(&session.progress.completed_cases);
    aggregate.achievements_unlocked = session.progress.unlocked_count() as u32;
    session.progress.aggregate_stats = aggregate;

    repairs
}
