//! Environment-driven application settings.

use crate::coordinator::DEFAULT_FILLER_INTERVAL;
use crate::model::GenerationConfig;
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_API_URL: &str = "DETECTIVE_API_URL";
pub const ENV_API_KEY: &str = "DETECTIVE_API_KEY";
pub const ENV_MODEL: &str = "DETECTIVE_MODEL";
pub const ENV_DATA_DIR: &str = "DETECTIVE_DATA_DIR";

/// Startup settings. Persisted session values take precedence over
/// `generation` once a session has been saved.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Where session files live. `None` when no data dir can be determined.
    pub data_dir: Option<PathBuf>,
    /// Seed for the generation config of a fresh session.
    pub generation: GenerationConfig,
    pub filler_interval: Duration,
    /// Write the session to disk.
    pub persist: bool,
    /// Use the scripted offline generator.
    pub offline: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            generation: GenerationConfig::default(),
            filler_interval: DEFAULT_FILLER_INTERVAL,
            persist: true,
            offline: false,
        }
    }
}

impl AppConfig {
    /// Read settings from `DETECTIVE_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`, ignoring blank values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(url) = get(ENV_API_URL) {
            config.generation.url = url;
        }
        if let Some(key) = get(ENV_API_KEY) {
            config.generation.key = key;
        }
        if let Some(model) = get(ENV_MODEL) {
            config.generation.model = model;
        }
        if let Some(dir) = get(ENV_DATA_DIR) {
            config.data_dir = Some(PathBuf::from(dir));
        }

        config
    }
}

/// Platform data directory plus `detective`.
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("detective"))
}
