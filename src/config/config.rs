use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_LANGUAGE: &str = "es-ES";
pub const DEFAULT_MIN_INTERVAL_SECONDS: u64 = 30;
pub const DEFAULT_MAX_INTERVAL_SECONDS: u64 = 59;
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8765";
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 10;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid pause interval: min={min}s max={max}s (both must be > 0 and min <= max)")]
    InvalidInterval { min: u64, max: u64 },

    #[error("Unable to determine user config directory")]
    NoConfigDir,

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Bounds for the random delay between scheduled pauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    min_interval_seconds: u64,
    max_interval_seconds: u64,
}

impl ScheduleConfig {
    pub fn new(min_interval_seconds: u64, max_interval_seconds: u64) -> Result<Self, ConfigError> {
        if min_interval_seconds == 0 || min_interval_seconds > max_interval_seconds {
            return Err(ConfigError::InvalidInterval {
                min: min_interval_seconds,
                max: max_interval_seconds,
            });
        }
        Ok(Self {
            min_interval_seconds,
            max_interval_seconds,
        })
    }

    pub fn min_interval_seconds(&self) -> u64 {
        self.min_interval_seconds
    }

    pub fn max_interval_seconds(&self) -> u64 {
        self.max_interval_seconds
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            min_interval_seconds: DEFAULT_MIN_INTERVAL_SECONDS,
            max_interval_seconds: DEFAULT_MAX_INTERVAL_SECONDS,
        }
    }
}

/// User settings persisted as TOML. Every field is optional on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Speech locale used for synthesis and recognition, e.g. `es-ES`.
    pub language: String,
    pub min_interval_seconds: u64,
    pub max_interval_seconds: u64,
    /// Address the WebSocket server binds to.
    pub listen: String,
    pub request_timeout_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            min_interval_seconds: DEFAULT_MIN_INTERVAL_SECONDS,
            max_interval_seconds: DEFAULT_MAX_INTERVAL_SECONDS,
            listen: DEFAULT_LISTEN_ADDR.to_string(),
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
        }
    }
}

impl Settings {
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(dir.join("say_it").join("config.toml"))
    }

    /// Loads settings from `path`, falling back to defaults when the file is absent.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let settings: Settings = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.schedule()?;
        Ok(settings)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        self.schedule()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn schedule(&self) -> Result<ScheduleConfig, ConfigError> {
        ScheduleConfig::new(self.min_interval_seconds, self.max_interval_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds.max(1))
    }
}

/// Translation endpoints want a bare language code, while speech APIs want a
/// locale. `es-ES` becomes `es`.
pub fn translation_code(language: &str) -> &str {
    language
        .split(['-', '_'])
        .next()
        .filter(|code| !code.is_empty())
        .unwrap_or(language)
}
