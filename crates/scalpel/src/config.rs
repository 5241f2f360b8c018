//! Configuration for ScalpelLab tools
//!
//! Loaded once from `<home>/config.toml` (see [`scalpel_logging::scalpel_home`]),
//! overridden by CLI flags, and then passed by value into every command.

use scalpel_db::StatusKind;
use scalpel_logging::scalpel_home;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::inventory::{threshold_bytes, DEFAULT_THRESHOLD_MB};

pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DATABASE_FILE_NAME: &str = "ScalpelDatabase.sqlite";
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8501";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Cannot write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Resolved settings for one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalpelConfig {
    /// SQLite database file
    pub database_path: PathBuf,

    /// Root of the MP4 export tree (`<root>/DATA_YY-MM-DD/CaseN/<Camera>/*.mp4`)
    pub mp4_root: Option<PathBuf>,

    /// Root of the SEQ backup tree
    pub seq_root: Option<PathBuf>,

    /// A camera is Complete when one file reaches this many MB (10^6 bytes)
    pub threshold_mb: u64,

    /// Dashboard bind address
    pub listen_addr: String,

    pub mp4_table: String,
    pub seq_table: String,
}

impl Default for ScalpelConfig {
    fn default() -> Self {
        Self {
            database_path: scalpel_home().join(DATABASE_FILE_NAME),
            mp4_root: None,
            seq_root: None,
            threshold_mb: DEFAULT_THRESHOLD_MB,
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            mp4_table: StatusKind::Mp4.default_table().to_string(),
            seq_table: StatusKind::Seq.default_table().to_string(),
        }
    }
}

/// `<home>/config.toml`
pub fn default_config_path() -> PathBuf {
    scalpel_home().join(CONFIG_FILE_NAME)
}

impl ScalpelConfig {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, `<home>/config.toml` is read
    /// when present and defaults are used otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => {
                let path = expand_tilde(path);
                if !path.is_file() {
                    return Err(ConfigError::NotFound(path));
                }
                Self::from_file(&path)
            }
            None => {
                let path = default_config_path();
                if path.is_file() {
                    Self::from_file(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Parse a TOML file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ScalpelConfig =
            toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(config.normalized())
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    fn normalized(mut self) -> Self {
        self.database_path = expand_tilde(&self.database_path);
        self.mp4_root = self.mp4_root.as_deref().map(expand_tilde);
        self.seq_root = self.seq_root.as_deref().map(expand_tilde);
        self
    }

    pub fn root_for(&self, kind: StatusKind) -> Option<&Path> {
        match kind {
            StatusKind::Mp4 => self.mp4_root.as_deref(),
            StatusKind::Seq => self.seq_root.as_deref(),
        }
    }

    pub fn table_for(&self, kind: StatusKind) -> &str {
        match kind {
            StatusKind::Mp4 => &self.mp4_table,
            StatusKind::Seq => &self.seq_table,
        }
    }

    pub fn threshold_bytes(&self) -> u64 {
        threshold_bytes(self.threshold_mb)
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}
