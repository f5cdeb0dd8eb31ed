//! Store configuration.
//!
//! Loaded from a RON file such as:
//!
//! ```ron
//! (
//!     block_size: 32768,
//!     busy_timeout_ms: 5000,
//!     journal_mode: "WAL",
//! )
//! ```
//!
//! Every field is optional; missing fields take the defaults below.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Block size for newly created files.
pub const DEFAULT_BLOCK_SIZE: u64 = 32 * 1024;

/// How long a statement waits on a locked database before failing.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Settings applied when a [`Dbfs`](crate::Dbfs) opens its connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbfsConfig {
    /// Block size given to files at creation. Existing files keep theirs.
    pub block_size: u64,
    /// SQLite busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
    /// SQLite journal mode for on-disk databases (`WAL`, `DELETE`, ...).
    pub journal_mode: String,
}

impl Default for DbfsConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: "WAL".to_string(),
        }
    }
}

impl DbfsConfig {
    /// Default settings with a different block size.
    pub fn with_block_size(block_size: u64) -> Self {
        Self {
            block_size,
            ..Default::default()
        }
    }

    /// Parse a RON document.
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let config: DbfsConfig = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron(&text)
    }

    /// Reject settings the store cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size == 0 {
            return Err(ConfigError::Invalid("block_size must be positive".into()));
        }
        if i64::try_from(self.block_size).is_err() {
            return Err(ConfigError::Invalid("block_size out of range".into()));
        }
        if !self.journal_mode.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::Invalid(format!(
                "journal_mode {:?} is not a mode name",
                self.journal_mode
            )));
        }
        Ok(())
    }

    /// Busy timeout as a duration.
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("invalid config: {0}")]
    Invalid(String),
}
