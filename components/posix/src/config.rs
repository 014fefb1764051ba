//! File table configuration
//!
//! Configuration is read from the `[files]` table of a TOML document:
//!
//! ```toml
//! [files]
//! capacity = 64
//! console = "con:"
//! ```
//!
//! Missing keys fall back to [`FileTableConfig::default`].

use serde::Deserialize;
use static_assertions::const_assert;
use thiserror::Error;

/// Default number of descriptor slots per process
pub const OPEN_MAX: usize = 128;

/// Slots bound to the console at table creation (stdin, stdout, stderr)
pub const RESERVED_FDS: usize = 3;

const_assert!(OPEN_MAX > RESERVED_FDS);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Capacity {capacity} leaves no room for the three console slots")]
    CapacityTooSmall { capacity: usize },
}

/// Per-process descriptor table settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileTableConfig {
    /// Number of slots in each table; handles live in `0..capacity`
    pub capacity: usize,

    /// Device opened for the three console slots
    pub console: String,
}

impl Default for FileTableConfig {
    fn default() -> Self {
        Self {
            capacity: OPEN_MAX,
            console: "con:".to_string(),
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    files: FileTableConfig,
}

impl FileTableConfig {
    /// Parse the `[files]` table out of a TOML document
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(source)?;
        file.files.validate()?;
        Ok(file.files)
    }

    /// Check that the console slots fit
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity < RESERVED_FDS {
            return Err(ConfigError::CapacityTooSmall {
                capacity: self.capacity,
            });
        }
        Ok(())
    }
}
