//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Example
//!
//! ```toml
//! [lock]
//! lease_secs = 120
//! poll_interval_ms = 50
//!
//! [import]
//! poll_timeout_secs = 180
//! poll_interval_ms = 100
//! existence_cache_capacity = 5000
//!
//! [state]
//! directory = "/var/lib/schemagraph/state"
//! ```
//!
//! # Validation
//!
//! Durations and capacities must be non-zero. Validation runs after
//! parsing so a bad file is reported before any catalog is built.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Resource lock settings
    pub lock: Option<LockConfig>,

    /// Import run settings
    pub import: Option<ImportConfig>,

    /// Exported state location
    pub state: Option<StateConfig>,
}

impl FileConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(lock) = &self.lock {
            non_zero("lock.lease_secs", lock.lease_secs)?;
            non_zero("lock.poll_interval_ms", lock.poll_interval_ms)?;
        }
        if let Some(import) = &self.import {
            non_zero("import.poll_timeout_secs", import.poll_timeout_secs)?;
            non_zero("import.poll_interval_ms", import.poll_interval_ms)?;
            non_zero(
                "import.existence_cache_capacity",
                import.existence_cache_capacity.map(|n| n as u64),
            )?;
        }
        if let Some(StateConfig {
            directory: Some(dir),
        }) = &self.state
        {
            if dir.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue(
                    "state.directory cannot be empty".into(),
                ));
            }
        }
        Ok(())
    }
}

fn non_zero(field: &str, value: Option<u64>) -> Result<(), ConfigError> {
    match value {
        Some(0) => Err(ConfigError::InvalidValue(format!(
            "{field} must be greater than zero"
        ))),
        _ => Ok(()),
    }
}

/// Resource lock settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LockConfig {
    /// Seconds after which a held lock expires
    pub lease_secs: Option<u64>,

    /// Milliseconds between lock-file retries
    pub poll_interval_ms: Option<u64>,
}

/// Import run settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ImportConfig {
    /// Seconds to wait for a dependency to become visible
    pub poll_timeout_secs: Option<u64>,

    /// Milliseconds between visibility checks
    pub poll_interval_ms: Option<u64>,

    /// Entries kept in the existence cache
    pub existence_cache_capacity: Option<usize>,
}

/// Exported state location.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StateConfig {
    /// Default directory for export and import
    pub directory: Option<PathBuf>,
}
