//! core::config
//!
//! Configuration schema and loading.
//!
//! # Precedence
//!
//! The first file found wins; missing values fall back to defaults:
//! 1. An explicit path passed to [`Config::load`]
//! 2. `$SCHEMAGRAPH_CONFIG` if set
//! 3. `$XDG_CONFIG_HOME/schemagraph/config.toml`
//! 4. `~/.schemagraph/config.toml` (canonical write location)
//!
//! # Example
//!
//! ```no_run
//! use schemagraph::core::config::Config;
//!
//! let config = Config::load(None).unwrap();
//! println!("Lock lease: {:?}", config.lock_lease());
//! println!("Import poll timeout: {:?}", config.import_poll_timeout());
//! ```

pub mod schema;

pub use schema::{FileConfig, ImportConfig, LockConfig, StateConfig};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Default lock lease (120 seconds).
pub const DEFAULT_LOCK_LEASE_SECS: u64 = 120;
/// Default retry interval for the state directory lock.
pub const DEFAULT_LOCK_POLL_INTERVAL_MS: u64 = 50;
/// Default import dependency poll timeout (180 seconds).
pub const DEFAULT_IMPORT_POLL_TIMEOUT_SECS: u64 = 180;
/// Default interval between import visibility checks.
pub const DEFAULT_IMPORT_POLL_INTERVAL_MS: u64 = 100;
/// Default existence cache capacity.
pub const DEFAULT_EXISTENCE_CACHE_CAPACITY: usize = 5000;

/// Environment variable naming a config file.
pub const CONFIG_ENV_VAR: &str = "SCHEMAGRAPH_CONFIG";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("failed to write config file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("home directory not found")]
    NoHomeDir,
}

/// Configuration with defaults applied through accessors.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Parsed file contents
    pub file: FileConfig,
    /// Path the file was loaded from (if any)
    loaded_from: Option<PathBuf>,
}

impl Config {
    /// Build a config from already-parsed values.
    pub fn from_file_config(file: FileConfig) -> Result<Self, ConfigError> {
        file.validate()?;
        Ok(Self {
            file,
            loaded_from: None,
        })
    }

    /// Load configuration from `explicit` or the default locations.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed or
    /// fails validation. A missing file is not an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = Self::locate(explicit) else {
            return Ok(Self::default());
        };

        let file = Self::read_config(&path)?;
        file.validate()?;
        tracing::debug!(path = %path.display(), "loaded configuration");

        Ok(Self {
            file,
            loaded_from: Some(path),
        })
    }

    fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("schemagraph/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        dirs::home_dir()
            .map(|home| home.join(".schemagraph/config.toml"))
            .filter(|path| path.exists())
    }

    fn read_config(path: &Path) -> Result<FileConfig, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Get the canonical path for the config file.
    ///
    /// Returns `~/.schemagraph/config.toml`.
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".schemagraph/config.toml"))
    }

    /// Write a config file atomically.
    ///
    /// Creates parent directories if needed. Writes to a temp file in the
    /// same directory, then renames it over the target.
    pub fn write(path: &Path, file: &FileConfig) -> Result<(), ConfigError> {
        file.validate()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let contents =
            toml::to_string_pretty(file).map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

        let temp_path = path.with_extension("toml.tmp");
        let mut handle = fs::File::create(&temp_path).map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;
        handle
            .write_all(contents.as_bytes())
            .map_err(|e| ConfigError::WriteError {
                path: temp_path.clone(),
                source: e,
            })?;
        handle.sync_all().map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;

        fs::rename(&temp_path, path).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Lease after which a held resource lock expires.
    pub fn lock_lease(&self) -> Duration {
        Duration::from_secs(
            self.file
                .lock
                .as_ref()
                .and_then(|l| l.lease_secs)
                .unwrap_or(DEFAULT_LOCK_LEASE_SECS),
        )
    }

    /// Interval between state directory lock retries.
    pub fn lock_poll_interval(&self) -> Duration {
        Duration::from_millis(
            self.file
                .lock
                .as_ref()
                .and_then(|l| l.poll_interval_ms)
                .unwrap_or(DEFAULT_LOCK_POLL_INTERVAL_MS),
        )
    }

    /// Longest an import waits for a dependency to become visible.
    pub fn import_poll_timeout(&self) -> Duration {
        Duration::from_secs(
            self.file
                .import
                .as_ref()
                .and_then(|i| i.poll_timeout_secs)
                .unwrap_or(DEFAULT_IMPORT_POLL_TIMEOUT_SECS),
        )
    }

    /// Interval between import visibility checks.
    pub fn import_poll_interval(&self) -> Duration {
        Duration::from_millis(
            self.file
                .import
                .as_ref()
                .and_then(|i| i.poll_interval_ms)
                .unwrap_or(DEFAULT_IMPORT_POLL_INTERVAL_MS),
        )
    }

    /// Capacity of the import existence cache.
    pub fn existence_cache_capacity(&self) -> usize {
        self.file
            .import
            .as_ref()
            .and_then(|i| i.existence_cache_capacity)
            .unwrap_or(DEFAULT_EXISTENCE_CACHE_CAPACITY)
    }

    /// Configured state directory, if any.
    pub fn state_directory(&self) -> Option<&Path> {
        self.file
            .state
            .as_ref()
            .and_then(|s| s.directory.as_deref())
    }

    /// Path the config was loaded from, if any.
    pub fn loaded_from(&self) -> Option<&Path> {
        self.loaded_from.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_without_file() {
        let config = Config::default();
        assert_eq!(config.lock_lease(), Duration::from_secs(120));
        assert_eq!(config.import_poll_timeout(), Duration::from_secs(180));
        assert_eq!(config.existence_cache_capacity(), 5000);
        assert!(config.state_directory().is_none());
        assert!(config.loaded_from().is_none());
    }

    #[test]
    fn load_explicit_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            r#"
            [lock]
            lease_secs = 7

            [import]
            poll_interval_ms = 5
            "#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.lock_lease(), Duration::from_secs(7));
        assert_eq!(config.import_poll_interval(), Duration::from_millis(5));
        assert_eq!(config.import_poll_timeout(), Duration::from_secs(180));
        assert_eq!(config.loaded_from(), Some(path.as_path()));
    }

    #[test]
    fn load_from_env() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("env.toml");
        fs::write(&path, "[state]\ndirectory = \"/srv/state\"\n").unwrap();

        std::env::set_var(CONFIG_ENV_VAR, path.to_str().unwrap());
        let config = Config::load(None).unwrap();
        std::env::remove_var(CONFIG_ENV_VAR);

        assert_eq!(config.state_directory(), Some(Path::new("/srv/state")));
    }

    #[test]
    fn unknown_fields_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "[lock]\nlease = 3\n").unwrap();

        let err = Config::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn invalid_value_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "[import]\npoll_timeout_secs = 0\n").unwrap();

        let err = Config::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/config.toml");
        let file = FileConfig {
            import: Some(ImportConfig {
                existence_cache_capacity: Some(12),
                ..Default::default()
            }),
            ..Default::default()
        };

        Config::write(&path, &file).unwrap();
        assert!(!path.with_extension("toml.tmp").exists());

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.file, file);
        assert_eq!(config.existence_cache_capacity(), 12);
    }
}
