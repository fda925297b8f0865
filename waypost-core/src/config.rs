//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/waypost/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/waypost/` (~/.config/waypost/)
//! - Data: `$XDG_DATA_HOME/waypost/` (~/.local/share/waypost/)
//! - State/Logs: `$XDG_STATE_HOME/waypost/` (~/.local/state/waypost/)
//!
//! Note that the delivery target (endpoint URL and request headers) is *not*
//! file configuration: it is supplied at runtime through
//! [`Tracker::configure`](crate::Tracker::configure) and persisted in the
//! state store, so a relaunched process resumes delivering without the host
//! re-supplying it.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Tracking and delivery tuning
    #[serde(default)]
    pub tracking: TrackingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Tracking and delivery configuration
///
/// `min_interval_secs` is the throttle interval: the minimum wall-clock time
/// between delivery attempts on the capture path. The default matches the
/// 15-minute cadence the pipeline was designed around.
#[derive(Debug, Deserialize, Clone)]
pub struct TrackingConfig {
    /// Minimum seconds between delivery attempts
    #[serde(default = "default_min_interval")]
    pub min_interval_secs: u64,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: default_min_interval(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl TrackingConfig {
    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            return Err(Error::Config(
                "tracking.request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_min_interval() -> u64 {
    15 * 60
}

fn default_request_timeout() -> u64 {
    30
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.tracking.validate()?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/waypost/config.toml` (~/.config/waypost/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("waypost").join("config.toml")
    }

    /// Returns the data directory path (for the SQLite state store)
    ///
    /// `$XDG_DATA_HOME/waypost/` (~/.local/share/waypost/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("waypost")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/waypost/` (~/.local/state/waypost/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("waypost")
    }

    /// Returns the state store file path
    ///
    /// `$XDG_DATA_HOME/waypost/state.db` (~/.local/share/waypost/state.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("state.db")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/waypost/waypost.log` (~/.local/state/waypost/waypost.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("waypost.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.tracking.min_interval_secs, 900);
        assert_eq!(config.tracking.request_timeout_secs, 30);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[tracking]
min_interval_secs = 60
request_timeout_secs = 10

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.tracking.min_interval_secs, 60);
        assert_eq!(config.tracking.request_timeout_secs, 10);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml = r#"
[tracking]
min_interval_secs = 0
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.tracking.min_interval_secs, 0);
        assert_eq!(config.tracking.request_timeout_secs, 30);
        assert_eq!(config.logging.max_files, 5);
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let config = TrackingConfig {
            min_interval_secs: 900,
            request_timeout_secs: 0,
        };
        assert!(config.validate().is_err());
    }
}
