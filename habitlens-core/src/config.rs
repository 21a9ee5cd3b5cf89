//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/habitlens/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/habitlens/` (~/.config/habitlens/)
//! - Data: `$XDG_DATA_HOME/habitlens/` (~/.local/share/habitlens/)
//! - State/Logs: `$XDG_STATE_HOME/habitlens/` (~/.local/state/habitlens/)

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
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Analysis tuning
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Background job intervals
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Alert throttling and retention
    #[serde(default)]
    pub alerts: AlertConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Analysis configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    /// Maximum number of suggestions surfaced per refresh
    #[serde(default = "default_suggestion_limit")]
    pub suggestion_limit: usize,

    /// Minimum risk score that produces a habit degradation alert
    #[serde(default = "default_alert_risk_threshold")]
    pub alert_risk_threshold: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            suggestion_limit: default_suggestion_limit(),
            alert_risk_threshold: default_alert_risk_threshold(),
        }
    }
}

fn default_suggestion_limit() -> usize {
    5
}

fn default_alert_risk_threshold() -> u32 {
    50
}

/// Scheduler configuration
///
/// Intervals drive `habitlens-scheduler`; the batch delay also applies to
/// one-shot batch runs from the CLI.
#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    /// Pattern and suggestion refresh interval
    #[serde(default = "default_pattern_refresh_minutes")]
    pub pattern_refresh_minutes: u64,

    /// Suggestion expiry and alert retention sweep interval
    #[serde(default = "default_cleanup_minutes")]
    pub cleanup_minutes: u64,

    /// Full risk prediction batch interval
    #[serde(default = "default_prediction_batch_hours")]
    pub prediction_batch_hours: u64,

    /// Lightweight critical-risk check interval
    #[serde(default = "default_critical_check_hours")]
    pub critical_check_hours: u64,

    /// Pause between users in batch runs, in milliseconds
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,

    /// How often the scheduler loop wakes up to look for due jobs
    #[serde(default = "default_poll_seconds")]
    pub poll_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pattern_refresh_minutes: default_pattern_refresh_minutes(),
            cleanup_minutes: default_cleanup_minutes(),
            prediction_batch_hours: default_prediction_batch_hours(),
            critical_check_hours: default_critical_check_hours(),
            batch_delay_ms: default_batch_delay_ms(),
            poll_seconds: default_poll_seconds(),
        }
    }
}

fn default_pattern_refresh_minutes() -> u64 {
    120
}

fn default_cleanup_minutes() -> u64 {
    60
}

fn default_prediction_batch_hours() -> u64 {
    24
}

fn default_critical_check_hours() -> u64 {
    6
}

fn default_batch_delay_ms() -> u64 {
    500
}

fn default_poll_seconds() -> u64 {
    30
}

/// Alert configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AlertConfig {
    /// Minimum spacing between two alerts of the same type for one user
    #[serde(default = "default_throttle_hours")]
    pub throttle_hours: i64,

    /// Read alerts older than this are deleted by cleanup
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            throttle_hours: default_throttle_hours(),
            retention_days: default_retention_days(),
        }
    }
}

fn default_throttle_hours() -> i64 {
    24
}

fn default_retention_days() -> i64 {
    30
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
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

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        let s = &self.scheduler;
        if s.pattern_refresh_minutes == 0
            || s.cleanup_minutes == 0
            || s.prediction_batch_hours == 0
            || s.critical_check_hours == 0
        {
            return Err(Error::Config(
                "scheduler intervals must be greater than zero".to_string(),
            ));
        }
        if s.poll_seconds == 0 {
            return Err(Error::Config(
                "scheduler.poll_seconds must be greater than zero".to_string(),
            ));
        }
        if self.analysis.suggestion_limit == 0 {
            return Err(Error::Config(
                "analysis.suggestion_limit must be at least 1".to_string(),
            ));
        }
        if self.analysis.alert_risk_threshold > 100 {
            return Err(Error::Config(
                "analysis.alert_risk_threshold must be between 0 and 100".to_string(),
            ));
        }
        if self.alerts.throttle_hours < 0 || self.alerts.retention_days < 0 {
            return Err(Error::Config(
                "alert throttle and retention must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/habitlens/config.toml` (~/.config/habitlens/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("habitlens").join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    ///
    /// `$XDG_DATA_HOME/habitlens/` (~/.local/share/habitlens/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("habitlens")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/habitlens/` (~/.local/state/habitlens/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("habitlens")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/habitlens/data.db` (~/.local/share/habitlens/data.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("data.db")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/habitlens/habitlens.log` (~/.local/state/habitlens/habitlens.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("habitlens.log")
    }

    /// Set the XDG variables to their defaults when unset, so every
    /// component resolves the same directories.
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
        assert_eq!(config.analysis.suggestion_limit, 5);
        assert_eq!(config.analysis.alert_risk_threshold, 50);
        assert_eq!(config.scheduler.pattern_refresh_minutes, 120);
        assert_eq!(config.scheduler.cleanup_minutes, 60);
        assert_eq!(config.scheduler.prediction_batch_hours, 24);
        assert_eq!(config.scheduler.critical_check_hours, 6);
        assert_eq!(config.alerts.throttle_hours, 24);
        assert_eq!(config.alerts.retention_days, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[analysis]
suggestion_limit = 3

[scheduler]
pattern_refresh_minutes = 30
batch_delay_ms = 0

[alerts]
retention_days = 7

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.analysis.suggestion_limit, 3);
        assert_eq!(config.analysis.alert_risk_threshold, 50);
        assert_eq!(config.scheduler.pattern_refresh_minutes, 30);
        assert_eq!(config.scheduler.batch_delay_ms, 0);
        assert_eq!(config.scheduler.cleanup_minutes, 60);
        assert_eq!(config.alerts.retention_days, 7);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validation_rejects_zero_intervals() {
        let mut config = Config::default();
        config.scheduler.cleanup_minutes = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.analysis.alert_risk_threshold = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[alerts]\nthrottle_hours = 12\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.alerts.throttle_hours, 12);

        std::fs::write(&path, "[scheduler]\npoll_seconds = 0\n").unwrap();
        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }
}
