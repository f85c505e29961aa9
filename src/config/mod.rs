//! Process Settings
//!
//! Operator-level settings loaded from a JSON5 file: where state lives,
//! logging, and engine tuning. These are distinct from the autoresponder
//! configuration the owner edits through commands, which lives in the state
//! directory.
//!
//! Lookup order for the file: `--config`, then `AUTORESPONDER_CONFIG_PATH`,
//! then `<config dir>/autoresponder/config.json5`. A missing file means
//! defaults.

use crate::autoreply::{EngineOptions, ResetScope};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_PATH_ENV: &str = "AUTORESPONDER_CONFIG_PATH";
pub const STATE_DIR_ENV: &str = "AUTORESPONDER_STATE_DIR";
pub const LOG_LEVEL_ENV: &str = "AUTORESPONDER_LOG_LEVEL";

const MAX_REPLY_INTERVAL_SECS: u64 = 30 * 86_400;
const MAX_RESET_CONFIRM_SECS: u64 = 86_400;

/// Settings loading errors
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogSettings {
    /// Log level (error, warn, info, debug, trace) or a full filter directive
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Engine tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    /// Minimum seconds between two replies to one chat, whatever the frequency
    pub min_reply_interval_secs: u64,
    /// Seconds a `/reset` waits for `/confirmreset`
    pub reset_confirm_secs: u64,
    /// Switching the autoresponder off drops replies still waiting on their delay
    pub cancel_pending_on_disable: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            min_reply_interval_secs: 10,
            reset_confirm_secs: 60,
            cancel_pending_on_disable: false,
        }
    }
}

/// What `/confirmreset` wipes besides the configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResetSettings {
    pub clear_templates: bool,
    pub clear_statistics: bool,
}

/// Root settings structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Directory holding the persisted autoresponder state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
    pub log: LogSettings,
    pub engine: EngineSettings,
    pub reset: ResetSettings,
}

impl Settings {
    /// Apply environment overrides using `lookup` to read variables
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(STATE_DIR_ENV).filter(|v| !v.trim().is_empty()) {
            self.state_dir = Some(PathBuf::from(dir));
        }
        if let Some(level) = lookup(LOG_LEVEL_ENV).filter(|v| !v.trim().is_empty()) {
            self.log.level = level;
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.engine.min_reply_interval_secs > MAX_REPLY_INTERVAL_SECS {
            return Err(SettingsError::Invalid(format!(
                "engine.minReplyIntervalSecs must be at most {}",
                MAX_REPLY_INTERVAL_SECS
            )));
        }
        if self.engine.reset_confirm_secs == 0
            || self.engine.reset_confirm_secs > MAX_RESET_CONFIRM_SECS
        {
            return Err(SettingsError::Invalid(format!(
                "engine.resetConfirmSecs must be between 1 and {}",
                MAX_RESET_CONFIRM_SECS
            )));
        }
        Ok(())
    }

    /// State directory, falling back to the platform data directory
    pub fn resolve_state_dir(&self) -> PathBuf {
        if let Some(dir) = &self.state_dir {
            return dir.clone();
        }
        dirs::data_dir()
            .map(|d| d.join("autoresponder"))
            .unwrap_or_else(|| PathBuf::from(".autoresponder"))
    }

    /// Engine options derived from these settings
    pub fn engine_options(&self) -> EngineOptions {
        let interval = self.engine.min_reply_interval_secs.min(MAX_REPLY_INTERVAL_SECS) as i64;
        let confirm = self.engine.reset_confirm_secs.min(MAX_RESET_CONFIRM_SECS) as i64;
        EngineOptions::default()
            .with_min_reply_interval(chrono::Duration::seconds(interval))
            .with_reset_confirm_window(chrono::Duration::seconds(confirm))
            .with_cancel_pending_on_disable(self.engine.cancel_pending_on_disable)
            .with_reset_scope(ResetScope {
                clear_templates: self.reset.clear_templates,
                clear_statistics: self.reset.clear_statistics,
            })
    }
}

/// Default settings file path
pub fn get_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("autoresponder")
        .join("config.json5")
}

/// Parse settings from JSON5 text without environment overrides
pub fn parse_settings(raw: &str, path: &Path) -> Result<Settings, SettingsError> {
    let settings: Settings = json5::from_str(raw).map_err(|e| SettingsError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    settings.validate()?;
    Ok(settings)
}

/// Load settings from `path`, apply environment overrides and validate
pub fn load_settings(path: &Path) -> Result<Settings, SettingsError> {
    let mut settings = match std::fs::read_to_string(path) {
        Ok(raw) => parse_settings(&raw, path)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "settings file not found, using defaults");
            Settings::default()
        }
        Err(source) => {
            return Err(SettingsError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    settings.apply_overrides(|key| std::env::var(key).ok());
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.log.level, "info");
        assert_eq!(settings.engine.min_reply_interval_secs, 10);
        let options = settings.engine_options();
        assert_eq!(options.min_reply_interval, chrono::Duration::seconds(10));
        assert_eq!(options.reset_confirm_window, chrono::Duration::seconds(60));
        assert!(!options.reset_scope.clear_templates);
        assert!(!options.cancel_pending_on_disable);
    }

    #[test]
    fn test_parse_json5_with_comments() {
        let raw = r#"{
            // where state lives
            stateDir: "/var/lib/autoresponder",
            log: { level: "debug", format: "json" },
            engine: { minReplyIntervalSecs: 0, cancelPendingOnDisable: true },
            reset: { clearTemplates: true },
        }"#;
        let settings = parse_settings(raw, Path::new("test.json5")).unwrap();
        assert_eq!(
            settings.state_dir,
            Some(PathBuf::from("/var/lib/autoresponder"))
        );
        assert_eq!(settings.log.format, LogFormat::Json);
        assert_eq!(settings.engine.reset_confirm_secs, 60);
        let options = settings.engine_options();
        assert_eq!(options.min_reply_interval, chrono::Duration::zero());
        assert!(options.cancel_pending_on_disable);
        assert!(options.reset_scope.clear_templates);
        assert!(!options.reset_scope.clear_statistics);
    }

    #[test]
    fn test_parse_error_names_file() {
        let err = parse_settings("{ log: ", Path::new("broken.json5")).unwrap_err();
        assert!(matches!(err, SettingsError::Parse { .. }));
        assert!(err.to_string().contains("broken.json5"));
    }

    #[test]
    fn test_invalid_reset_window_rejected() {
        let err = parse_settings("{ engine: { resetConfirmSecs: 0 } }", Path::new("x")).unwrap_err();
        assert!(matches!(err, SettingsError::Invalid(_)));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (STATE_DIR_ENV, "/tmp/state"),
            (LOG_LEVEL_ENV, "trace"),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        settings.apply_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(settings.resolve_state_dir(), PathBuf::from("/tmp/state"));
        assert_eq!(settings.log.level, "trace");
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = load_settings(&dir.path().join("absent.json5")).unwrap();
        assert_eq!(settings.engine, EngineSettings::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json5");
        std::fs::write(&path, "{ engine: { resetConfirmSecs: 120 } }").unwrap();
        let settings = load_settings(&path).unwrap();
        assert_eq!(settings.engine.reset_confirm_secs, 120);
    }
}
