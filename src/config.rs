use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::archive::{BACKUP_DIR_NAME, DEFAULT_MAX_BACKUPS};
use crate::bus::{BusOptions, OverflowPolicy, DEFAULT_HANDLER_TIMEOUT, DEFAULT_QUEUE_CAPACITY};

pub const ENV_DATA_DIR: &str = "TIMELINE_DATA_DIR";
pub const ENV_MAX_BACKUPS: &str = "TIMELINE_MAX_BACKUPS";
pub const ENV_QUEUE_CAPACITY: &str = "TIMELINE_QUEUE_CAPACITY";
pub const ENV_HANDLER_TIMEOUT_MS: &str = "TIMELINE_HANDLER_TIMEOUT_MS";
pub const ENV_AUTO_ARCHIVE_SECS: &str = "TIMELINE_AUTO_ARCHIVE_SECS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },
    #[error("invalid config field {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineConfig {
    /// Root for everything the pipeline writes; backups go in
    /// `<data_dir>/timeline_backups`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,
    /// `null` for an unbounded queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: Option<usize>,
    #[serde(default)]
    pub overflow: OverflowPolicy,
    #[serde(default = "default_handler_timeout_ms")]
    pub handler_timeout_ms: u64,
    #[serde(default = "default_true")]
    pub report_handler_failures: bool,
    /// Archive the timeline on this cadence. `null` leaves archiving to
    /// explicit `reset` calls.
    #[serde(default)]
    pub auto_archive_secs: Option<u64>,
    #[serde(default = "default_true")]
    pub archive_on_shutdown: bool,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_backups: default_max_backups(),
            queue_capacity: default_queue_capacity(),
            overflow: OverflowPolicy::default(),
            handler_timeout_ms: default_handler_timeout_ms(),
            report_handler_failures: true,
            auto_archive_secs: None,
            archive_on_shutdown: true,
        }
    }
}

impl TimelineConfig {
    /// Load a JSON config file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by the process environment (and `.env`, if any).
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `TIMELINE_*` overrides read through `lookup`.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(dir) = get(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(raw) = get(ENV_MAX_BACKUPS) {
            self.max_backups = parse_env(ENV_MAX_BACKUPS, &raw)?;
        }
        if let Some(raw) = get(ENV_QUEUE_CAPACITY) {
            self.queue_capacity = match raw.to_ascii_lowercase().as_str() {
                "0" | "none" | "unbounded" => None,
                _ => Some(parse_env(ENV_QUEUE_CAPACITY, &raw)?),
            };
        }
        if let Some(raw) = get(ENV_HANDLER_TIMEOUT_MS) {
            self.handler_timeout_ms = parse_env(ENV_HANDLER_TIMEOUT_MS, &raw)?;
        }
        if let Some(raw) = get(ENV_AUTO_ARCHIVE_SECS) {
            let secs: u64 = parse_env(ENV_AUTO_ARCHIVE_SECS, &raw)?;
            self.auto_archive_secs = (secs > 0).then_some(secs);
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject settings that would silently change behaviour downstream.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_backups == 0 {
            return Err(ConfigError::Invalid {
                field: "max_backups",
                reason: "at least one backup must be kept".to_string(),
            });
        }
        Ok(())
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.data_dir.join(BACKUP_DIR_NAME)
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }

    pub fn auto_archive_interval(&self) -> Option<Duration> {
        self.auto_archive_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn bus_options(&self) -> BusOptions {
        BusOptions {
            capacity: self.queue_capacity,
            overflow: self.overflow,
            handler_timeout: self.handler_timeout(),
            report_handler_failures: self.report_handler_failures,
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidEnv {
        key,
        value: raw.to_string(),
    })
}

fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(ENV_DATA_DIR) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(app_data) = std::env::var("APPDATA") {
            return PathBuf::from(app_data).join("AgentTimeline");
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".agent-timeline");
    }

    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".agent-timeline");
    }

    PathBuf::from(".agent-timeline")
}

fn default_max_backups() -> usize {
    DEFAULT_MAX_BACKUPS
}

fn default_queue_capacity() -> Option<usize> {
    Some(DEFAULT_QUEUE_CAPACITY)
}

fn default_handler_timeout_ms() -> u64 {
    DEFAULT_HANDLER_TIMEOUT.as_millis() as u64
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio_test::{assert_err, assert_ok};

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn empty_json_takes_defaults() {
        let cfg: TimelineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.max_backups, 10);
        assert_eq!(cfg.queue_capacity, Some(DEFAULT_QUEUE_CAPACITY));
        assert_eq!(cfg.overflow, OverflowPolicy::DropOldest);
        assert_eq!(cfg.handler_timeout(), Duration::from_secs(30));
        assert!(cfg.report_handler_failures);
        assert_eq!(cfg.auto_archive_interval(), None);
    }

    #[test]
    fn parses_overflow_policy_in_kebab_case() {
        let cfg: TimelineConfig =
            serde_json::from_str(r#"{"overflow": "drop-newest", "queue_capacity": null}"#).unwrap();
        assert_eq!(cfg.overflow, OverflowPolicy::DropNewest);
        assert_eq!(cfg.queue_capacity, None);
    }

    #[test]
    fn env_overrides_apply() {
        let cfg = TimelineConfig::default()
            .with_overrides(lookup(&[
                (ENV_DATA_DIR, "/srv/timeline"),
                (ENV_MAX_BACKUPS, "3"),
                (ENV_QUEUE_CAPACITY, "unbounded"),
                (ENV_HANDLER_TIMEOUT_MS, "250"),
                (ENV_AUTO_ARCHIVE_SECS, "60"),
            ]))
            .unwrap();
        assert_eq!(cfg.backup_dir(), PathBuf::from("/srv/timeline").join(BACKUP_DIR_NAME));
        assert_eq!(cfg.max_backups, 3);
        assert_eq!(cfg.queue_capacity, None);
        assert_eq!(cfg.handler_timeout(), Duration::from_millis(250));
        assert_eq!(cfg.auto_archive_interval(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn rejects_garbage_env_values() {
        let err = assert_err!(
            TimelineConfig::default().with_overrides(lookup(&[(ENV_MAX_BACKUPS, "ten")]))
        );
        assert!(matches!(err, ConfigError::InvalidEnv { key: ENV_MAX_BACKUPS, .. }));
    }

    #[test]
    fn load_reads_json_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("timeline.json");
        std::fs::write(&path, r#"{"data_dir": "/data", "max_backups": 4}"#).unwrap();

        let cfg = assert_ok!(TimelineConfig::load(&path));
        assert_eq!(cfg.data_dir, PathBuf::from("/data"));
        assert_eq!(cfg.max_backups, 4);
    }

    #[test]
    fn zero_max_backups_is_rejected() {
        let err = assert_err!(
            TimelineConfig::default().with_overrides(lookup(&[(ENV_MAX_BACKUPS, "0")]))
        );
        assert!(matches!(err, ConfigError::Invalid { field: "max_backups", .. }));

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("timeline.json");
        std::fs::write(&path, r#"{"max_backups": 0}"#).unwrap();
        let err = assert_err!(TimelineConfig::load(&path));
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = assert_err!(TimelineConfig::load("/definitely/not/here.json"));
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
