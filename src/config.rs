//! Configuration file parser for ~/.config/kantent/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Precedence, lowest to highest: defaults, file, environment
//! (`DATABASE_PATH`, `FEED_FETCH_INTERVAL`), command-line flags.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::scheduler::{SchedulerConfig, DEFAULT_MAX_CONCURRENT_FETCHES, STARTUP_DELAY};

pub const ENV_DATABASE_PATH: &str = "DATABASE_PATH";
pub const ENV_FETCH_INTERVAL: &str = "FEED_FETCH_INTERVAL";

const KNOWN_KEYS: [&str; 3] = [
    "database_path",
    "poll_interval_secs",
    "max_concurrent_fetches",
];

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

// ============================================================================
// Configuration
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite file. `None` means `kantent.db` in the config directory.
    pub database_path: Option<PathBuf>,

    /// Seconds between scheduler ticks.
    pub poll_interval_secs: u64,

    /// Upper bound on fetches running at the same time.
    pub max_concurrent_fetches: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            poll_interval_secs: 1800,
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    /// - Zero interval or concurrency → `Err(ConfigError::Invalid)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!(
            path = %path.display(),
            poll_interval_secs = config.poll_interval_secs,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Apply `DATABASE_PATH` and `FEED_FETCH_INTERVAL` from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides using `lookup` as the environment.
    ///
    /// An unparsable or zero interval is ignored with a warning.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup(ENV_DATABASE_PATH).filter(|p| !p.trim().is_empty()) {
            self.database_path = Some(PathBuf::from(path.trim()));
        }

        if let Some(raw) = lookup(ENV_FETCH_INTERVAL) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.poll_interval_secs = secs,
                _ => tracing::warn!(
                    value = %raw,
                    "Ignoring invalid FEED_FETCH_INTERVAL, expected a positive number of seconds"
                ),
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "poll_interval_secs",
                reason: "must be at least 1 second".into(),
            });
        }
        if self.max_concurrent_fetches == 0 {
            return Err(ConfigError::Invalid {
                key: "max_concurrent_fetches",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Resolve the database file, defaulting to `kantent.db` inside `config_dir`.
    pub fn database_path_or(&self, config_dir: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| config_dir.join("kantent.db"))
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            interval: Duration::from_secs(self.poll_interval_secs),
            startup_delay: STARTUP_DELAY,
            max_concurrent_fetches: self.max_concurrent_fetches,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn write_config(name: &str, content: &str) -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!("kantent_config_test_{name}"));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.database_path.is_none());
        assert_eq!(config.poll_interval_secs, 1800);
        assert_eq!(config.max_concurrent_fetches, 10);
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/kantent_test_nonexistent_config.toml");
        assert_eq!(Config::load(path).unwrap(), Config::default());
    }

    #[test]
    fn test_empty_file_returns_default() {
        let (dir, path) = write_config("empty", "   \n  \n");
        assert_eq!(Config::load(&path).unwrap(), Config::default());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_config() {
        let (dir, path) = write_config(
            "full",
            r#"
database_path = "/var/lib/kantent/feeds.db"
poll_interval_secs = 600
max_concurrent_fetches = 4
"#,
        );

        assert_eq!(
            Config::load(&path).unwrap(),
            Config {
                database_path: Some(PathBuf::from("/var/lib/kantent/feeds.db")),
                poll_interval_secs: 600,
                max_concurrent_fetches: 4,
            }
        );
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let (dir, path) = write_config("partial", "poll_interval_secs = 60\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.poll_interval_secs, 60);
        assert_eq!(config.max_concurrent_fetches, 10);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let (dir, path) = write_config("invalid", "this is not [valid toml");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let (dir, path) = write_config("unknown", "theme = \"dark\"\npoll_interval_secs = 5\n");
        assert_eq!(Config::load(&path).unwrap().poll_interval_secs, 5);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_zero_interval_rejected() {
        let (dir, path) = write_config("zero", "poll_interval_secs = 0\n");
        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::Invalid { key: "poll_interval_secs", .. })
        ));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_too_large_file_rejected() {
        let (dir, path) = write_config("too_large", &"a".repeat(1_048_577));
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_DATABASE_PATH, "/data/kantent.db"),
            (ENV_FETCH_INTERVAL, "120"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env_from(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.database_path, Some(PathBuf::from("/data/kantent.db")));
        assert_eq!(config.poll_interval_secs, 120);
    }

    #[test]
    fn test_invalid_env_interval_ignored() {
        for bad in ["soon", "0", "-5", ""] {
            let mut config = Config::default();
            config.apply_env_from(|k| (k == ENV_FETCH_INTERVAL).then(|| bad.to_string()));
            assert_eq!(config.poll_interval_secs, 1800, "value {bad:?}");
        }
    }

    #[test]
    fn test_database_path_default_location() {
        let config = Config::default();
        assert_eq!(
            config.database_path_or(Path::new("/home/u/.config/kantent")),
            PathBuf::from("/home/u/.config/kantent/kantent.db")
        );
    }

    #[test]
    fn test_scheduler_config() {
        let config = Config {
            poll_interval_secs: 90,
            max_concurrent_fetches: 3,
            ..Config::default()
        };
        let sched = config.scheduler_config();
        assert_eq!(sched.interval, Duration::from_secs(90));
        assert_eq!(sched.startup_delay, STARTUP_DELAY);
        assert_eq!(sched.max_concurrent_fetches, 3);
    }
}
