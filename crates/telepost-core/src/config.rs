//! Telepost configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, TelepostError};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelepostConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
}

impl TelepostConfig {
    /// Load config from the default path (~/.telepost/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TelepostError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| TelepostError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| TelepostError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Telepost home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".telepost")
    }

    /// Resolved ledger database path.
    pub fn database_path(&self) -> PathBuf {
        if self.database.path.is_empty() {
            Self::home_dir().join("telepost.db")
        } else {
            PathBuf::from(&self.database.path)
        }
    }
}

/// Ledger database location.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DatabaseConfig {
    /// SQLite file path. Empty means ~/.telepost/telepost.db.
    #[serde(default)]
    pub path: String,
}

/// Dispatch loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Suppress the worker entirely (read replicas, test environments).
    #[serde(default)]
    pub disabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Fixed backoff added to ready_at after a transient failure.
    #[serde(default = "default_retry_minutes")]
    pub retry_minutes: i64,
    /// Upper bound for one delivery port call.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
}

fn default_interval_secs() -> u64 {
    20
}
fn default_max_attempts() -> u32 {
    5
}
fn default_retry_minutes() -> i64 {
    30
}
fn default_send_timeout_secs() -> u64 {
    20
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            interval_secs: default_interval_secs(),
            max_attempts: default_max_attempts(),
            retry_minutes: default_retry_minutes(),
            send_timeout_secs: default_send_timeout_secs(),
        }
    }
}

/// Content policy limits fed to the validation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    #[serde(default = "default_max_media")]
    pub max_media: usize,
    #[serde(default = "default_max_links")]
    pub max_links: usize,
}

fn default_max_length() -> usize {
    4096
}
fn default_max_media() -> usize {
    10
}
fn default_max_links() -> usize {
    10
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_length: default_max_length(),
            max_media: default_max_media(),
            max_links: default_max_links(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TelepostConfig::default();
        assert!(!config.scheduler.disabled);
        assert_eq!(config.scheduler.interval_secs, 20);
        assert_eq!(config.scheduler.max_attempts, 5);
        assert_eq!(config.scheduler.retry_minutes, 30);
        assert_eq!(config.policy.max_length, 4096);
        assert_eq!(config.policy.max_media, 10);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: TelepostConfig = toml::from_str(
            r#"
            [scheduler]
            disabled = true
            interval_secs = 5
            "#,
        )
        .unwrap();
        assert!(config.scheduler.disabled);
        assert_eq!(config.scheduler.interval_secs, 5);
        // untouched sections keep their defaults
        assert_eq!(config.scheduler.max_attempts, 5);
        assert_eq!(config.policy.max_links, 10);
    }

    #[test]
    fn test_database_path_fallback() {
        let config = TelepostConfig::default();
        assert!(config.database_path().ends_with("telepost.db"));

        let config = TelepostConfig {
            database: DatabaseConfig {
                path: "/tmp/custom.db".into(),
            },
            ..Default::default()
        };
        assert_eq!(config.database_path(), PathBuf::from("/tmp/custom.db"));
    }
}
