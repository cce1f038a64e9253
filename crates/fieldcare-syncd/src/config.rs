//! Daemon configuration

use std::path::{Path, PathBuf};

use anyhow::Context;
use fieldcare_core::SyncConfig;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("fieldcare.db")
}

impl Config {
    /// Load from a TOML file, falling back to defaults if it does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            info!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.database.path, PathBuf::from("fieldcare.db"));
        assert_eq!(config.sync, SyncConfig::default());
    }

    #[test]
    fn test_config_with_all_fields() {
        let config = Config::parse(
            r#"
[database]
path = "/var/lib/fieldcare/records.db"

[sync]
endpoint = "https://clinic.example/api/visits"
probe_url = "https://clinic.example/health"
push_timeout_secs = 10
probe_interval_secs = 5
wake_interval_secs = 0
background_tag = "sync-visits"
"#,
        )
        .unwrap();

        assert_eq!(config.database.path, PathBuf::from("/var/lib/fieldcare/records.db"));
        assert_eq!(config.sync.endpoint, "https://clinic.example/api/visits");
        assert_eq!(config.sync.probe_url(), "https://clinic.example/health");
        assert_eq!(config.sync.push_timeout_secs, 10);
        assert_eq!(config.sync.wake_interval(), None);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.database.path, PathBuf::from("fieldcare.db"));
    }

    #[test]
    fn test_invalid_toml_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[sync\nendpoint = ").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
