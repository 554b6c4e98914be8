//! Configuration for riplined.
//!
//! Loads settings from /etc/ripline/config.toml or uses defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/ripline/config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiplinedConfig {
    /// Progression database location.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Component catalog snapshot lifetime in seconds.
    #[serde(default = "default_catalog_ttl")]
    pub catalog_ttl_secs: u64,

    /// Emit XP/level-up notifications. Disable for batch backfills.
    #[serde(default = "default_notifications_enabled")]
    pub notifications_enabled: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(crate::store::DB_PATH)
}

fn default_catalog_ttl() -> u64 {
    300
}

fn default_notifications_enabled() -> bool {
    true
}

impl Default for RiplinedConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            catalog_ttl_secs: default_catalog_ttl(),
            notifications_enabled: default_notifications_enabled(),
        }
    }
}

impl RiplinedConfig {
    /// Load from the default path, falling back to defaults when the file
    /// is missing or unreadable.
    pub fn load() -> Self {
        Self::load_from(Path::new(CONFIG_PATH))
    }

    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(raw) => match toml::from_str(&raw) {
                Ok(config) => {
                    info!(path = %path.display(), "loaded config");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "bad config file, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                info!(path = %path.display(), "no config file, using defaults");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = RiplinedConfig::load_from(&dir.path().join("absent.toml"));
        assert_eq!(config.catalog_ttl_secs, 300);
        assert!(config.notifications_enabled);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "catalog_ttl_secs = 60\n").unwrap();
        let config = RiplinedConfig::load_from(&path);
        assert_eq!(config.catalog_ttl_secs, 60);
        assert_eq!(config.db_path, PathBuf::from(crate::store::DB_PATH));
    }

    #[test]
    fn test_bad_file_falls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "catalog_ttl_secs = \"soon\"\n").unwrap();
        let config = RiplinedConfig::load_from(&path);
        assert_eq!(config.catalog_ttl_secs, 300);
    }
}
