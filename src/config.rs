//! Configuration module for the directory watcher.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `DIRWATCH_` and use double underscores
//! to separate nested levels:
//! - `DIRWATCH_LOGGING__DEFAULT=debug` sets `logging.default`
//! - `DIRWATCH_WATCHER__ROOTS=[...]` sets `watcher.roots`
//!
//! The debounce period is intentionally absent: it is fixed at
//! [`DEBOUNCE_PERIOD`](crate::watcher::DEBOUNCE_PERIOD).

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const CONFIG_DIR: &str = ".dirwatch";
const CONFIG_FILE: &str = "settings.toml";
const ENV_PREFIX: &str = "DIRWATCH_";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Watcher configuration
    #[serde(default)]
    pub watcher: WatcherConfig,
}

/// Log levels for the `tracing` subscriber installed by [`crate::logging`].
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level for every target ("error", "warn", "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `watcher = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct WatcherConfig {
    /// Root directories to watch recursively. Relative entries are ignored.
    #[serde(default)]
    pub roots: Vec<PathBuf>,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));

        Self::figment(config_path).extract().map_err(Box::new)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref().to_path_buf())
            .extract()
            .map_err(Box::new)
    }

    fn figment(config_path: PathBuf) -> Figment {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(config_path))
            // Double underscore (__) separates nested levels
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Find the settings file by looking for a `.dirwatch` directory
    /// from the current directory up to the filesystem root.
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .map(|ancestor| ancestor.join(CONFIG_DIR))
            .find(|dir| dir.is_dir())
            .map(|dir| dir.join(CONFIG_FILE))
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.logging.default, "warn");
        assert!(settings.logging.modules.is_empty());
        assert!(settings.watcher.roots.is_empty());
    }

    #[test]
    fn test_save_and_load_from() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(".dirwatch").join("settings.toml");

        let mut settings = Settings::default();
        settings.logging.default = "debug".to_string();
        settings
            .logging
            .modules
            .insert("watcher".to_string(), "trace".to_string());
        settings.watcher.roots = vec![PathBuf::from("/opt/search/lib")];

        settings.save(&config_path).unwrap();
        let loaded = Settings::load_from(&config_path).unwrap();

        assert_eq!(loaded.logging.default, "debug");
        assert_eq!(loaded.logging.modules.get("watcher").unwrap(), "trace");
        assert_eq!(loaded.watcher.roots, vec![PathBuf::from("/opt/search/lib")]);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");
        std::fs::write(&config_path, "[watcher]\nroots = [\"/srv/a\", \"rel/b\"]\n").unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();

        assert_eq!(loaded.logging.default, "warn");
        assert_eq!(
            loaded.watcher.roots,
            vec![PathBuf::from("/srv/a"), PathBuf::from("rel/b")]
        );
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let loaded = Settings::load_from(temp_dir.path().join("absent.toml")).unwrap();
        assert!(loaded.watcher.roots.is_empty());
    }
}
