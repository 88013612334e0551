//! CLI configuration.
//!
//! Configuration is stored as TOML:
//! - Linux/macOS: `~/.config/filedrop/filedrop.toml`
//! - Windows: `%APPDATA%/filedrop/filedrop.toml`
//!
//! A missing default file means built-in defaults. A file passed with
//! `--config` must exist.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use filedrop_transfer::DEFAULT_CHUNK_SIZE;
use serde::{Deserialize, Serialize};

/// filedrop configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Sender chunk size in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Directory the receiver writes into.
    #[serde(default = "default_destination_dir")]
    pub destination_dir: PathBuf,

    /// Minimum interval between progress log lines, in milliseconds.
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_destination_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_progress_interval_ms() -> u64 {
    500
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            destination_dir: default_destination_dir(),
            progress_interval_ms: default_progress_interval_ms(),
        }
    }
}

impl Config {
    /// Loads `explicit` if given, else the default path if present, else
    /// defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let path = config_path();
        if path.exists() {
            Self::from_file(&path)
        } else {
            tracing::debug!(path = %path.display(), "no configuration file, using defaults");
            Ok(Self::default())
        }
    }

    /// Parses the TOML file at `path`.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("invalid config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("filedrop").join("filedrop.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("filedrop")
            .join("filedrop.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.destination_dir, PathBuf::from("."));
        assert_eq!(config.progress_interval(), Duration::from_millis(500));
    }

    #[test]
    fn config_partial_toml() {
        // Only chunk_size given, rest should use defaults.
        let config: Config = toml::from_str("chunk_size = 65536").unwrap();
        assert_eq!(config.chunk_size, 65536);
        assert_eq!(config.destination_dir, PathBuf::from("."));
        assert_eq!(config.progress_interval_ms, 500);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = Config {
            chunk_size: 1024,
            destination_dir: PathBuf::from("/srv/inbox"),
            progress_interval_ms: 100,
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn explicit_file_is_loaded() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("filedrop.toml");
        std::fs::write(&path, "destination_dir = \"downloads\"\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.destination_dir, PathBuf::from("downloads"));
        assert_eq!(config.chunk_size, 4096);
    }

    #[test]
    fn explicit_file_must_exist() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&tmp.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.toml");
        std::fs::write(&path, "chunk_size = \"big\"").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("invalid config"));
    }

    #[test]
    fn config_path_not_empty() {
        let path = config_path();
        assert!(path.to_string_lossy().contains("filedrop"));
    }
}
