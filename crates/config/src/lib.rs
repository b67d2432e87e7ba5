//! Configuration loading for Mailbuddy services
//!
//! Provides utilities for loading configuration files from the shared
//! Mailbuddy config directory (~/.config/mailbuddy/ by default, overridable
//! with the MAILBUDDY_CONFIG_DIR environment variable).
//!
//! Call [`init`] at application startup to bootstrap the config directory.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Environment variable overriding the config directory location
const CONFIG_DIR_ENV: &str = "MAILBUDDY_CONFIG_DIR";

/// Initialize the Mailbuddy config directory.
///
/// Creates the directory if it doesn't exist.
/// Call this once at application startup.
pub fn init() -> Result<PathBuf> {
    ensure_config_dir()
}

/// Get the Mailbuddy config directory.
///
/// Honors MAILBUDDY_CONFIG_DIR if set, otherwise ~/.config/mailbuddy/.
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|p| p.join("mailbuddy"))
}

/// Get the path to a config file within the Mailbuddy config directory
pub fn config_path(filename: &str) -> Option<PathBuf> {
    config_dir().map(|p| p.join(filename))
}

/// Load and parse a JSON config file from the Mailbuddy config directory
pub fn load_json<T: DeserializeOwned>(filename: &str) -> Result<T> {
    let path = config_path(filename).context("Could not determine config directory")?;
    load_json_file(&path)
}

/// Load a JSON config file, falling back to `T::default()` if it is missing.
///
/// A file that exists but fails to parse is still an error; silently
/// replacing a corrupt config with defaults would mask user mistakes.
pub fn load_json_or_default<T: DeserializeOwned + Default>(filename: &str) -> Result<T> {
    if config_exists(filename) {
        load_json(filename)
    } else {
        Ok(T::default())
    }
}

/// Load and parse a JSON file from an arbitrary path
pub fn load_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Check if a config file exists in the Mailbuddy config directory
pub fn config_exists(filename: &str) -> bool {
    config_path(filename).is_some_and(|p| p.exists())
}

/// Ensure the Mailbuddy config directory exists
pub fn ensure_config_dir() -> Result<PathBuf> {
    let dir = config_dir().context("Could not determine config directory")?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
    Ok(dir)
}

/// Save a value as JSON to a config file in the Mailbuddy config directory
pub fn save_json<T: serde::Serialize>(filename: &str, value: &T) -> Result<()> {
    let dir = ensure_config_dir()?;
    let path = dir.join(filename);
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Sample {
        count: u32,
    }

    #[test]
    fn test_config_path_under_dir() {
        let dir = config_dir().unwrap();
        let path = config_path("test.json").unwrap();
        assert!(path.starts_with(dir));
        assert!(path.ends_with("test.json"));
    }

    #[test]
    fn test_load_json_or_default_missing_file() {
        let value: Sample = load_json_or_default("does-not-exist.json").unwrap();
        assert_eq!(value, Sample::default());
    }

    #[test]
    fn test_load_json_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.json");
        std::fs::write(&path, r#"{"count": 7}"#).unwrap();
        let value: Sample = load_json_file(&path).unwrap();
        assert_eq!(value.count, 7);
    }

    #[test]
    fn test_load_json_file_rejects_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_json_file::<Sample>(&path).is_err());
    }
}
