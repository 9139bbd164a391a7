//! Host configuration, loaded from a TOML file with sensible defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::lifecycle;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Unix socket the service listener binds to.
    pub socket_path: PathBuf,
    /// Root of the durable onboarding containers.
    pub store_dir: PathBuf,
    /// Sharing-token vault shared with client processes.
    pub vault_dir: PathBuf,
    /// Module search root handed to the bus engine.
    pub modules_path: PathBuf,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            socket_path: lifecycle::socket_path(),
            store_dir: lifecycle::store_dir(),
            vault_dir: lifecycle::vault_dir(),
            modules_path: PathBuf::from("."),
        }
    }
}

impl HostConfig {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("busbridge")
            .join("host.toml")
    }

    /// Load from the default config path; absent file means defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("parsing config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn absent_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = HostConfig::load_from(&tmp.path().join("nope.toml")).unwrap();
        assert_eq!(config.modules_path, PathBuf::from("."));
    }

    #[test]
    fn partial_file_overrides_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("host.toml");
        std::fs::write(&path, "socket_path = \"/tmp/custom.sock\"\n").unwrap();

        let config = HostConfig::load_from(&path).unwrap();
        assert_eq!(config.socket_path, PathBuf::from("/tmp/custom.sock"));
        assert_eq!(config.store_dir, lifecycle::store_dir());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("host.toml");
        std::fs::write(&path, "socket_path = [").unwrap();
        assert!(HostConfig::load_from(&path).is_err());
    }
}
