//! Configuration handling for claycli
//!
//! Configuration is stored in `<config_dir>/claycli/config.toml`, or wherever
//! `CLAYCLI_CONFIG` points. It holds API key and site aliases so commands can
//! say `--key prod` instead of pasting the key.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::remote::DEFAULT_CONCURRENCY;

/// Overrides the config file location
pub const CONFIG_ENV: &str = "CLAYCLI_CONFIG";
/// Key used when no `--key` is given
pub const DEFAULT_KEY_ENV: &str = "CLAYCLI_DEFAULT_KEY";
/// Site used when no site is given
pub const DEFAULT_URL_ENV: &str = "CLAYCLI_DEFAULT_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Which alias table an entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasKind {
    Key,
    Site,
}

impl AliasKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AliasKind::Key => "key",
            AliasKind::Site => "site",
        }
    }
}

/// Contents of `config.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClayConfig {
    /// Simultaneous requests per operation
    pub concurrency: usize,

    /// API key aliases
    pub keys: BTreeMap<String, String>,

    /// Site prefix aliases
    pub sites: BTreeMap<String, String>,
}

impl Default for ClayConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            keys: BTreeMap::new(),
            sites: BTreeMap::new(),
        }
    }
}

/// Loaded configuration and where it lives
#[derive(Debug, Clone)]
pub struct Config {
    pub clay: ClayConfig,
    pub path: Option<PathBuf>,
}

impl Config {
    /// Loads configuration from `CLAYCLI_CONFIG` or the default location
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self {
                clay: ClayConfig::default(),
                path: None,
            }),
        }
    }

    /// Loads configuration from a specific file; a missing file means defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        let clay = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;

            toml::from_str(&content)
                .map_err(|e| ConfigError::Parse(e.to_string()))
                .with_context(|| format!("Failed to parse config: {}", path.display()))?
        } else {
            ClayConfig::default()
        };

        if clay.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".to_string()).into());
        }

        Ok(Self {
            clay,
            path: Some(path.to_path_buf()),
        })
    }

    /// Returns the config file path
    pub fn config_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }

        ProjectDirs::from("", "", "claycli").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Resolves an API key: alias, literal value, then `CLAYCLI_DEFAULT_KEY`
    pub fn key(&self, alias_or_value: Option<&str>) -> Option<String> {
        resolve(&self.clay.keys, alias_or_value, DEFAULT_KEY_ENV)
    }

    /// Resolves a site: alias, literal value, then `CLAYCLI_DEFAULT_URL`
    pub fn site(&self, alias_or_value: Option<&str>) -> Option<String> {
        resolve(&self.clay.sites, alias_or_value, DEFAULT_URL_ENV)
    }

    pub fn set(&mut self, kind: AliasKind, alias: &str, value: &str) -> Result<()> {
        if alias.trim().is_empty() {
            return Err(ConfigError::Invalid(format!("{} alias cannot be empty", kind.as_str())).into());
        }

        let table = match kind {
            AliasKind::Key => &mut self.clay.keys,
            AliasKind::Site => &mut self.clay.sites,
        };
        table.insert(alias.to_string(), value.to_string());
        Ok(())
    }

    /// Saves the configuration (whole-file rewrite under an exclusive lock)
    pub fn save(&self) -> Result<()> {
        let path = self
            .path
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(&self.clay).context("Failed to serialize config")?;
        let temp_path = path.with_extension("toml.tmp");

        {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

            file.lock_exclusive()
                .context("Failed to acquire write lock on config")?;

            let mut writer = &file;
            writer
                .write_all(content.as_bytes())
                .context("Failed to write config")?;
            writer.flush().context("Failed to flush config")?;
        }

        fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to write config: {}", path.display()))
    }
}

fn resolve(
    table: &BTreeMap<String, String>,
    alias_or_value: Option<&str>,
    env: &str,
) -> Option<String> {
    match alias_or_value.map(str::trim).filter(|s| !s.is_empty()) {
        Some(given) => Some(table.get(given).cloned().unwrap_or_else(|| given.to_string())),
        None => std::env::var(env).ok().filter(|v| !v.trim().is_empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config() {
        let config = ClayConfig::default();
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
        assert!(config.keys.is_empty());
    }

    #[test]
    fn parse_config() {
        let toml = r#"
concurrency = 4

[keys]
prod = "abc123"

[sites]
local = "http://localhost.example.com"
"#;

        let config: ClayConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.keys["prod"], "abc123");
        assert_eq!(config.sites["local"], "http://localhost.example.com");
    }

    #[test]
    fn aliases_resolve_and_literals_pass_through() {
        let mut config = Config {
            clay: ClayConfig::default(),
            path: None,
        };
        config.set(AliasKind::Key, "prod", "abc123").unwrap();
        config.set(AliasKind::Site, "local", "http://localhost").unwrap();

        assert_eq!(config.key(Some("prod")), Some("abc123".to_string()));
        assert_eq!(config.key(Some("literal-key")), Some("literal-key".to_string()));
        assert_eq!(config.site(Some("local")), Some("http://localhost".to_string()));
        assert!(config.set(AliasKind::Key, " ", "x").is_err());
    }

    #[test]
    fn save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::load_from(&path).unwrap();
        assert_eq!(config.clay, ClayConfig::default());

        config.set(AliasKind::Site, "prod", "https://d.com").unwrap();
        config.save().unwrap();

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.clay.sites["prod"], "https://d.com");
        assert!(!path.with_extension("toml.tmp").exists());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        fs::write(&path, "concurrency = \"many\"").unwrap();
        assert!(Config::load_from(&path).is_err());

        fs::write(&path, "concurrency = 0").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
