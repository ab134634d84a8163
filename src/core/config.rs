//! Configuration management with layered hierarchy

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::Workspace;

/// Default lifetime of a signed preview URL
pub const DEFAULT_PREVIEW_TTL_SECS: u64 = 3600;

/// Ironworks configuration with layered hierarchy
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Email of the acting user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Current company id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,

    /// Default output format
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_format: Option<String>,

    /// Lifetime of signed preview URLs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_ttl_secs: Option<u64>,
}

/// Keys accepted by `iw config get/set`
pub const CONFIG_KEYS: &[&str] = &["user", "company", "default_format", "preview_ttl_secs"];

impl Config {
    /// Load configuration from all sources, merging in priority order
    pub fn load(workspace: Option<&Workspace>) -> Self {
        let mut config = Config::default();

        // 1. Built-in defaults (already in Default impl)

        // 2. Global user config (~/.config/ironworks/config.yaml)
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global) = Self::read_file(&global_path) {
                config.merge(global);
            }
        }

        // 3. Workspace config (.iw/config.yaml)
        if let Some(ws) = workspace {
            if let Some(local) = Self::read_file(&ws.config_path()) {
                config.merge(local);
            }
        }

        // 4. Environment variables
        if let Ok(user) = std::env::var("IW_USER") {
            config.user = Some(user);
        }
        if let Ok(company) = std::env::var("IW_COMPANY") {
            config.company = Some(company);
        }
        if let Ok(format) = std::env::var("IW_FORMAT") {
            config.default_format = Some(format);
        }

        config
    }

    fn read_file(path: &Path) -> Option<Config> {
        if !path.exists() {
            return None;
        }
        let contents = std::fs::read_to_string(path).ok()?;
        let has_values = contents
            .lines()
            .any(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'));
        if !has_values {
            return Some(Config::default());
        }
        match serde_yml::from_str::<Config>(&contents) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config");
                None
            }
        }
    }

    /// Get the path to the global config file
    fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "ironworks")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Merge another config into this one (other takes precedence)
    fn merge(&mut self, other: Config) {
        if other.user.is_some() {
            self.user = other.user;
        }
        if other.company.is_some() {
            self.company = other.company;
        }
        if other.default_format.is_some() {
            self.default_format = other.default_format;
        }
        if other.preview_ttl_secs.is_some() {
            self.preview_ttl_secs = other.preview_ttl_secs;
        }
    }

    pub fn preview_ttl_secs(&self) -> u64 {
        self.preview_ttl_secs.unwrap_or(DEFAULT_PREVIEW_TTL_SECS)
    }

    /// Read a single key as display text
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "user" => self.user.clone(),
            "company" => self.company.clone(),
            "default_format" => self.default_format.clone(),
            "preview_ttl_secs" => self.preview_ttl_secs.map(|v| v.to_string()),
            _ => None,
        }
    }

    /// Update a single key. An empty value clears it.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        let value = value.trim();
        let opt = (!value.is_empty()).then(|| value.to_string());
        match key {
            "user" => self.user = opt.map(|v| v.to_lowercase()),
            "company" => self.company = opt,
            "default_format" => self.default_format = opt,
            "preview_ttl_secs" => {
                self.preview_ttl_secs = match opt {
                    Some(v) => Some(
                        v.parse()
                            .map_err(|_| format!("preview_ttl_secs must be a number, got '{}'", v))?,
                    ),
                    None => None,
                }
            }
            _ => {
                return Err(format!(
                    "unknown config key '{}' (valid: {})",
                    key,
                    CONFIG_KEYS.join(", ")
                ))
            }
        }
        Ok(())
    }

    /// Load only the workspace layer, for editing
    pub fn load_workspace_file(workspace: &Workspace) -> Self {
        Self::read_file(&workspace.config_path()).unwrap_or_default()
    }

    /// Write this config as the workspace layer
    pub fn save_workspace_file(&self, workspace: &Workspace) -> std::io::Result<()> {
        let contents = serde_yml::to_string(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(workspace.config_path(), contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_merge_prefers_other() {
        let mut base = Config {
            user: Some("a@example.com".to_string()),
            preview_ttl_secs: Some(10),
            ..Default::default()
        };
        base.merge(Config {
            user: Some("b@example.com".to_string()),
            ..Default::default()
        });
        assert_eq!(base.user.as_deref(), Some("b@example.com"));
        assert_eq!(base.preview_ttl_secs, Some(10));
    }

    #[test]
    fn test_set_and_get() {
        let mut config = Config::default();
        config.set("user", "Ada@Example.com").unwrap();
        config.set("preview_ttl_secs", "90").unwrap();
        assert_eq!(config.get("user").as_deref(), Some("ada@example.com"));
        assert_eq!(config.preview_ttl_secs(), 90);

        config.set("user", "").unwrap();
        assert!(config.get("user").is_none());
    }

    #[test]
    fn test_set_rejects_unknown_key_and_bad_number() {
        let mut config = Config::default();
        assert!(config.set("editor", "vi").is_err());
        assert!(config.set("preview_ttl_secs", "soon").is_err());
    }

    #[test]
    fn test_workspace_file_roundtrip() {
        let tmp = tempdir().unwrap();
        let ws = Workspace::init(tmp.path(), false).unwrap();

        let mut config = Config::load_workspace_file(&ws);
        assert_eq!(config, Config::default());

        config.set("company", "COMP-123").unwrap();
        config.save_workspace_file(&ws).unwrap();

        let reloaded = Config::load_workspace_file(&ws);
        assert_eq!(reloaded.company.as_deref(), Some("COMP-123"));
    }
}
