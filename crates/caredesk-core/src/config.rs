//! Application configuration management.
//!
//! Configuration is stored at `~/.config/caredesk/config.json`. The API URL
//! and bearer token can be overridden from the environment.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "caredesk";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api";

pub const API_URL_ENV: &str = "CAREDESK_API_URL";
pub const TOKEN_ENV: &str = "CAREDESK_TOKEN";

/// `<base>/caredesk`, where `base` is the platform directory of `what`.
fn app_dir(base: Option<PathBuf>, what: &str) -> Result<PathBuf> {
    base.map(|dir| dir.join(APP_NAME))
        .ok_or_else(|| anyhow!("Could not find {} directory", what))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub last_team_id: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// A missing file is an empty config; an unreadable one is an error.
    fn load_from(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read config: {}", path.display()))
            }
        };
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write config: {}", path.display()))
    }

    fn config_path() -> Result<PathBuf> {
        Ok(app_dir(dirs::config_dir(), "config")?.join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        app_dir(dirs::cache_dir(), "cache")
    }

    /// Environment first, then the config file, then the local default.
    pub fn api_base_url(&self) -> String {
        Self::resolve_api_base_url(std::env::var(API_URL_ENV).ok(), self.api_base_url.as_deref())
    }

    fn resolve_api_base_url(from_env: Option<String>, from_file: Option<&str>) -> String {
        from_env
            .filter(|url| !url.trim().is_empty())
            .or_else(|| from_file.map(String::from))
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
    }

    pub fn token(&self) -> Option<String> {
        std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_base_url_precedence() {
        assert_eq!(
            Config::resolve_api_base_url(Some("https://env".into()), Some("https://file")),
            "https://env"
        );
        assert_eq!(
            Config::resolve_api_base_url(Some("  ".into()), Some("https://file")),
            "https://file"
        );
        assert_eq!(Config::resolve_api_base_url(None, None), DEFAULT_API_BASE_URL);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);
        assert_eq!(Config::load_from(&path).unwrap(), Config::default());

        let config = Config {
            api_base_url: None,
            last_team_id: Some("team1".to_string()),
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);

        std::fs::write(&path, "{ not json").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_app_dir_needs_a_base() {
        assert!(app_dir(None, "cache").is_err());
        assert_eq!(
            app_dir(Some(PathBuf::from("/tmp")), "cache").unwrap(),
            PathBuf::from("/tmp").join(APP_NAME)
        );
    }

    #[test]
    fn test_config_tolerates_missing_fields() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert!(config.api_base_url.is_none());
        assert!(config.last_team_id.is_none());
    }
}
