use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nibble_core::host::HostUser;
use nibble_core::remote::{ClientConfig, DEFAULT_BASE_URL};

/// `config.toml` in the platform config dir. Every key is optional.
#[derive(Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub api_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub user_id: Option<i64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Invalid config file: {}", path.display()))
    }
}

/// Values from flags or environment; these win over the file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub api_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub user_id: Option<i64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

pub struct Config {
    pub api_url: String,
    pub timeout: Duration,
    pub user: Option<HostUser>,
    pub path: Option<PathBuf>,
}

impl Config {
    pub fn load(overrides: Overrides) -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "nibble").context("Could not determine home directory")?;
        let path = proj_dirs.config_dir().join("config.toml");
        let file = FileConfig::read(&path)?;
        Ok(Self::resolve(file, overrides, Some(path)))
    }

    fn resolve(file: FileConfig, overrides: Overrides, path: Option<PathBuf>) -> Self {
        let api_url = overrides
            .api_url
            .or(file.api_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let timeout_secs = overrides
            .timeout_secs
            .or(file.timeout_secs)
            .unwrap_or_else(|| ClientConfig::default().timeout.as_secs());

        let user = overrides.user_id.or(file.user_id).map(|id| HostUser {
            id,
            first_name: overrides
                .first_name
                .or(file.first_name)
                .unwrap_or_else(|| "Friend".to_string()),
            last_name: overrides.last_name.or(file.last_name),
            username: overrides.username.or(file.username),
            avatar_url: None,
        });

        Config {
            api_url,
            timeout: Duration::from_secs(timeout_secs.max(1)),
            user,
            path,
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.api_url.clone(),
            timeout: self.timeout,
            ..ClientConfig::default()
        }
    }

    /// Where to tell the user to put settings.
    pub fn path_hint(&self) -> String {
        self.path
            .as_ref()
            .map_or_else(|| "config.toml".to_string(), |p| p.display().to_string())
    }
}
