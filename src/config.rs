//! Server configuration.
//!
//! Runtime settings come from environment variables. API keys live in a
//! YAML file that `nutrisnap-admin` edits:
//!
//! ```yaml
//! api_keys:
//!   - key: "generated-secret"
//!     user_id: "u-alice"
//!     email: "alice@example.com"
//!     merge_from: ["guest-7f3a"]
//!   - key: "another-secret"
//!     user_id: "guest-7f3a"
//!     anonymous: true
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One issued API key and the account it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKeyEntry {
    pub key: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub anonymous: bool,
    /// Anonymous uids whose entries this key may list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merge_from: Vec<String>,
}

/// Contents of the server config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub api_keys: Vec<ApiKeyEntry>,
}

impl ConfigFile {
    /// Reads the file, treating a missing file as empty.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::ReadError(path.to_path_buf(), e)),
        };
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::ParseError(path.to_path_buf(), e))
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteError(parent.to_path_buf(), e))?;
        }
        let yaml = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e))?;
        std::fs::write(path, yaml).map_err(|e| ConfigError::WriteError(path.to_path_buf(), e))
    }
}

/// Settings for the running server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Root of the per-user storage directories
    pub data_dir: PathBuf,
    /// Path to the API key file
    pub config_path: PathBuf,
}

impl ServerConfig {
    /// Reads `NUTRISNAP_PORT`, `NUTRISNAP_DATA_DIR` and `NUTRISNAP_CONFIG`,
    /// falling back to platform defaults.
    pub fn from_env() -> Self {
        let port = std::env::var("NUTRISNAP_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let data_dir = std::env::var("NUTRISNAP_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default_data_dir());

        let config_path = std::env::var("NUTRISNAP_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default_config_path());

        Self {
            port,
            data_dir,
            config_path,
        }
    }

    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("nutrisnap-server")
    }

    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("nutrisnap-server")
            .join("config.yaml")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    WriteError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file {}: {}", path.display(), e)
            }
            ConfigError::WriteError(path, e) => {
                write!(f, "Failed to write config file {}: {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file {}: {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
