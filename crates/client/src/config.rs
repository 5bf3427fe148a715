// Client configuration file.
//
// `~/.docket/client.toml`, every key optional:
//
//   server_url = "http://localhost:8080"
//   autosave_debounce_ms = 2000
//   autosave_min_interval_secs = 15
//   request_timeout_secs = 30

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::autosave::AutoSaveConfig;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080";

/// Root directory for client state: `~/.docket/`.
pub fn client_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".docket"))
}

/// Path to the client config file: `~/.docket/client.toml`.
pub fn client_config_path() -> Option<PathBuf> {
    client_dir().map(|d| d.join("client.toml"))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub server_url: String,
    /// Quiet period after the last edit before an auto-save fires.
    pub autosave_debounce_ms: u64,
    /// Minimum spacing between successful auto-saves.
    pub autosave_min_interval_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            autosave_debounce_ms: 2_000,
            autosave_min_interval_secs: 15,
            request_timeout_secs: 30,
        }
    }
}

impl ClientConfig {
    /// Load from `~/.docket/client.toml`. Returns defaults if the file
    /// doesn't exist or can't be parsed.
    pub fn load() -> Self {
        client_config_path().and_then(|p| Self::load_from(&p).ok()).unwrap_or_default()
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, contents).map_err(ConfigError::Io)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn autosave(&self) -> AutoSaveConfig {
        AutoSaveConfig {
            debounce: Duration::from_millis(self.autosave_debounce_ms),
            min_interval: Duration::from_secs(self.autosave_min_interval_secs),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(std::io::Error),
    #[error("config parse error: {0}")]
    Parse(toml::de::Error),
    #[error("config serialize error: {0}")]
    Serialize(toml::ser::Error),
}
