//! Client config load/save for `~/.forum-chat/config.yaml`.
//! Every field is optional; the accessors on [`Config`] fill in the defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_AUTH_URL: &str = "http://localhost:3001/api";
pub const DEFAULT_FORUM_URL: &str = "http://localhost:3002/api/forum";
pub const DEFAULT_CHAT_URL: &str = "ws://localhost:3003/ws";
pub const DEFAULT_HISTORY_URL: &str = "http://localhost:3003/history";
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 1000;

/// REST services (auth_url, forum_url).
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ApiSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forum_url: Option<String>,
}

/// Chat service (url, history_url, reconnect_delay_ms).
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ChatSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnect_delay_ms: Option<u64>,
}

/// Where the session is persisted.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct StorageSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub chat: ChatSection,
    #[serde(default)]
    pub storage: StorageSection,
}

impl Config {
    pub fn auth_url(&self) -> &str {
        self.api.auth_url.as_deref().unwrap_or(DEFAULT_AUTH_URL)
    }

    pub fn forum_url(&self) -> &str {
        self.api.forum_url.as_deref().unwrap_or(DEFAULT_FORUM_URL)
    }

    pub fn chat_url(&self) -> &str {
        self.chat.url.as_deref().unwrap_or(DEFAULT_CHAT_URL)
    }

    pub fn history_url(&self) -> &str {
        self.chat.history_url.as_deref().unwrap_or(DEFAULT_HISTORY_URL)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(
            self.chat
                .reconnect_delay_ms
                .unwrap_or(DEFAULT_RECONNECT_DELAY_MS),
        )
    }

    /// Configured session file, else `~/.forum-chat/session.json`.
    pub fn session_path(&self) -> Option<PathBuf> {
        self.storage
            .session_path
            .clone()
            .or_else(|| Some(app_dir()?.join("session.json")))
    }
}

/// Returns the default config file path: `~/.forum-chat/config.yaml` (platform-specific).
pub fn default_config_path() -> Option<PathBuf> {
    Some(app_dir()?.join("config.yaml"))
}

fn app_dir() -> Option<PathBuf> {
    Some(home_dir()?.join(".forum-chat"))
}

#[cfg(unix)]
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

#[cfg(windows)]
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE").map(PathBuf::from)
}

#[cfg(not(any(unix, windows)))]
fn home_dir() -> Option<PathBuf> {
    None
}

/// Load config from a YAML file.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&contents)?)
}

/// Load config, treating a missing file as "all defaults".
pub fn load_or_default(path: &Path) -> Result<Config, ConfigError> {
    match load(path) {
        Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
        other => other,
    }
}

/// Save config to a YAML file. Creates parent directory if missing.
pub fn save(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

/// Config load/save error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
