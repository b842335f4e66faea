use crate::error::ConfigError;
use dice_client::ClientConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Display name prefixed to every sent line.
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub store: ClientConfig,
    /// Shared key all participants watch and write.
    #[serde(default = "default_mailbox_key")]
    pub mailbox_key: String,
    /// Upper bound on waiting for the delivery loop during shutdown.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_name() -> String {
    "Anonymous".to_string()
}

fn default_mailbox_key() -> String {
    "chatroom".to_string()
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            store: ClientConfig::default(),
            mailbox_key: default_mailbox_key(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl ChatConfig {
    /// `<config_dir>/dice-chat/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("dice-chat").join("config.json"))
    }

    /// Load from `path`. Missing or empty files yield the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            tracing::warn!("Config file {:?} is empty, using default config", path);
            return Ok(Self::default());
        }

        match serde_json::from_str(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::warn!(
                    "Failed to parse config {:?} ({}), using default config",
                    path,
                    e
                );
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}
