//! Configuration management for the KubeCity bridge.
//!
//! This module handles loading, validation, and conversion of the bridge
//! configuration from TOML files and command-line arguments.

use bridge_plugin::{
    BridgeSettings, GroupLinkerSettings, IconStorageSettings, SyncSettings, DEFAULT_AVATAR_URL,
};
use link_sync::SyncMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

fn default_workers() -> usize {
    4
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_avatar_url() -> String {
    DEFAULT_AVATAR_URL.to_string()
}

fn default_data_file() -> String {
    "data.json".to_string()
}

/// Application configuration loaded from TOML file.
///
/// Bot credentials, one section per feature (toggled by `use`), plus sync
/// tuning and logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Discord bot settings
    pub bot: BotSettings,
    /// Role to group synchronization
    pub group_linker: GroupLinkerSection,
    /// Avatar caching
    pub icon_storage: IconStorageSection,
    /// Bulk synchronization tuning
    #[serde(default)]
    pub sync: SyncSection,
    /// Link snapshot location
    #[serde(default)]
    pub storage: StorageSettings,
    /// Logging configuration settings
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSettings {
    /// Bot token; leaving it unset disables every Discord-backed feature
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupLinkerSection {
    #[serde(rename = "use")]
    pub enabled: bool,
    /// Entries of the form "<discord role> <permission group>"
    #[serde(default)]
    pub groups: Vec<String>,
    /// "diff" touches only changed groups, "reset" revokes and regrants all
    #[serde(default)]
    pub mode: SyncMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IconStorageSection {
    #[serde(rename = "use")]
    pub enabled: bool,
    /// Avatar URL template; `{uuid}` is replaced by the player uuid
    #[serde(default = "default_avatar_url")]
    pub avatar_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSection {
    /// Linked accounts reconciled concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Timeout for each Discord or permission call, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// JSON file holding links, member roles and permission nodes
    #[serde(default = "default_data_file")]
    pub data_file: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
        }
    }
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bot: BotSettings { token: None },
            group_linker: GroupLinkerSection {
                enabled: false,
                groups: vec![],
                mode: SyncMode::Diff,
            },
            icon_storage: IconStorageSection {
                enabled: false,
                avatar_url: default_avatar_url(),
            },
            sync: SyncSection::default(),
            storage: StorageSettings::default(),
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at the
    /// specified path and returns the default configuration.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Converts the file configuration into the settings the plugin consumes.
    pub fn to_bridge_settings(&self) -> BridgeSettings {
        BridgeSettings {
            bot_token: self.bot.token.clone().filter(|token| !token.is_empty()),
            group_linker: GroupLinkerSettings {
                enabled: self.group_linker.enabled,
                groups: self.group_linker.groups.clone(),
                mode: self.group_linker.mode,
            },
            icon_storage: IconStorageSettings {
                enabled: self.icon_storage.enabled,
                avatar_url: self.icon_storage.avatar_url.clone(),
            },
            sync: SyncSettings {
                workers: self.sync.workers,
                call_timeout: Some(Duration::from_millis(self.sync.timeout_ms)),
            },
        }
    }

    /// Validates the configuration for consistency and correctness.
    ///
    /// Malformed `groups` entries are not an error here; they are skipped
    /// when the role table is built.
    pub fn validate(&self) -> Result<(), String> {
        if self.sync.workers == 0 {
            return Err("Sync workers must be at least 1".to_string());
        }
        if self.sync.timeout_ms == 0 {
            return Err("Sync timeout_ms must be greater than 0".to_string());
        }

        if self.icon_storage.enabled && !self.icon_storage.avatar_url.contains("{uuid}") {
            return Err(format!(
                "Avatar URL must contain {{uuid}}: {}",
                &self.icon_storage.avatar_url
            ));
        }

        if self.storage.data_file.is_empty() {
            return Err("Data file path cannot be empty".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}
