//! Runtime settings handed to the plugin by its host.
//!
//! The host owns the config file format; it converts whatever it loaded into
//! a [`BridgeSettings`] on every reload.

use link_sync::{ConfigSource, SyncMode};
use std::time::Duration;

/// Default avatar service for game accounts. `{uuid}` is substituted.
pub const DEFAULT_AVATAR_URL: &str = "https://crafatar.com/avatars/{uuid}?overlay=true";

#[derive(Debug, Clone, PartialEq)]
pub struct BridgeSettings {
    /// Discord bot token; chat-side features are disabled when absent
    pub bot_token: Option<String>,
    pub group_linker: GroupLinkerSettings,
    pub icon_storage: IconStorageSettings,
    pub sync: SyncSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupLinkerSettings {
    pub enabled: bool,
    /// Raw `"<discord role> <permission group>"` entries
    pub groups: Vec<String>,
    pub mode: SyncMode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IconStorageSettings {
    pub enabled: bool,
    pub avatar_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    /// Accounts reconciled concurrently during a bulk run
    pub workers: usize,
    /// Limit for each call to Discord or the permission backend
    pub call_timeout: Option<Duration>,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            bot_token: None,
            group_linker: GroupLinkerSettings {
                enabled: false,
                groups: Vec::new(),
                mode: SyncMode::Diff,
            },
            icon_storage: IconStorageSettings {
                enabled: false,
                avatar_url: DEFAULT_AVATAR_URL.to_string(),
            },
            sync: SyncSettings {
                workers: 4,
                call_timeout: Some(Duration::from_secs(10)),
            },
        }
    }
}

impl ConfigSource for GroupLinkerSettings {
    fn raw_role_entries(&self) -> Vec<String> {
        self.groups.clone()
    }
}

impl IconStorageSettings {
    /// Avatar URL for a game account.
    pub fn avatar_url_for(&self, uuid: &str) -> String {
        self.avatar_url.replace("{uuid}", uuid)
    }
}
