//! Avatar cache used when relaying messages under a player's face.

use async_trait::async_trait;
use dashmap::DashMap;
use link_sync::{ChatAccountId, GameAccountId, ServiceError};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::settings::IconStorageSettings;

/// Raw image bytes of an avatar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Icon(Arc<[u8]>);

impl Icon {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self(bytes.into())
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }
}

/// The parts of a Discord user needed to find an avatar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatUser {
    pub id: ChatAccountId,
    pub avatar_id: Option<String>,
    pub avatar_url: Option<String>,
}

/// Downloads avatar images.
#[async_trait]
pub trait IconFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Icon, ServiceError>;
}

/// Two avatar caches: game accounts by uuid and chat accounts by avatar id.
///
/// Failed downloads are not cached, so the next request tries again.
pub struct IconStore {
    settings: RwLock<IconStorageSettings>,
    fetcher: Arc<dyn IconFetcher>,
    game_icons: DashMap<GameAccountId, Icon>,
    chat_icons: DashMap<String, Icon>,
}

impl IconStore {
    pub fn new(settings: IconStorageSettings, fetcher: Arc<dyn IconFetcher>) -> Self {
        Self {
            settings: RwLock::new(settings),
            fetcher,
            game_icons: DashMap::new(),
            chat_icons: DashMap::new(),
        }
    }

    /// Applies new settings and drops everything cached so far.
    pub fn reset(&self, settings: IconStorageSettings) {
        *self.settings.write() = settings;
        self.clear();
    }

    pub fn clear(&self) {
        self.game_icons.clear();
        self.chat_icons.clear();
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.read().enabled
    }

    /// Number of cached (game, chat) icons.
    pub fn cached(&self) -> (usize, usize) {
        (self.game_icons.len(), self.chat_icons.len())
    }

    /// Avatar of a game account. Always `None` while icon storage is disabled.
    pub async fn game_icon(&self, game_id: GameAccountId) -> Option<Icon> {
        let url = {
            let settings = self.settings.read();
            if !settings.enabled {
                return None;
            }
            settings.avatar_url_for(&game_id.to_string())
        };

        if let Some(icon) = self.game_icons.get(&game_id) {
            return Some(icon.value().clone());
        }

        let icon = self.download(&url).await?;
        self.game_icons.insert(game_id, icon.clone());
        Some(icon)
    }

    /// Avatar of an unlinked chat account, keyed by its avatar id.
    pub async fn chat_icon(&self, user: &ChatUser) -> Option<Icon> {
        let (Some(avatar_id), Some(url)) = (&user.avatar_id, &user.avatar_url) else {
            debug!(user = %user.id, "Chat user has no avatar");
            return None;
        };

        if let Some(icon) = self.chat_icons.get(avatar_id) {
            return Some(icon.value().clone());
        }

        let icon = self.download(url).await?;
        self.chat_icons.insert(avatar_id.clone(), icon.clone());
        Some(icon)
    }

    async fn download(&self, url: &str) -> Option<Icon> {
        match self.fetcher.fetch(url).await {
            Ok(icon) => Some(icon),
            Err(error) => {
                warn!(url = url, error = %error, "Failed to fetch avatar");
                None
            }
        }
    }
}
