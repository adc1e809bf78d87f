//! JSON snapshot of links, guild roles and permission nodes.
//!
//! Stands in for the live Discord guild, permission backend and link store
//! when the bridge is run outside a game server. The snapshot is loaded
//! into the in-memory services from `link_sync::memory` and the resulting
//! permission nodes can be written back after a run.

use link_sync::memory::{InMemoryDirectory, InMemoryPermissions, InMemoryRoles};
use link_sync::{ChatAccountId, GameAccountId, LinkedIdentity, PermissionNode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Snapshot format error: {0}")]
    Format(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Linked accounts
    #[serde(default)]
    pub links: Vec<LinkedIdentity>,
    /// Discord role names per guild member
    #[serde(default)]
    pub members: BTreeMap<ChatAccountId, Vec<String>>,
    /// Permission nodes per player
    #[serde(default)]
    pub permissions: BTreeMap<GameAccountId, Vec<PermissionNode>>,
}

/// In-memory services seeded from a snapshot.
pub struct SnapshotServices {
    pub directory: Arc<InMemoryDirectory>,
    pub roles: Arc<InMemoryRoles>,
    pub permissions: Arc<InMemoryPermissions>,
}

impl Snapshot {
    /// Loads a snapshot, returning an empty one when the file doesn't exist.
    pub async fn load(path: &Path) -> Result<Self, SnapshotError> {
        if !path.exists() {
            info!("No snapshot at {}, starting empty", path.display());
            return Ok(Snapshot::default());
        }
        let content = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    pub async fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    pub fn services(&self) -> SnapshotServices {
        let roles = InMemoryRoles::new();
        for (chat_id, member_roles) in &self.members {
            roles.set_roles(chat_id.clone(), member_roles.iter().cloned());
        }

        let permissions = InMemoryPermissions::new();
        for (game_id, nodes) in &self.permissions {
            permissions.set_nodes(*game_id, nodes.clone());
        }

        SnapshotServices {
            directory: Arc::new(InMemoryDirectory::with_links(self.links.iter().cloned())),
            roles: Arc::new(roles),
            permissions: Arc::new(permissions),
        }
    }

    /// Copies the current permission nodes back into the snapshot.
    pub fn capture_permissions(&mut self, permissions: &InMemoryPermissions) {
        self.permissions = permissions.accounts().into_iter().collect();
    }
}
