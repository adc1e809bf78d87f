//! Process-wide state shared by every feature.
//!
//! A [`BridgeContext`] is created when the plugin starts and dropped when it
//! stops. The icon caches and the role table live here and are handed to
//! features explicitly.

use link_sync::{
    AccountRef, BulkReconciler, ChatRoleService, GroupSynchronizer, IdentityDirectory,
    LinkedIdentity, LookupStage, PermissionService, RoleMapping, SyncError,
};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

use crate::icons::{ChatUser, Icon, IconFetcher, IconStore};
use crate::settings::BridgeSettings;

/// Handles to the platforms the bridge talks to.
#[derive(Clone)]
pub struct Services {
    pub directory: Arc<dyn IdentityDirectory>,
    pub roles: Arc<dyn ChatRoleService>,
    pub permissions: Arc<dyn PermissionService>,
    pub icons: Arc<dyn IconFetcher>,
}

pub struct BridgeContext {
    services: Services,
    settings: RwLock<Arc<BridgeSettings>>,
    mapping: RwLock<Arc<RoleMapping>>,
    icons: IconStore,
}

impl BridgeContext {
    pub fn new(settings: BridgeSettings, services: Services) -> Self {
        let icons = IconStore::new(settings.icon_storage.clone(), services.icons.clone());
        Self {
            services,
            settings: RwLock::new(Arc::new(settings)),
            mapping: RwLock::new(Arc::new(RoleMapping::default())),
            icons,
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn settings(&self) -> Arc<BridgeSettings> {
        self.settings.read().clone()
    }

    /// Swaps in new settings and resets caches that depend on them.
    pub fn apply_settings(&self, settings: BridgeSettings) {
        self.icons.reset(settings.icon_storage.clone());
        *self.settings.write() = Arc::new(settings);
    }

    /// Current role table. Callers keep the snapshot for the whole run.
    pub fn mapping(&self) -> Arc<RoleMapping> {
        self.mapping.read().clone()
    }

    /// Replaces the role table in one step.
    pub fn replace_mapping(&self, mapping: RoleMapping) -> Arc<RoleMapping> {
        let mapping = Arc::new(mapping);
        *self.mapping.write() = mapping.clone();
        mapping
    }

    pub fn icons(&self) -> &IconStore {
        &self.icons
    }

    /// Synchronizer configured from the current settings.
    pub fn synchronizer(&self) -> GroupSynchronizer {
        let settings = self.settings();
        GroupSynchronizer::new(self.services.permissions.clone())
            .with_mode(settings.group_linker.mode)
            .with_call_timeout(settings.sync.call_timeout)
    }

    pub fn reconciler(&self) -> BulkReconciler {
        BulkReconciler::new(self.synchronizer(), self.services.roles.clone())
            .with_workers(self.settings().sync.workers)
    }

    /// Link containing `account`. A directory failure is an identity lookup failure.
    pub async fn linked_identity(&self, account: &AccountRef) -> Result<Option<LinkedIdentity>, SyncError> {
        self.services
            .directory
            .linked_identity_for(account)
            .await
            .map_err(|source| SyncError::LookupFailure {
                account: account.clone(),
                stage: LookupStage::Identity,
                source,
            })
    }

    /// Avatar to show for a chat user: the linked player's face when there is
    /// one, otherwise their Discord avatar.
    pub async fn icon_for_chat_user(&self, user: &ChatUser) -> Option<Icon> {
        match self.linked_identity(&AccountRef::Chat(user.id.clone())).await {
            Ok(Some(identity)) => return self.icons.game_icon(identity.game_id).await,
            Ok(None) => {}
            Err(error) => debug!(user = %user.id, error = %error, "Link lookup failed, using chat avatar"),
        }
        self.icons.chat_icon(user).await
    }
}
