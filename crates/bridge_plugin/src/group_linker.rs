//! Keeps permission groups in line with Discord roles.

use async_trait::async_trait;
use link_sync::{AccountRef, ConfigSource, LinkedIdentity, RoleMapping};
use tracing::{debug, info};

use crate::context::BridgeContext;
use crate::error::PluginError;
use crate::events::BridgeEvent;
use crate::feature::{Feature, FeatureOutcome};

/// Group linker feature, enabled by `[group_linker] enabled = true`.
///
/// On reload the role table is rebuilt from config and every linked account
/// is reconciled. Afterwards single accounts are resynchronized when they
/// link, join or have their roles changed, and cleared when they unlink.
#[derive(Debug, Default)]
pub struct GroupLinker;

impl GroupLinker {
    pub const NAME: &'static str = "group_linker";

    pub fn new() -> Self {
        Self
    }

    async fn resync(&self, account: AccountRef, context: &BridgeContext) -> Result<FeatureOutcome, PluginError> {
        let Some(identity) = context.linked_identity(&account).await? else {
            debug!(account = %account, "Account is not linked, nothing to synchronize");
            return Ok(FeatureOutcome::Ignored);
        };
        Ok(self.resync_identity(identity, context).await)
    }

    async fn resync_identity(&self, identity: LinkedIdentity, context: &BridgeContext) -> FeatureOutcome {
        let mapping = context.mapping();
        let result = context.reconciler().reconcile_one(identity, &mapping).await;
        FeatureOutcome::Synchronized(vec![result])
    }
}

#[async_trait]
impl Feature for GroupLinker {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn reload(&self, context: &BridgeContext) -> Result<FeatureOutcome, PluginError> {
        let settings = context.settings();
        let mapping = context.replace_mapping(RoleMapping::build(settings.group_linker.raw_role_entries()));
        info!(
            mappings = mapping.len(),
            mode = ?settings.group_linker.mode,
            "Group linker role table rebuilt"
        );

        let identities = context.services().directory.linked_identities().await?;
        let results = context.reconciler().reconcile_all(identities, &mapping).await;
        Ok(FeatureOutcome::Synchronized(results))
    }

    async fn handle(
        &self,
        event: &BridgeEvent,
        context: &BridgeContext,
    ) -> Result<FeatureOutcome, PluginError> {
        match event {
            BridgeEvent::AccountLinked(identity) => {
                Ok(self.resync_identity(identity.clone(), context).await)
            }
            BridgeEvent::AccountUnlinked(identity) => {
                let mapping = context.mapping();
                let result = context.synchronizer().clear(identity, &mapping).await;
                Ok(FeatureOutcome::Synchronized(vec![result]))
            }
            BridgeEvent::MemberRolesChanged { chat_id } => {
                self.resync(AccountRef::Chat(chat_id.clone()), context).await
            }
            BridgeEvent::PlayerJoined { game_id } => {
                self.resync(AccountRef::Game(*game_id), context).await
            }
        }
    }
}
