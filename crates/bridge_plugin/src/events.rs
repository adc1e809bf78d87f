//! Platform events the host forwards to the plugin.

use link_sync::{ChatAccountId, GameAccountId, LinkedIdentity};

/// Something that happened on either platform and may concern a feature.
///
/// The host translates its own callbacks (player join, guild member update,
/// link command) into these and passes them to
/// [`crate::BridgePlugin::dispatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    /// A player finished linking their Discord account
    AccountLinked(LinkedIdentity),
    /// A link was removed; the identity is the link as it was
    AccountUnlinked(LinkedIdentity),
    /// A guild member gained or lost roles
    MemberRolesChanged { chat_id: ChatAccountId },
    /// A player joined the game server
    PlayerJoined { game_id: GameAccountId },
}

impl BridgeEvent {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeEvent::AccountLinked(_) => "account_linked",
            BridgeEvent::AccountUnlinked(_) => "account_unlinked",
            BridgeEvent::MemberRolesChanged { .. } => "member_roles_changed",
            BridgeEvent::PlayerJoined { .. } => "player_joined",
        }
    }
}
