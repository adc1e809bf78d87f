//! Identity and permission-node types shared by every part of the bridge.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a Minecraft account.
///
/// Wraps the account UUID so it cannot be confused with other ids that
/// travel through the bridge (chat ids are plain strings on the wire).
///
/// # Examples
///
/// ```rust
/// use link_sync::GameAccountId;
///
/// let id = GameAccountId::from_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
/// assert_eq!(id.to_string(), "550e8400-e29b-41d4-a716-446655440000");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameAccountId(pub Uuid);

impl GameAccountId {
    /// Creates a new random account id using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses an account id from its hyphenated string form.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for GameAccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for GameAccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a Discord user (the snowflake, kept opaque).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatAccountId(pub String);

impl ChatAccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChatAccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChatAccountId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A game account and the chat account it has been linked to.
///
/// Links are created by an external flow (the `/discord link` command in
/// the host) and are read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkedIdentity {
    pub game_id: GameAccountId,
    pub chat_id: ChatAccountId,
}

impl LinkedIdentity {
    pub fn new(game_id: GameAccountId, chat_id: impl Into<ChatAccountId>) -> Self {
        Self {
            game_id,
            chat_id: chat_id.into(),
        }
    }
}

impl From<String> for ChatAccountId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for LinkedIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <-> {}", self.game_id, self.chat_id)
    }
}

/// Either side of a link, used to query the identity directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AccountRef {
    Game(GameAccountId),
    Chat(ChatAccountId),
}

impl std::fmt::Display for AccountRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountRef::Game(id) => write!(f, "game:{id}"),
            AccountRef::Chat(id) => write!(f, "chat:{id}"),
        }
    }
}

/// A single entry in a game account's permission data.
///
/// Permission backends store group membership as one node among many; the
/// synchronizer only ever looks at nodes for which
/// [`PermissionNode::is_group_membership`] holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PermissionNode {
    /// Membership of a permission group (`group.<name>` in most backends).
    Group { name: String },
    /// Any other permission key.
    Permission { key: String, value: bool },
}

impl PermissionNode {
    pub fn group(name: impl Into<String>) -> Self {
        PermissionNode::Group { name: name.into() }
    }

    pub fn permission(key: impl Into<String>, value: bool) -> Self {
        PermissionNode::Permission {
            key: key.into(),
            value,
        }
    }

    pub fn is_group_membership(&self) -> bool {
        matches!(self, PermissionNode::Group { .. })
    }

    /// Group name if this node is a group membership.
    pub fn group_name(&self) -> Option<&str> {
        match self {
            PermissionNode::Group { name } => Some(name),
            PermissionNode::Permission { .. } => None,
        }
    }
}
