//! In-process collaborator implementations.
//!
//! Used by the host harness (seeded from the link snapshot) and throughout
//! the tests. Each service can be told to fail specific calls so failure
//! handling can be exercised without a real backend.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;

use crate::error::{MutationKind, ServiceError};
use crate::services::{ChatRoleService, IdentityDirectory, PermissionService};
use crate::types::{AccountRef, ChatAccountId, GameAccountId, LinkedIdentity, PermissionNode};

/// Link table kept in insertion order.
#[derive(Default)]
pub struct InMemoryDirectory {
    links: RwLock<Vec<LinkedIdentity>>,
    unavailable: RwLock<bool>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_links(links: impl IntoIterator<Item = LinkedIdentity>) -> Self {
        let directory = Self::new();
        for link in links {
            directory.link(link);
        }
        directory
    }

    /// Adds a link, replacing any existing link of either account.
    pub fn link(&self, identity: LinkedIdentity) {
        let mut links = self.links.write();
        links.retain(|existing| {
            existing.game_id != identity.game_id && existing.chat_id != identity.chat_id
        });
        links.push(identity);
    }

    /// Removes the link containing `account` and returns it.
    pub fn unlink(&self, account: &AccountRef) -> Option<LinkedIdentity> {
        let mut links = self.links.write();
        let position = links.iter().position(|link| matches_account(link, account))?;
        Some(links.remove(position))
    }

    /// Makes every lookup fail until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write() = unavailable;
    }

    fn check_available(&self) -> Result<(), ServiceError> {
        if *self.unavailable.read() {
            return Err(ServiceError::Unavailable("identity store offline".to_string()));
        }
        Ok(())
    }
}

fn matches_account(link: &LinkedIdentity, account: &AccountRef) -> bool {
    match account {
        AccountRef::Game(id) => link.game_id == *id,
        AccountRef::Chat(id) => link.chat_id == *id,
    }
}

#[async_trait]
impl IdentityDirectory for InMemoryDirectory {
    async fn linked_identity_for(
        &self,
        account: &AccountRef,
    ) -> Result<Option<LinkedIdentity>, ServiceError> {
        self.check_available()?;
        Ok(self
            .links
            .read()
            .iter()
            .find(|link| matches_account(link, account))
            .cloned())
    }

    async fn linked_identities(&self) -> Result<Vec<LinkedIdentity>, ServiceError> {
        self.check_available()?;
        Ok(self.links.read().clone())
    }
}

/// Guild member roles keyed by chat account.
#[derive(Default)]
pub struct InMemoryRoles {
    roles: DashMap<ChatAccountId, BTreeSet<String>>,
    failing: DashSet<ChatAccountId>,
}

impl InMemoryRoles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_roles<I, S>(&self, chat_id: ChatAccountId, roles: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles
            .insert(chat_id, roles.into_iter().map(Into::into).collect());
    }

    pub fn fail_lookups_for(&self, chat_id: ChatAccountId) {
        self.failing.insert(chat_id);
    }
}

#[async_trait]
impl ChatRoleService for InMemoryRoles {
    async fn current_roles(&self, chat_id: &ChatAccountId) -> Result<BTreeSet<String>, ServiceError> {
        if self.failing.contains(chat_id) {
            return Err(ServiceError::Unavailable(format!("member {chat_id} not fetchable")));
        }
        // Someone who left the guild holds no roles
        Ok(self
            .roles
            .get(chat_id)
            .map(|roles| roles.value().clone())
            .unwrap_or_default())
    }
}

/// A grant or revoke the permission service was asked to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationCall {
    pub game_id: GameAccountId,
    pub group: String,
    pub kind: MutationKind,
}

/// Permission nodes keyed by game account, with a log of every mutation call.
#[derive(Default)]
pub struct InMemoryPermissions {
    nodes: DashMap<GameAccountId, Vec<PermissionNode>>,
    failing_groups: DashSet<String>,
    failing_lookups: DashSet<GameAccountId>,
    calls: Mutex<Vec<MutationCall>>,
}

impl InMemoryPermissions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_nodes(&self, game_id: GameAccountId, nodes: Vec<PermissionNode>) {
        self.nodes.insert(game_id, nodes);
    }

    pub fn nodes(&self, game_id: GameAccountId) -> Vec<PermissionNode> {
        self.nodes
            .get(&game_id)
            .map(|nodes| nodes.value().clone())
            .unwrap_or_default()
    }

    /// Every account with stored nodes, sorted by id.
    pub fn accounts(&self) -> Vec<(GameAccountId, Vec<PermissionNode>)> {
        let mut accounts: Vec<_> = self
            .nodes
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        accounts.sort_by_key(|(id, _)| *id);
        accounts
    }

    /// Makes every grant and revoke of `group` fail.
    pub fn fail_group(&self, group: impl Into<String>) {
        self.failing_groups.insert(group.into());
    }

    pub fn fail_lookups_for(&self, game_id: GameAccountId) {
        self.failing_lookups.insert(game_id);
    }

    pub fn calls(&self) -> Vec<MutationCall> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, game_id: GameAccountId, group: &str, kind: MutationKind) -> Result<(), ServiceError> {
        self.calls.lock().push(MutationCall {
            game_id,
            group: group.to_string(),
            kind,
        });
        if self.failing_groups.contains(group) {
            return Err(ServiceError::Rejected(format!("cannot {kind} group {group}")));
        }
        Ok(())
    }
}

#[async_trait]
impl PermissionService for InMemoryPermissions {
    async fn current_nodes(&self, game_id: GameAccountId) -> Result<Vec<PermissionNode>, ServiceError> {
        if self.failing_lookups.contains(&game_id) {
            return Err(ServiceError::Unavailable(format!("user {game_id} could not be loaded")));
        }
        Ok(self.nodes(game_id))
    }

    async fn grant(&self, game_id: GameAccountId, group: &str) -> Result<(), ServiceError> {
        self.record(game_id, group, MutationKind::Grant)?;
        let node = PermissionNode::group(group);
        let mut nodes = self.nodes.entry(game_id).or_default();
        if !nodes.contains(&node) {
            nodes.push(node);
        }
        Ok(())
    }

    async fn revoke(&self, game_id: GameAccountId, group: &str) -> Result<(), ServiceError> {
        self.record(game_id, group, MutationKind::Revoke)?;
        if let Some(mut nodes) = self.nodes.get_mut(&game_id) {
            nodes.retain(|node| node.group_name() != Some(group));
        }
        Ok(())
    }
}
