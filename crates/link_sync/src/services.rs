//! Collaborator interfaces the synchronizer depends on.
//!
//! The bridge never talks to Discord or the permission plugin directly.
//! Hosts implement these traits on top of whatever SDK they embed; the
//! [`crate::memory`] module provides in-process implementations.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use crate::error::ServiceError;
use crate::types::{AccountRef, ChatAccountId, GameAccountId, LinkedIdentity, PermissionNode};

/// Lookup of account links in both directions.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Returns the link that contains `account`, if the account is linked.
    async fn linked_identity_for(
        &self,
        account: &AccountRef,
    ) -> Result<Option<LinkedIdentity>, ServiceError>;

    /// Every link currently known, used for bulk reconciliation.
    async fn linked_identities(&self) -> Result<Vec<LinkedIdentity>, ServiceError>;
}

/// Read access to chat-platform roles.
#[async_trait]
pub trait ChatRoleService: Send + Sync {
    /// Names of the roles the member currently holds in the guild.
    async fn current_roles(&self, chat_id: &ChatAccountId) -> Result<BTreeSet<String>, ServiceError>;
}

/// Read/write access to the game server's permission backend.
#[async_trait]
pub trait PermissionService: Send + Sync {
    /// All permission nodes stored for the account.
    async fn current_nodes(&self, game_id: GameAccountId) -> Result<Vec<PermissionNode>, ServiceError>;

    /// Adds group membership for the account.
    async fn grant(&self, game_id: GameAccountId, group: &str) -> Result<(), ServiceError>;

    /// Removes group membership for the account.
    async fn revoke(&self, game_id: GameAccountId, group: &str) -> Result<(), ServiceError>;

    /// Names of the groups the account is a member of.
    async fn current_groups(&self, game_id: GameAccountId) -> Result<BTreeSet<String>, ServiceError> {
        let nodes = self.current_nodes(game_id).await?;
        Ok(nodes
            .iter()
            .filter(|node| node.is_group_membership())
            .filter_map(|node| node.group_name().map(str::to_string))
            .collect())
    }
}

/// Source of the raw `"<role> <group>"` entries, read on every reload.
pub trait ConfigSource: Send + Sync {
    fn raw_role_entries(&self) -> Vec<String>;
}

/// Awaits `call`, failing with [`ServiceError::TimedOut`] once `limit` passes.
pub(crate) async fn with_timeout<T, F>(limit: Option<Duration>, call: F) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(ServiceError::TimedOut(limit)),
        },
        None => call.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedNodes(Vec<PermissionNode>);

    #[async_trait]
    impl PermissionService for FixedNodes {
        async fn current_nodes(&self, _: GameAccountId) -> Result<Vec<PermissionNode>, ServiceError> {
            Ok(self.0.clone())
        }

        async fn grant(&self, _: GameAccountId, _: &str) -> Result<(), ServiceError> {
            Ok(())
        }

        async fn revoke(&self, _: GameAccountId, _: &str) -> Result<(), ServiceError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_current_groups_only_reports_group_nodes() {
        let service = FixedNodes(vec![
            PermissionNode::group("staff"),
            PermissionNode::permission("group.fake", true),
            PermissionNode::group("vip"),
        ]);

        let groups = service.current_groups(GameAccountId::new()).await.unwrap();
        let expected: BTreeSet<String> = ["staff", "vip"].iter().map(|s| s.to_string()).collect();
        assert_eq!(groups, expected);
    }

    #[tokio::test]
    async fn test_with_timeout_reports_slow_calls() {
        let limit = Duration::from_millis(10);
        let result: Result<(), ServiceError> = with_timeout(Some(limit), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;

        assert_eq!(result, Err(ServiceError::TimedOut(limit)));
    }

    #[tokio::test]
    async fn test_with_timeout_passes_results_through() {
        let ok: Result<u8, ServiceError> = with_timeout(None, async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));

        let err: Result<u8, ServiceError> = with_timeout(Some(Duration::from_secs(1)), async {
            Err(ServiceError::Rejected("nope".to_string()))
        })
        .await;
        assert_eq!(err, Err(ServiceError::Rejected("nope".to_string())));
    }
}
