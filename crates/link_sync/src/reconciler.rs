//! Drives the synchronizer over many linked identities.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{LookupStage, SyncError};
use crate::mapping::RoleMapping;
use crate::services::{with_timeout, ChatRoleService};
use crate::synchronizer::{GroupSynchronizer, Reconciliation};
use crate::types::{AccountRef, LinkedIdentity};

/// Totals over a batch of reconciliations, for logging.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub identities: usize,
    pub changed: usize,
    pub groups_added: usize,
    pub groups_removed: usize,
    pub lookup_failures: usize,
    pub mutation_failures: usize,
}

impl ReconcileSummary {
    pub fn from_results(results: &[Reconciliation]) -> Self {
        let mut summary = ReconcileSummary {
            identities: results.len(),
            ..Default::default()
        };

        for result in results {
            if !result.is_noop() {
                summary.changed += 1;
            }
            summary.groups_added += result.added.len();
            summary.groups_removed += result.removed.len();
            for failure in &result.failures {
                if failure.is_lookup() {
                    summary.lookup_failures += 1;
                } else {
                    summary.mutation_failures += 1;
                }
            }
        }

        summary
    }
}

/// Fetches roles and groups for each identity and synchronizes it.
///
/// Identities are independent: up to `workers` of them are processed at
/// once and a failure on one never stops the others. Results come back in
/// the order the identities were given.
#[derive(Clone)]
pub struct BulkReconciler {
    synchronizer: GroupSynchronizer,
    roles: Arc<dyn ChatRoleService>,
    workers: usize,
}

impl BulkReconciler {
    pub fn new(synchronizer: GroupSynchronizer, roles: Arc<dyn ChatRoleService>) -> Self {
        Self {
            synchronizer,
            roles,
            workers: 1,
        }
    }

    /// Number of identities reconciled concurrently. Zero is treated as one.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Synchronizes a single identity with fresh role and group data.
    pub async fn reconcile_one(&self, identity: LinkedIdentity, mapping: &RoleMapping) -> Reconciliation {
        let roles = match with_timeout(
            self.synchronizer.call_timeout(),
            self.roles.current_roles(&identity.chat_id),
        )
        .await
        {
            Ok(roles) => roles,
            Err(source) => {
                warn!(identity = %identity, error = %source, "Could not read member roles");
                let error = SyncError::LookupFailure {
                    account: AccountRef::Chat(identity.chat_id.clone()),
                    stage: LookupStage::Roles,
                    source,
                };
                return Reconciliation::failed(identity, error);
            }
        };

        let groups = match self.synchronizer.current_groups(&identity).await {
            Ok(groups) => groups,
            Err(error) => {
                warn!(identity = %identity, error = %error, "Could not read permission groups");
                return Reconciliation::failed(identity, error);
            }
        };

        self.synchronizer
            .synchronize(&identity, &roles, &groups, mapping)
            .await
    }

    /// Reconciles every identity, returning one result per identity.
    pub async fn reconcile_all(
        &self,
        identities: Vec<LinkedIdentity>,
        mapping: &RoleMapping,
    ) -> Vec<Reconciliation> {
        info!(
            identities = identities.len(),
            workers = self.workers,
            mappings = mapping.len(),
            "Reconciling linked accounts"
        );

        let results: Vec<Reconciliation> = stream::iter(identities)
            .map(|identity| self.reconcile_one(identity, mapping))
            .buffered(self.workers)
            .collect()
            .await;

        let summary = ReconcileSummary::from_results(&results);
        info!(
            changed = summary.changed,
            added = summary.groups_added,
            removed = summary.groups_removed,
            lookup_failures = summary.lookup_failures,
            mutation_failures = summary.mutation_failures,
            "Reconciliation finished"
        );

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryPermissions, InMemoryRoles};
    use crate::types::{ChatAccountId, GameAccountId, PermissionNode};
    use std::collections::BTreeSet;
    use std::time::Duration;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn fixture() -> (Arc<InMemoryRoles>, Arc<InMemoryPermissions>, BulkReconciler) {
        let roles = Arc::new(InMemoryRoles::new());
        let permissions = Arc::new(InMemoryPermissions::new());
        let reconciler = BulkReconciler::new(GroupSynchronizer::new(permissions.clone()), roles.clone());
        (roles, permissions, reconciler)
    }

    #[tokio::test]
    async fn test_middle_lookup_failure_does_not_abort_batch() {
        let (roles, permissions, reconciler) = fixture();
        let mapping = RoleMapping::build(["mod staff", "vip vip"]);
        let identities: Vec<LinkedIdentity> = (1..=3)
            .map(|n| LinkedIdentity::new(GameAccountId::new(), n.to_string()))
            .collect();
        for identity in &identities {
            roles.set_roles(identity.chat_id.clone(), ["vip"]);
        }
        roles.fail_lookups_for(ChatAccountId::new("2"));

        let results = reconciler.reconcile_all(identities.clone(), &mapping).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].identity, identities[0]);
        assert_eq!(results[0].added, set(&["vip"]));
        assert!(results[1].lookup_failed());
        assert!(results[1].is_noop());
        assert_eq!(results[2].identity, identities[2]);
        assert_eq!(results[2].added, set(&["vip"]));
        assert!(permissions.nodes(identities[1].game_id).is_empty());
    }

    #[tokio::test]
    async fn test_group_lookup_failure_is_recorded() {
        let (roles, permissions, reconciler) = fixture();
        let identity = LinkedIdentity::new(GameAccountId::new(), "9");
        roles.set_roles(identity.chat_id.clone(), ["mod"]);
        permissions.fail_lookups_for(identity.game_id);

        let result = reconciler
            .reconcile_one(identity, &RoleMapping::build(["mod staff"]))
            .await;

        assert!(result.lookup_failed());
        assert!(permissions.calls().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_workers_keep_input_order() {
        let (roles, permissions, reconciler) = fixture();
        let reconciler = reconciler.with_workers(4);
        let mapping = RoleMapping::build(["mod staff", "vip vip"]);
        let identities: Vec<LinkedIdentity> = (0..10)
            .map(|n| LinkedIdentity::new(GameAccountId::new(), format!("member-{n}")))
            .collect();
        for (n, identity) in identities.iter().enumerate() {
            let role = if n % 2 == 0 { "mod" } else { "vip" };
            roles.set_roles(identity.chat_id.clone(), [role]);
            permissions.set_nodes(identity.game_id, vec![PermissionNode::group("vip")]);
        }

        let results = reconciler.reconcile_all(identities.clone(), &mapping).await;

        let order: Vec<&LinkedIdentity> = results.iter().map(|r| &r.identity).collect();
        assert_eq!(order, identities.iter().collect::<Vec<_>>());
        let summary = ReconcileSummary::from_results(&results);
        assert_eq!(summary.identities, 10);
        assert_eq!(summary.changed, 5);
        assert_eq!(summary.groups_added, 5);
        assert_eq!(summary.groups_removed, 5);

        let second = reconciler.reconcile_all(identities, &mapping).await;
        assert!(second.iter().all(Reconciliation::is_noop));
    }

    #[tokio::test]
    async fn test_zero_workers_still_progresses() {
        let (_, _, reconciler) = fixture();
        let reconciler = reconciler.with_workers(0);
        let identity = LinkedIdentity::new(GameAccountId::new(), "1");

        let results = reconciler
            .reconcile_all(vec![identity], &RoleMapping::default())
            .await;
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_member_without_roles_loses_managed_groups() {
        let (_, permissions, reconciler) = fixture();
        let identity = LinkedIdentity::new(GameAccountId::new(), "left-the-guild");
        permissions.set_nodes(
            identity.game_id,
            vec![PermissionNode::group("staff"), PermissionNode::group("admin")],
        );

        let result = reconciler
            .reconcile_one(identity.clone(), &RoleMapping::build(["mod staff"]))
            .await;

        assert_eq!(result.removed, set(&["staff"]));
        assert_eq!(
            permissions.nodes(identity.game_id),
            vec![PermissionNode::group("admin")]
        );
    }

    #[tokio::test]
    async fn test_role_lookup_timeout_becomes_lookup_failure() {
        struct SlowRoles;

        #[async_trait::async_trait]
        impl ChatRoleService for SlowRoles {
            async fn current_roles(
                &self,
                _: &ChatAccountId,
            ) -> Result<BTreeSet<String>, crate::ServiceError> {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(BTreeSet::new())
            }
        }

        let permissions = Arc::new(InMemoryPermissions::new());
        let synchronizer =
            GroupSynchronizer::new(permissions).with_call_timeout(Some(Duration::from_millis(10)));
        let reconciler = BulkReconciler::new(synchronizer, Arc::new(SlowRoles));

        let result = reconciler
            .reconcile_one(LinkedIdentity::new(GameAccountId::new(), "1"), &RoleMapping::default())
            .await;

        assert!(matches!(
            result.failures.as_slice(),
            [SyncError::LookupFailure {
                stage: LookupStage::Roles,
                source: crate::ServiceError::TimedOut(_),
                ..
            }]
        ));
    }
}
