//! Reconciles one account's permission groups with its chat roles.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{LookupStage, MutationKind, ServiceError, SyncError};
use crate::mapping::RoleMapping;
use crate::services::{with_timeout, PermissionService};
use crate::types::{AccountRef, LinkedIdentity};

/// How managed groups that should stay are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Only touch groups whose membership actually changes.
    #[default]
    Diff,
    /// Revoke every held managed group, then grant every desired one.
    ///
    /// Matches the audit trail of older deployments. Not idempotent in
    /// terms of calls issued, though the end state is the same as `Diff`.
    Reset,
}

/// Groups to revoke and grant for one account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub to_remove: BTreeSet<String>,
    pub to_add: BTreeSet<String>,
}

impl SyncPlan {
    /// Computes the mutations that bring `groups` in line with `roles`.
    ///
    /// Groups outside the mapping's codomain are never scheduled for removal.
    pub fn compute(
        roles: &BTreeSet<String>,
        groups: &BTreeSet<String>,
        mapping: &RoleMapping,
        mode: SyncMode,
    ) -> Self {
        let desired = mapping.desired_groups(roles);
        Self::towards(&desired, groups, mapping, mode)
    }

    /// Plan that removes every managed group and adds nothing.
    pub fn clearing(groups: &BTreeSet<String>, mapping: &RoleMapping) -> Self {
        Self::towards(&BTreeSet::new(), groups, mapping, SyncMode::Diff)
    }

    fn towards(
        desired: &BTreeSet<&str>,
        groups: &BTreeSet<String>,
        mapping: &RoleMapping,
        mode: SyncMode,
    ) -> Self {
        let held_managed = groups.iter().filter(|group| mapping.manages_group(group));

        let to_remove = match mode {
            SyncMode::Diff => held_managed
                .filter(|group| !desired.contains(group.as_str()))
                .cloned()
                .collect(),
            SyncMode::Reset => held_managed.cloned().collect(),
        };

        let to_add = match mode {
            SyncMode::Diff => desired
                .iter()
                .filter(|group| !groups.contains(**group))
                .map(|group| group.to_string())
                .collect(),
            SyncMode::Reset => desired.iter().map(|group| group.to_string()).collect(),
        };

        Self { to_remove, to_add }
    }

    pub fn is_empty(&self) -> bool {
        self.to_remove.is_empty() && self.to_add.is_empty()
    }
}

/// Outcome of a single grant or revoke call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMutation {
    pub group: String,
    pub kind: MutationKind,
    pub outcome: Result<(), ServiceError>,
}

impl GroupMutation {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// What a synchronization run did for one identity.
///
/// `added` and `removed` list every mutation that was attempted, whether or
/// not the permission backend accepted it. Per-call outcomes live in
/// `mutations`; everything that went wrong is also in `failures`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub identity: LinkedIdentity,
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
    pub mutations: Vec<GroupMutation>,
    pub failures: Vec<SyncError>,
}

impl Reconciliation {
    pub fn empty(identity: LinkedIdentity) -> Self {
        Self {
            identity,
            added: BTreeSet::new(),
            removed: BTreeSet::new(),
            mutations: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Result for a run that stopped before mutating anything.
    pub fn failed(identity: LinkedIdentity, error: SyncError) -> Self {
        let mut reconciliation = Self::empty(identity);
        reconciliation.failures.push(error);
        reconciliation
    }

    /// True when no mutation was attempted.
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// True when every lookup and mutation succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn lookup_failed(&self) -> bool {
        self.failures.iter().any(SyncError::is_lookup)
    }

    pub fn failed_groups(&self) -> impl Iterator<Item = &str> {
        self.mutations
            .iter()
            .filter(|mutation| !mutation.succeeded())
            .map(|mutation| mutation.group.as_str())
    }
}

/// Applies role-derived group changes through a [`PermissionService`].
///
/// Every call is attempted once. A failing call is logged, recorded in the
/// returned [`Reconciliation`] and the remaining calls still run.
#[derive(Clone)]
pub struct GroupSynchronizer {
    permissions: Arc<dyn PermissionService>,
    mode: SyncMode,
    call_timeout: Option<Duration>,
}

impl GroupSynchronizer {
    pub fn new(permissions: Arc<dyn PermissionService>) -> Self {
        Self {
            permissions,
            mode: SyncMode::Diff,
            call_timeout: None,
        }
    }

    pub fn with_mode(mut self, mode: SyncMode) -> Self {
        self.mode = mode;
        self
    }

    /// Limit applied to each individual permission-service call.
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout
    }

    /// Reads the account's current groups from the permission service.
    pub async fn current_groups(&self, identity: &LinkedIdentity) -> Result<BTreeSet<String>, SyncError> {
        with_timeout(self.call_timeout, self.permissions.current_groups(identity.game_id))
            .await
            .map_err(|source| SyncError::LookupFailure {
                account: AccountRef::Game(identity.game_id),
                stage: LookupStage::Groups,
                source,
            })
    }

    /// Brings `groups` in line with `roles` for the given identity.
    pub async fn synchronize(
        &self,
        identity: &LinkedIdentity,
        roles: &BTreeSet<String>,
        groups: &BTreeSet<String>,
        mapping: &RoleMapping,
    ) -> Reconciliation {
        let plan = SyncPlan::compute(roles, groups, mapping, self.mode);
        self.apply(identity, plan).await
    }

    /// Removes every managed group from the account. Used when a link is removed.
    pub async fn clear(&self, identity: &LinkedIdentity, mapping: &RoleMapping) -> Reconciliation {
        let groups = match self.current_groups(identity).await {
            Ok(groups) => groups,
            Err(error) => {
                warn!(identity = %identity, error = %error, "Could not read groups, skipping clear");
                return Reconciliation::failed(identity.clone(), error);
            }
        };

        self.apply(identity, SyncPlan::clearing(&groups, mapping)).await
    }

    async fn apply(&self, identity: &LinkedIdentity, plan: SyncPlan) -> Reconciliation {
        let mut reconciliation = Reconciliation::empty(identity.clone());

        if plan.is_empty() {
            debug!(identity = %identity, "Groups already in sync");
            return reconciliation;
        }

        // Revokes go first so two mutually exclusive groups are never held at once
        for group in plan.to_remove {
            self.mutate(identity, group, MutationKind::Revoke, &mut reconciliation)
                .await;
        }
        for group in plan.to_add {
            self.mutate(identity, group, MutationKind::Grant, &mut reconciliation)
                .await;
        }

        info!(
            identity = %identity,
            added = ?reconciliation.added,
            removed = ?reconciliation.removed,
            failures = reconciliation.failures.len(),
            "Synchronized permission groups"
        );

        reconciliation
    }

    async fn mutate(
        &self,
        identity: &LinkedIdentity,
        group: String,
        kind: MutationKind,
        reconciliation: &mut Reconciliation,
    ) {
        let game_id = identity.game_id;
        let outcome = match kind {
            MutationKind::Grant => {
                with_timeout(self.call_timeout, self.permissions.grant(game_id, &group)).await
            }
            MutationKind::Revoke => {
                with_timeout(self.call_timeout, self.permissions.revoke(game_id, &group)).await
            }
        };

        if let Err(source) = &outcome {
            warn!(identity = %identity, group = %group, kind = %kind, error = %source, "Group mutation failed");
            reconciliation.failures.push(SyncError::MutationFailure {
                game_id,
                group: group.clone(),
                kind,
                source: source.clone(),
            });
        }

        match kind {
            MutationKind::Grant => reconciliation.added.insert(group.clone()),
            MutationKind::Revoke => reconciliation.removed.insert(group.clone()),
        };
        reconciliation.mutations.push(GroupMutation { group, kind, outcome });
    }
}
