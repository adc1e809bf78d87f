//! Error types for collaborator calls and synchronization.
//!
//! Nothing in this crate aborts a reconciliation on error. Failures are
//! collected into [`crate::Reconciliation::failures`] and logged, so these
//! types mostly exist to be inspected after the fact.

use std::time::Duration;

use crate::types::{AccountRef, GameAccountId};

/// Error reported by an external collaborator (chat API, permission backend,
/// identity store).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// The backing service could not be reached or refused the call
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    /// The service answered but rejected the request
    #[error("Request rejected: {0}")]
    Rejected(String),
    /// The call did not complete within the configured timeout
    #[error("Call timed out after {0:?}")]
    TimedOut(Duration),
}

/// Which read failed during a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupStage {
    Identity,
    Roles,
    Groups,
}

impl std::fmt::Display for LookupStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LookupStage::Identity => f.write_str("identity"),
            LookupStage::Roles => f.write_str("roles"),
            LookupStage::Groups => f.write_str("groups"),
        }
    }
}

/// Direction of a group mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Grant,
    Revoke,
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MutationKind::Grant => f.write_str("grant"),
            MutationKind::Revoke => f.write_str("revoke"),
        }
    }
}

/// Failure recorded while synchronizing one identity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// Reading the identity, its roles or its groups failed
    #[error("Lookup of {stage} for {account} failed: {source}")]
    LookupFailure {
        account: AccountRef,
        stage: LookupStage,
        #[source]
        source: ServiceError,
    },
    /// A grant or revoke call failed
    #[error("Failed to {kind} group '{group}' for {game_id}: {source}")]
    MutationFailure {
        game_id: GameAccountId,
        group: String,
        kind: MutationKind,
        #[source]
        source: ServiceError,
    },
}

impl SyncError {
    pub fn is_lookup(&self) -> bool {
        matches!(self, SyncError::LookupFailure { .. })
    }
}
