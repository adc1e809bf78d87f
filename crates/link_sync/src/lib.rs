//! # Link Sync
//!
//! Keeps Minecraft permission groups in line with Discord roles for players
//! who have linked their accounts.
//!
//! ## Overview
//!
//! - [`RoleMapping`] turns config lines such as `"Moderator staff"` into a
//!   role to group table.
//! - [`GroupSynchronizer`] compares one account's roles against its groups
//!   and issues the revokes and grants needed, touching only groups that
//!   appear in the mapping.
//! - [`BulkReconciler`] runs the synchronizer over every linked account.
//!
//! Platform access goes through the traits in [`services`]. Calls are made
//! once; failures are logged and returned inside [`Reconciliation`] rather
//! than raised, so a broken account never blocks the rest.
//!
//! ## Example
//!
//! ```rust
//! use link_sync::*;
//! use link_sync::memory::{InMemoryPermissions, InMemoryRoles};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let roles = Arc::new(InMemoryRoles::new());
//! let permissions = Arc::new(InMemoryPermissions::new());
//! let identity = LinkedIdentity::new(GameAccountId::new(), "1029384756");
//! roles.set_roles(identity.chat_id.clone(), ["Moderator"]);
//!
//! let mapping = RoleMapping::build(["Moderator staff"]);
//! let reconciler = BulkReconciler::new(GroupSynchronizer::new(permissions), roles);
//! let results = reconciler.reconcile_all(vec![identity], &mapping).await;
//! assert!(results[0].added.contains("staff"));
//! # }
//! ```

pub mod error;
pub mod mapping;
pub mod memory;
pub mod reconciler;
pub mod services;
pub mod synchronizer;
pub mod types;

pub use error::{LookupStage, MutationKind, ServiceError, SyncError};
pub use mapping::RoleMapping;
pub use reconciler::{BulkReconciler, ReconcileSummary};
pub use services::{ChatRoleService, ConfigSource, IdentityDirectory, PermissionService};
pub use synchronizer::{GroupMutation, GroupSynchronizer, Reconciliation, SyncMode, SyncPlan};
pub use types::{AccountRef, ChatAccountId, GameAccountId, LinkedIdentity, PermissionNode};
