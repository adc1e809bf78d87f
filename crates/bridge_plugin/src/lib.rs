//! # Bridge Plugin
//!
//! The part of the KubeCity bridge that lives inside the game server. It
//! owns a [`BridgeContext`] for its whole lifetime, builds the features
//! enabled in [`BridgeSettings`] and routes [`BridgeEvent`]s to them.
//!
//! The only feature with real logic is the [`GroupLinker`], which keeps
//! permission groups in line with Discord roles through [`link_sync`].
//!
//! ## Lifecycle
//!
//! 1. **Creation**: `BridgePlugin::new(services)` with the host's platform handles
//! 2. **Initialization**: `init(settings)` builds the context and reloads every feature
//! 3. **Operation**: `dispatch(event)` for link, join and role-change callbacks
//! 4. **Reload**: `reload(settings)` swaps settings and rebuilds the features
//! 5. **Shutdown**: `shutdown()` saves features and drops the context

pub mod context;
pub mod error;
pub mod events;
pub mod feature;
pub mod group_linker;
pub mod icons;
pub mod plugin;
pub mod settings;

pub use context::{BridgeContext, Services};
pub use error::PluginError;
pub use events::BridgeEvent;
pub use feature::{enabled_features, Feature, FeatureOutcome};
pub use group_linker::GroupLinker;
pub use icons::{ChatUser, Icon, IconFetcher, IconStore};
pub use plugin::{BridgePlugin, PluginReport};
pub use settings::{
    BridgeSettings, GroupLinkerSettings, IconStorageSettings, SyncSettings, DEFAULT_AVATAR_URL,
};
