use link_sync::{ServiceError, SyncError};

/// Errors raised by the plugin lifecycle and its features.
///
/// Failures inside a reconciliation are not in here: they are recorded per
/// account in [`link_sync::Reconciliation`] and never abort a feature.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// Plugin initialization failed during startup
    #[error("Plugin initialization failed: {0}")]
    InitializationFailed(String),
    /// The plugin was used before `init()` or after `shutdown()`
    #[error("Plugin is not running")]
    NotRunning,
    /// Requested feature is not enabled
    #[error("Feature not found: {0}")]
    FeatureNotFound(String),
    /// Listing linked accounts for a bulk run failed
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),
    /// Resolving the account an event refers to failed
    #[error("{0}")]
    Sync(#[from] SyncError),
}
