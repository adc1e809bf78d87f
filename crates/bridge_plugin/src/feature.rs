//! Feature trait and the registry that builds features from settings.

use async_trait::async_trait;
use link_sync::Reconciliation;
use std::sync::Arc;
use tracing::warn;

use crate::context::BridgeContext;
use crate::error::PluginError;
use crate::events::BridgeEvent;
use crate::group_linker::GroupLinker;
use crate::settings::BridgeSettings;

/// What a feature did in response to a reload or an event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FeatureOutcome {
    /// The feature had nothing to do
    #[default]
    Ignored,
    /// Permission groups were synchronized for these accounts
    Synchronized(Vec<Reconciliation>),
}

impl FeatureOutcome {
    pub fn reconciliations(&self) -> &[Reconciliation] {
        match self {
            FeatureOutcome::Ignored => &[],
            FeatureOutcome::Synchronized(results) => results,
        }
    }
}

/// A toggleable part of the bridge.
///
/// Features are rebuilt from settings on every plugin reload, then
/// `reload()` is called on each so it can pick up its configuration.
#[async_trait]
pub trait Feature: Send + Sync {
    /// Stable name, matching the config section that enables the feature.
    fn name(&self) -> &str;

    async fn reload(&self, context: &BridgeContext) -> Result<FeatureOutcome, PluginError>;

    async fn handle(
        &self,
        event: &BridgeEvent,
        context: &BridgeContext,
    ) -> Result<FeatureOutcome, PluginError>;

    /// Persist anything the feature owns. Called before shutdown.
    async fn save(&self, _context: &BridgeContext) -> Result<(), PluginError> {
        Ok(())
    }
}

/// Features enabled by `settings`, in a fixed order.
///
/// Features that read from Discord are skipped when no bot token is set.
pub fn enabled_features(settings: &BridgeSettings) -> Vec<Arc<dyn Feature>> {
    let mut features: Vec<Arc<dyn Feature>> = Vec::new();
    let has_bot = settings.bot_token.is_some();

    if settings.group_linker.enabled {
        if has_bot {
            features.push(Arc::new(GroupLinker::new()));
        } else {
            warn!("Discord bot token is not set, group linker stays disabled");
        }
    }

    features
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_group_linker_is_not_built() {
        let settings = BridgeSettings::default();
        assert!(enabled_features(&settings).is_empty());
    }

    #[test]
    fn test_group_linker_needs_bot_token() {
        let mut settings = BridgeSettings::default();
        settings.group_linker.enabled = true;
        assert!(enabled_features(&settings).is_empty());
    }

    #[test]
    fn test_enabled_group_linker_is_built() {
        let mut settings = BridgeSettings::default();
        settings.group_linker.enabled = true;
        settings.bot_token = Some("token".to_string());

        let names: Vec<String> = enabled_features(&settings)
            .iter()
            .map(|feature| feature.name().to_string())
            .collect();
        assert_eq!(names, vec![GroupLinker::NAME.to_string()]);
    }
}
