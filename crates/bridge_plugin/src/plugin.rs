//! Plugin lifecycle: init, reload, event dispatch and shutdown.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::context::{BridgeContext, Services};
use crate::error::PluginError;
use crate::events::BridgeEvent;
use crate::feature::{enabled_features, Feature, FeatureOutcome};
use crate::settings::BridgeSettings;

/// Per-feature results of a reload or dispatch.
///
/// A failing feature is logged and listed in `failures`; the others still run.
#[derive(Debug, Default)]
pub struct PluginReport {
    pub outcomes: Vec<(String, FeatureOutcome)>,
    pub failures: Vec<(String, PluginError)>,
}

impl PluginReport {
    pub fn outcome(&self, feature: &str) -> Option<&FeatureOutcome> {
        self.outcomes
            .iter()
            .find(|(name, _)| name == feature)
            .map(|(_, outcome)| outcome)
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, feature: &str, result: Result<FeatureOutcome, PluginError>) {
        match result {
            Ok(outcome) => self.outcomes.push((feature.to_string(), outcome)),
            Err(e) => self.failures.push((feature.to_string(), e)),
        }
    }
}

/// State that only exists between `init()` and `shutdown()`.
struct Running {
    context: Arc<BridgeContext>,
    features: Vec<Arc<dyn Feature>>,
}

/// The bridge as seen by its host.
///
/// The host creates one instance with its platform services, calls
/// [`init`](Self::init) once the server is up, [`reload`](Self::reload) when
/// the config changes, [`dispatch`](Self::dispatch) for every relevant
/// platform event and [`shutdown`](Self::shutdown) on disable.
pub struct BridgePlugin {
    services: Services,
    running: RwLock<Option<Running>>,
}

impl BridgePlugin {
    pub const NAME: &'static str = "kubecity_bridge";

    pub fn new(services: Services) -> Self {
        Self {
            services,
            running: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        Self::NAME
    }

    pub fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    pub async fn is_running(&self) -> bool {
        self.running.read().await.is_some()
    }

    /// Creates the shared context and runs the first reload.
    pub async fn init(&self, settings: BridgeSettings) -> Result<PluginReport, PluginError> {
        {
            let mut running = self.running.write().await;
            if running.is_some() {
                return Err(PluginError::InitializationFailed(format!(
                    "{} is already running",
                    Self::NAME
                )));
            }

            let features = enabled_features(&settings);
            let context = Arc::new(BridgeContext::new(settings, self.services.clone()));
            *running = Some(Running { context, features });
        }

        info!("{} v{} starting", Self::NAME, self.version());
        self.reload_features().await
    }

    /// Applies new settings, rebuilds the feature list and reloads every feature.
    pub async fn reload(&self, settings: BridgeSettings) -> Result<PluginReport, PluginError> {
        {
            let mut running = self.running.write().await;
            let state = running.as_mut().ok_or(PluginError::NotRunning)?;
            state.features = enabled_features(&settings);
            state.context.apply_settings(settings);
        }

        self.reload_features().await
    }

    async fn reload_features(&self) -> Result<PluginReport, PluginError> {
        let (context, features) = self.snapshot().await?;
        let mut report = PluginReport::default();

        info!(features = features.len(), "Reloading features");
        for feature in &features {
            let result = feature.reload(&context).await;
            if let Err(e) = &result {
                error!(feature = feature.name(), error = %e, "Feature reload failed");
            }
            report.record(feature.name(), result);
        }

        Ok(report)
    }

    /// Passes an event to every feature.
    pub async fn dispatch(&self, event: BridgeEvent) -> Result<PluginReport, PluginError> {
        let (context, features) = self.snapshot().await?;
        let mut report = PluginReport::default();

        debug!(event = event.kind(), "Dispatching bridge event");
        for feature in &features {
            let result = feature.handle(&event, &context).await;
            if let Err(e) = &result {
                warn!(feature = feature.name(), event = event.kind(), error = %e, "Feature failed to handle event");
            }
            report.record(feature.name(), result);
        }

        Ok(report)
    }

    /// Saves every feature and tears down the shared context.
    pub async fn shutdown(&self) -> Result<(), PluginError> {
        let Some(state) = self.running.write().await.take() else {
            return Err(PluginError::NotRunning);
        };

        for feature in &state.features {
            if let Err(e) = feature.save(&state.context).await {
                error!(feature = feature.name(), error = %e, "Feature failed to save");
            }
        }
        state.context.icons().clear();

        info!("{} stopped", Self::NAME);
        Ok(())
    }

    /// Shared context, while running.
    pub async fn context(&self) -> Option<Arc<BridgeContext>> {
        self.running
            .read()
            .await
            .as_ref()
            .map(|state| state.context.clone())
    }

    /// Looks up an enabled feature by name.
    pub async fn feature(&self, name: &str) -> Result<Arc<dyn Feature>, PluginError> {
        let (_, features) = self.snapshot().await?;
        features
            .into_iter()
            .find(|feature| feature.name() == name)
            .ok_or_else(|| PluginError::FeatureNotFound(name.to_string()))
    }

    async fn snapshot(&self) -> Result<(Arc<BridgeContext>, Vec<Arc<dyn Feature>>), PluginError> {
        let running = self.running.read().await;
        let state = running.as_ref().ok_or(PluginError::NotRunning)?;
        Ok((state.context.clone(), state.features.clone()))
    }
}
