//! Standalone host for the KubeCity bridge plugin.
//!
//! Loads the TOML configuration and a JSON snapshot of links, guild roles
//! and permission nodes, runs the plugin against it and writes the resulting
//! permission nodes back. With `--watch` it stays up and reloads on SIGHUP.

mod config;
mod logging;
mod snapshot;

use async_trait::async_trait;
use bridge_plugin::{BridgePlugin, Icon, IconFetcher, PluginReport, Services};
use clap::{Arg, Command};
use link_sync::{ReconcileSummary, ServiceError};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::logging::setup_logging;
use crate::snapshot::{Snapshot, SnapshotServices};

// ============================================================================
// CLI Interface
// ============================================================================

/// Command line arguments
#[derive(Debug, Clone)]
pub struct CliArgs {
    pub config_path: PathBuf,
    pub data_path: Option<PathBuf>,
    pub log_level: Option<String>,
    pub json_logs: bool,
    pub dry_run: bool,
    pub watch: bool,
}

impl CliArgs {
    /// Parse command line arguments
    pub fn parse() -> Self {
        let matches = Command::new("KubeCity Bridge")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Synchronizes Discord roles with Minecraft permission groups")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path")
                    .default_value("config.toml"),
            )
            .arg(
                Arg::new("data")
                    .short('d')
                    .long("data")
                    .value_name("FILE")
                    .help("Snapshot file with links, member roles and permissions"),
            )
            .arg(
                Arg::new("log-level")
                    .short('l')
                    .long("log-level")
                    .value_name("LEVEL")
                    .help("Log level (trace, debug, info, warn, error)"),
            )
            .arg(
                Arg::new("json-logs")
                    .long("json-logs")
                    .help("Output logs in JSON format")
                    .action(clap::ArgAction::SetTrue),
            )
            .arg(
                Arg::new("dry-run")
                    .long("dry-run")
                    .help("Do not write permission changes back to the snapshot")
                    .action(clap::ArgAction::SetTrue),
            )
            .arg(
                Arg::new("watch")
                    .short('w')
                    .long("watch")
                    .help("Keep running; reload on SIGHUP, stop on SIGINT/SIGTERM")
                    .action(clap::ArgAction::SetTrue),
            )
            .get_matches();

        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("config.toml")),
            data_path: matches.get_one::<String>("data").map(PathBuf::from),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
            dry_run: matches.get_flag("dry-run"),
            watch: matches.get_flag("watch"),
        }
    }
}

/// Loads the config file and applies command line overrides.
async fn load_config(args: &CliArgs) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let mut config = AppConfig::load_from_file(&args.config_path).await?;

    if let Some(data_path) = &args.data_path {
        config.storage.data_file = data_path.to_string_lossy().to_string();
    }
    if let Some(log_level) = &args.log_level {
        config.logging.level = log_level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }

    config
        .validate()
        .map_err(|e| format!("Configuration validation failed: {e}"))?;
    Ok(config)
}

// ============================================================================
// Signal Handling
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostSignal {
    Reload,
    Shutdown,
}

/// Signal listeners for watch mode. Registered once; signals that arrive
/// between two `recv` calls are queued.
struct HostSignals {
    #[cfg(unix)]
    hangup: signal::unix::Signal,
    #[cfg(unix)]
    interrupt: signal::unix::Signal,
    #[cfg(unix)]
    terminate: signal::unix::Signal,
}

impl HostSignals {
    fn install() -> std::io::Result<Self> {
        #[cfg(unix)]
        {
            use signal::unix::{signal, SignalKind};

            Ok(Self {
                hangup: signal(SignalKind::hangup())?,
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
            })
        }

        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    async fn recv(&mut self) -> std::io::Result<HostSignal> {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.hangup.recv() => {
                    info!("📡 Received SIGHUP");
                    Ok(HostSignal::Reload)
                }
                _ = self.interrupt.recv() => {
                    info!("📡 Received SIGINT");
                    Ok(HostSignal::Shutdown)
                }
                _ = self.terminate.recv() => {
                    info!("📡 Received SIGTERM");
                    Ok(HostSignal::Shutdown)
                }
            }
        }

        #[cfg(not(unix))]
        {
            signal::ctrl_c().await?;
            info!("📡 Received Ctrl+C");
            Ok(HostSignal::Shutdown)
        }
    }
}

// ============================================================================
// Application
// ============================================================================

/// Avatar fetcher for standalone runs, where there is no HTTP client.
struct OfflineIcons;

#[async_trait]
impl IconFetcher for OfflineIcons {
    async fn fetch(&self, url: &str) -> Result<Icon, ServiceError> {
        Err(ServiceError::Unavailable(format!(
            "avatar downloads are not available in standalone mode ({url})"
        )))
    }
}

pub struct Application {
    args: CliArgs,
    config: AppConfig,
    snapshot: Snapshot,
    services: SnapshotServices,
    plugin: BridgePlugin,
}

impl Application {
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        // Config comes first so logging can honor its settings
        let config = load_config(&args).await?;
        if let Err(e) = setup_logging(&config.logging) {
            // A subscriber may already be installed by an embedding host
            eprintln!("⚠️ {e}");
        }

        let data_path = PathBuf::from(&config.storage.data_file);
        let snapshot = Snapshot::load(&data_path).await?;
        let services = snapshot.services();
        let plugin = BridgePlugin::new(Services {
            directory: services.directory.clone(),
            roles: services.roles.clone(),
            permissions: services.permissions.clone(),
            icons: Arc::new(OfflineIcons),
        });

        info!(
            "📂 Config: {} | Data: {} | {} links",
            args.config_path.display(),
            data_path.display(),
            snapshot.links.len()
        );

        Ok(Self {
            args,
            config,
            snapshot,
            services,
            plugin,
        })
    }

    pub async fn run(mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!(
            "🚀 {} v{} starting",
            self.plugin.name(),
            self.plugin.version()
        );

        let report = self.plugin.init(self.config.to_bridge_settings()).await?;
        log_report(&report);
        self.persist().await?;

        if self.args.watch {
            let mut signals = HostSignals::install()?;
            info!("✅ Bridge is running, send SIGHUP to reload");
            loop {
                match signals.recv().await? {
                    HostSignal::Reload => self.reload().await?,
                    HostSignal::Shutdown => break,
                }
            }
        }

        self.plugin.shutdown().await?;
        info!("✅ Bridge shutdown complete");
        Ok(())
    }

    async fn reload(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🔄 Reloading configuration");
        match load_config(&self.args).await {
            Ok(config) => self.config = config,
            Err(e) => {
                error!("❌ Keeping previous configuration: {}", e);
                return Ok(());
            }
        }

        let report = self.plugin.reload(self.config.to_bridge_settings()).await?;
        log_report(&report);
        self.persist().await
    }

    async fn persist(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if self.args.dry_run {
            info!("Dry run, snapshot left untouched");
            return Ok(());
        }

        self.snapshot.capture_permissions(&self.services.permissions);
        let path = PathBuf::from(&self.config.storage.data_file);
        self.snapshot.save(&path).await?;
        info!("💾 Saved permissions to {}", path.display());
        Ok(())
    }
}

fn log_report(report: &PluginReport) {
    for (feature, outcome) in &report.outcomes {
        let results = outcome.reconciliations();
        if results.is_empty() {
            continue;
        }

        let summary = ReconcileSummary::from_results(results);
        info!(
            "📊 {}: {} accounts, {} changed, +{} / -{} groups",
            feature, summary.identities, summary.changed, summary.groups_added, summary.groups_removed
        );
        for result in results.iter().filter(|result| !result.is_clean()) {
            for failure in &result.failures {
                warn!("  {}: {}", result.identity, failure);
            }
        }
    }

    for (feature, e) in &report.failures {
        error!("❌ Feature {} failed: {}", feature, e);
    }
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("❌ Failed to start application: {:?}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use link_sync::{GameAccountId, LinkedIdentity, PermissionNode};
    use tempfile::TempDir;

    fn args(dir: &TempDir, dry_run: bool) -> CliArgs {
        CliArgs {
            config_path: dir.path().join("config.toml"),
            data_path: Some(dir.path().join("data.json")),
            log_level: Some("debug".to_string()),
            json_logs: false,
            dry_run,
            watch: false,
        }
    }

    async fn write_fixture(dir: &TempDir) -> GameAccountId {
        let config = r#"
[bot]
token = "test-token"

[group_linker]
use = true
groups = ["Moderator staff", "Supporter vip"]

[icon_storage]
use = false

[logging]
level = "info"
json_format = false
"#;
        tokio::fs::write(dir.path().join("config.toml"), config)
            .await
            .unwrap();

        let game_id = GameAccountId::new();
        let mut snapshot = Snapshot::default();
        snapshot.links.push(LinkedIdentity::new(game_id, "1001"));
        snapshot
            .members
            .insert("1001".into(), vec!["Moderator".to_string()]);
        snapshot
            .permissions
            .insert(game_id, vec![PermissionNode::group("vip")]);
        snapshot.save(&dir.path().join("data.json")).await.unwrap();
        game_id
    }

    #[cfg(unix)]
    fn send_hangup() {
        let status = std::process::Command::new("kill")
            .args(["-HUP", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_signal_sent_between_receives_is_not_lost() {
        let mut signals = HostSignals::install().unwrap();
        let limit = std::time::Duration::from_secs(5);

        send_hangup();
        let first = tokio::time::timeout(limit, signals.recv()).await.unwrap();
        assert_eq!(first.unwrap(), HostSignal::Reload);

        // Arrives while nothing is waiting, as during a reload
        send_hangup();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let second = tokio::time::timeout(limit, signals.recv()).await.unwrap();
        assert_eq!(second.unwrap(), HostSignal::Reload);
    }

    #[tokio::test]
    async fn test_load_config_applies_overrides() {
        let dir = TempDir::new().unwrap();
        let mut args = args(&dir, true);
        args.json_logs = true;

        let config = load_config(&args).await.unwrap();

        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
        assert!(config.storage.data_file.ends_with("data.json"));
    }

    #[tokio::test]
    async fn test_load_config_rejects_invalid_override() {
        let dir = TempDir::new().unwrap();
        let mut args = args(&dir, true);
        args.log_level = Some("shouting".to_string());

        let error = load_config(&args).await.unwrap_err();
        assert!(error.to_string().contains("Configuration validation failed"));
    }

    #[tokio::test]
    async fn test_run_writes_synchronized_groups() {
        let dir = TempDir::new().unwrap();
        let game_id = write_fixture(&dir).await;

        let app = Application::new(args(&dir, false)).await.unwrap();
        app.run().await.unwrap();

        let saved = Snapshot::load(&dir.path().join("data.json")).await.unwrap();
        assert_eq!(saved.permissions[&game_id], vec![PermissionNode::group("staff")]);
    }

    #[tokio::test]
    async fn test_dry_run_leaves_snapshot_untouched() {
        let dir = TempDir::new().unwrap();
        let game_id = write_fixture(&dir).await;

        let app = Application::new(args(&dir, true)).await.unwrap();
        app.run().await.unwrap();

        let saved = Snapshot::load(&dir.path().join("data.json")).await.unwrap();
        assert_eq!(saved.permissions[&game_id], vec![PermissionNode::group("vip")]);
    }
}
