use async_trait::async_trait;
use bridge_plugin::*;
use link_sync::memory::{InMemoryDirectory, InMemoryPermissions, InMemoryRoles};
use link_sync::{
    AccountRef, ChatAccountId, GameAccountId, LinkedIdentity, LookupStage, PermissionNode,
    ServiceError, SyncError, SyncMode,
};
use std::collections::BTreeSet;
use std::sync::Arc;

struct NoIcons;

#[async_trait]
impl IconFetcher for NoIcons {
    async fn fetch(&self, url: &str) -> Result<Icon, ServiceError> {
        Err(ServiceError::Unavailable(format!("offline: {url}")))
    }
}

struct Harness {
    directory: Arc<InMemoryDirectory>,
    roles: Arc<InMemoryRoles>,
    permissions: Arc<InMemoryPermissions>,
    plugin: BridgePlugin,
}

impl Harness {
    fn new() -> Self {
        let directory = Arc::new(InMemoryDirectory::new());
        let roles = Arc::new(InMemoryRoles::new());
        let permissions = Arc::new(InMemoryPermissions::new());
        let plugin = BridgePlugin::new(Services {
            directory: directory.clone(),
            roles: roles.clone(),
            permissions: permissions.clone(),
            icons: Arc::new(NoIcons),
        });
        Self {
            directory,
            roles,
            permissions,
            plugin,
        }
    }

    fn groups(&self, game_id: GameAccountId) -> BTreeSet<String> {
        self.permissions
            .nodes(game_id)
            .iter()
            .filter_map(|node| node.group_name().map(str::to_string))
            .collect()
    }
}

fn settings(groups: &[&str]) -> BridgeSettings {
    let mut settings = BridgeSettings::default();
    settings.bot_token = Some("test-token".to_string());
    settings.group_linker.enabled = true;
    settings.group_linker.groups = groups.iter().map(|s| s.to_string()).collect();
    settings
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_full_lifecycle() {
    let harness = Harness::new();
    let steve = LinkedIdentity::new(GameAccountId::new(), "111");
    let alex = LinkedIdentity::new(GameAccountId::new(), "222");
    harness.directory.link(steve.clone());
    harness.directory.link(alex.clone());
    harness.roles.set_roles(steve.chat_id.clone(), ["Moderator", "Helper"]);
    harness.roles.set_roles(alex.chat_id.clone(), ["Supporter"]);
    harness.permissions.set_nodes(
        alex.game_id,
        vec![PermissionNode::group("admin"), PermissionNode::group("staff")],
    );

    // Startup reconciles everyone
    let report = harness
        .plugin
        .init(settings(&["Moderator staff", "Helper staff", "Supporter vip"]))
        .await
        .expect("init");
    assert!(report.is_clean());
    assert_eq!(harness.groups(steve.game_id), set(&["staff"]));
    assert_eq!(harness.groups(alex.game_id), set(&["admin", "vip"]));

    // Nothing changed, so a reload issues no calls
    harness.permissions.clear_calls();
    let report = harness
        .plugin
        .reload(settings(&["Moderator staff", "Helper staff", "Supporter vip"]))
        .await
        .expect("reload");
    let outcome = report.outcome(GroupLinker::NAME).expect("group linker ran");
    assert!(outcome.reconciliations().iter().all(|r| r.is_noop()));
    assert!(harness.permissions.calls().is_empty());

    // Role change on Discord
    harness.roles.set_roles(steve.chat_id.clone(), ["Supporter"]);
    harness
        .plugin
        .dispatch(BridgeEvent::MemberRolesChanged {
            chat_id: steve.chat_id.clone(),
        })
        .await
        .expect("dispatch");
    assert_eq!(harness.groups(steve.game_id), set(&["vip"]));

    // Unlink clears managed groups but leaves admin alone
    let removed = harness
        .directory
        .unlink(&AccountRef::Chat(alex.chat_id.clone()))
        .expect("alex was linked");
    harness
        .plugin
        .dispatch(BridgeEvent::AccountUnlinked(removed))
        .await
        .expect("dispatch");
    assert_eq!(harness.groups(alex.game_id), set(&["admin"]));

    harness.plugin.shutdown().await.expect("shutdown");
    assert!(!harness.plugin.is_running().await);
}

#[tokio::test]
async fn test_reload_with_new_mapping_moves_players() {
    let harness = Harness::new();
    let steve = LinkedIdentity::new(GameAccountId::new(), "333");
    harness.directory.link(steve.clone());
    harness.roles.set_roles(steve.chat_id.clone(), ["Moderator"]);

    harness
        .plugin
        .init(settings(&["Moderator staff"]))
        .await
        .expect("init");
    assert_eq!(harness.groups(steve.game_id), set(&["staff"]));

    // "staff" is no longer managed after the reload, so it stays
    harness
        .plugin
        .reload(settings(&["Moderator moderator"]))
        .await
        .expect("reload");
    assert_eq!(harness.groups(steve.game_id), set(&["staff", "moderator"]));
}

#[tokio::test]
async fn test_reset_mode_regrants_unchanged_groups() {
    let harness = Harness::new();
    let steve = LinkedIdentity::new(GameAccountId::new(), "444");
    harness.directory.link(steve.clone());
    harness.roles.set_roles(steve.chat_id.clone(), ["Moderator"]);
    harness
        .permissions
        .set_nodes(steve.game_id, vec![PermissionNode::group("staff")]);

    let mut settings = settings(&["Moderator staff"]);
    settings.group_linker.mode = SyncMode::Reset;
    harness.plugin.init(settings).await.expect("init");

    let calls = harness.permissions.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(harness.groups(steve.game_id), set(&["staff"]));
}

#[tokio::test]
async fn test_failures_stay_inside_the_report() {
    let harness = Harness::new();
    let steve = LinkedIdentity::new(GameAccountId::new(), "555");
    let alex = LinkedIdentity::new(GameAccountId::new(), "666");
    harness.directory.link(steve.clone());
    harness.directory.link(alex.clone());
    harness.roles.set_roles(steve.chat_id.clone(), ["Moderator"]);
    harness.roles.set_roles(alex.chat_id.clone(), ["Moderator"]);
    harness.roles.fail_lookups_for(ChatAccountId::new("555"));

    let report = harness
        .plugin
        .init(settings(&["Moderator staff"]))
        .await
        .expect("init");

    assert!(report.is_clean());
    let results = report
        .outcome(GroupLinker::NAME)
        .expect("group linker ran")
        .reconciliations();
    assert!(results[0].lookup_failed());
    assert_eq!(results[1].added, set(&["staff"]));

    // A dead identity store fails the feature, not the plugin
    harness.directory.set_unavailable(true);
    let report = harness
        .plugin
        .dispatch(BridgeEvent::PlayerJoined {
            game_id: steve.game_id,
        })
        .await
        .expect("dispatch");
    assert_eq!(report.failures.len(), 1);
    match &report.failures[0].1 {
        PluginError::Sync(SyncError::LookupFailure {
            account,
            stage,
            source,
        }) => {
            assert_eq!(account, &AccountRef::Game(steve.game_id));
            assert_eq!(*stage, LookupStage::Identity);
            assert!(matches!(source, ServiceError::Unavailable(_)));
        }
        other => panic!("expected an identity lookup failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_lifecycle_errors() {
    let harness = Harness::new();

    assert!(matches!(
        harness.plugin.dispatch(BridgeEvent::PlayerJoined {
            game_id: GameAccountId::new()
        })
        .await,
        Err(PluginError::NotRunning)
    ));
    assert!(matches!(
        harness.plugin.shutdown().await,
        Err(PluginError::NotRunning)
    ));

    harness.plugin.init(settings(&[])).await.expect("init");
    assert!(matches!(
        harness.plugin.init(settings(&[])).await,
        Err(PluginError::InitializationFailed(_))
    ));
    assert!(harness.plugin.feature(GroupLinker::NAME).await.is_ok());
    assert!(matches!(
        harness.plugin.feature("broadcaster").await,
        Err(PluginError::FeatureNotFound(_))
    ));
}

#[tokio::test]
async fn test_icons_go_through_context() {
    let harness = Harness::new();
    let mut settings = settings(&[]);
    settings.icon_storage.enabled = true;
    harness.plugin.init(settings).await.expect("init");

    let context = harness.plugin.context().await.expect("running");
    let user = ChatUser {
        id: ChatAccountId::new("777"),
        avatar_id: Some("avatar".to_string()),
        avatar_url: Some("https://cdn.test/avatar.png".to_string()),
    };
    // Fetcher is offline, so nothing is returned and nothing is cached
    assert!(context.icon_for_chat_user(&user).await.is_none());
    assert_eq!(context.icons().cached(), (0, 0));
}
