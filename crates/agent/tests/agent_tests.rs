//! Agent configuration, the reachability probe and a full run against the
//! in-process backend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use tokio_util::sync::CancellationToken;

use continuity_agent::config::{AgentConfig, AgentConfigError};
use continuity_agent::{probe, runner};
use continuity_core::model::{Character, ProjectState};
use continuity_core::{SyncCategory, Table};
use continuity_db::MemoryRowStore;
use continuity_realtime::{MemoryChangeFeed, PresenceRegistry};
use continuity_storage::{MemoryObjectStore, PhotoBlobCache};
use continuity_sync::{
    load_state_file, save_state_file, Connectivity, ConnectivityMonitor, PersistedState,
    SyncMetadata, SyncPolicy, SyncServices,
};

fn env(overrides: &[(&str, &str)]) -> HashMap<String, String> {
    let mut vars: HashMap<String, String> = [
        ("DATABASE_URL", "postgres://localhost/continuity"),
        ("REALTIME_WS_URL", "ws://localhost:4000/realtime/v1"),
        ("STORAGE_URL", "http://localhost:5000/storage/v1"),
        ("PROJECT_ID", "5b0f8f6e-3c1a-4f53-9a8e-2d6f0f6f1b11"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in overrides {
        vars.insert(k.to_string(), v.to_string());
    }
    vars
}

fn load(vars: &HashMap<String, String>) -> Result<AgentConfig, AgentConfigError> {
    AgentConfig::from_lookup(|name| vars.get(name).cloned())
}

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[test]
fn minimal_environment_uses_defaults() {
    let config = load(&env(&[])).unwrap();
    assert_eq!(config.storage_bucket, "continuity");
    assert_eq!(config.client_name, "continuity-agent");
    assert_eq!(config.probe_interval, Duration::from_secs(10));
    assert_eq!(config.state_file.to_str(), Some("continuity-state.json"));
    assert!(config.access_token.is_none());
    assert_eq!(config.sync.policy, SyncPolicy::Automatic);
}

#[test]
fn sync_variables_pass_through() {
    let config = load(&env(&[("SYNC_POLICY", "manual"), ("CLIENT_NAME", "trailer-2")])).unwrap();
    assert_eq!(config.sync.policy, SyncPolicy::Manual);
    assert_eq!(config.client_name, "trailer-2");
}

#[test]
fn missing_project_is_rejected() {
    let mut vars = env(&[]);
    vars.remove("PROJECT_ID");
    assert_matches!(load(&vars), Err(AgentConfigError::Missing("PROJECT_ID")));
}

#[test]
fn malformed_values_are_rejected() {
    assert_matches!(
        load(&env(&[("PROJECT_ID", "not-a-uuid")])),
        Err(AgentConfigError::Invalid { var: "PROJECT_ID", .. })
    );
    assert_matches!(
        load(&env(&[("PROBE_INTERVAL_SECS", "0")])),
        Err(AgentConfigError::Invalid { var: "PROBE_INTERVAL_SECS", .. })
    );
    assert_matches!(
        load(&env(&[("SYNC_POLICY", "sometimes")])),
        Err(AgentConfigError::Sync(_))
    );
}

// ---------------------------------------------------------------------------
// Probe
// ---------------------------------------------------------------------------

#[tokio::test]
async fn probe_follows_backend_reachability() {
    let rows = Arc::new(MemoryRowStore::new());
    assert_eq!(probe::check(rows.as_ref(), Duration::from_secs(1)).await, Connectivity::Online);

    let monitor = Arc::new(ConnectivityMonitor::new(Connectivity::Offline));
    let cancel = CancellationToken::new();
    let task = tokio::spawn(probe::run(
        rows.clone(),
        Arc::clone(&monitor),
        Duration::from_millis(20),
        cancel.clone(),
    ));

    eventually("online", || monitor.current() == Connectivity::Online).await;
    rows.set_unreachable(true);
    eventually("offline", || monitor.current() == Connectivity::Offline).await;
    rows.set_unreachable(false);
    eventually("online again", || monitor.current() == Connectivity::Online).await;

    cancel.cancel();
    task.await.unwrap();
}

// ---------------------------------------------------------------------------
// Full run
// ---------------------------------------------------------------------------

#[tokio::test]
async fn restored_pending_edits_are_pushed_and_saved() {
    let rows = Arc::new(MemoryRowStore::new());
    let project_id = rows.create_project("Feature");
    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("state.json");

    // An earlier run left an unpushed character behind.
    let mut state = ProjectState::new(project_id);
    Arc::make_mut(&mut state.characters).push(Character::new("Lorelai Gilmore"));
    let meta = SyncMetadata {
        pending: [SyncCategory::Characters].into_iter().collect(),
        ..SyncMetadata::default()
    };
    save_state_file(&state_file, &PersistedState { state, meta })
        .await
        .unwrap();

    let project = project_id.to_string();
    let state_path = state_file.to_string_lossy().into_owned();
    let vars = env(&[
        ("PROJECT_ID", project.as_str()),
        ("STATE_FILE", state_path.as_str()),
        ("PROBE_INTERVAL_SECS", "1"),
    ]);
    let config = load(&vars).unwrap();

    let services = SyncServices {
        rows: rows.clone(),
        feed: Arc::new(MemoryChangeFeed::new(rows.clone(), PresenceRegistry::new())),
        objects: Arc::new(MemoryObjectStore::new()),
        cache: PhotoBlobCache::open(dir.path().join("photos")).await.unwrap(),
    };

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let agent = tokio::spawn(runner::run(config, services, async {
        let _ = stop_rx.await;
    }));

    eventually("character pushed", || rows.row_count(Table::Characters) == 1).await;
    // Let the push finish clearing its pending mark.
    tokio::time::sleep(Duration::from_millis(200)).await;
    stop_tx.send(()).unwrap();
    agent.await.unwrap();

    let saved = load_state_file(&state_file).await.unwrap();
    assert_eq!(saved.state.characters[0].name, "Lorelai Gilmore");
    assert!(saved.meta.pending.is_empty());
    assert!(saved.meta.last_pushed_at.is_some());
}

#[tokio::test]
async fn state_file_for_another_project_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("state.json");
    let mut other = ProjectState::new(uuid::Uuid::new_v4());
    Arc::make_mut(&mut other.characters).push(Character::new("Emily Gilmore"));
    save_state_file(
        &state_file,
        &PersistedState {
            state: other,
            meta: SyncMetadata::default(),
        },
    )
    .await
    .unwrap();

    let state_path = state_file.to_string_lossy().into_owned();
    let config = load(&env(&[("STATE_FILE", state_path.as_str())])).unwrap();
    let (store, meta) = runner::open_store(&config).await;
    assert_eq!(store.project_id(), config.project_id);
    assert!(store.snapshot().is_blank());
    assert!(meta.is_none());
}
