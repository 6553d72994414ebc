//! Wires the production backends into a sync engine and runs one project
//! until shutdown.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use continuity_core::model::ProjectState;
use continuity_db::{PgRowStore, RowStore};
use continuity_realtime::{RealtimeClient, WsChangeFeed};
use continuity_storage::{HttpObjectStore, PhotoBlobCache, StorageError};
use continuity_sync::{
    load_state_file, Connectivity, ConnectivityMonitor, LocalStore, SyncEngine, SyncMetadata,
    SyncServices,
};

use crate::config::AgentConfig;
use crate::persist;
use crate::probe;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Database pool: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Photo cache: {0}")]
    Cache(#[from] StorageError),
}

/// Production services for `config`. Nothing is contacted yet.
pub async fn connect(config: &AgentConfig) -> Result<SyncServices, AgentError> {
    let pool = continuity_db::create_lazy_pool(&config.database_url)?;

    let mut client = RealtimeClient::new(&config.realtime_ws_url);
    let mut feed_token = None;
    let mut objects = HttpObjectStore::new(&config.storage_url, &config.storage_bucket);
    if let Some(token) = &config.access_token {
        client = client.with_api_key(token);
        feed_token = Some(token.clone());
        objects = objects.with_access_token(token);
    }
    let mut feed = WsChangeFeed::new(client).with_reconnect(config.sync.retry.clone());
    if let Some(token) = feed_token {
        feed = feed.with_access_token(token);
    }

    Ok(SyncServices {
        rows: Arc::new(PgRowStore::new(pool)),
        feed: Arc::new(feed),
        objects: Arc::new(objects),
        cache: PhotoBlobCache::open(&config.photo_cache_dir).await?,
    })
}

/// Local store for `config.project_id`, from the state file when it holds
/// that project, with the sync bookkeeping saved alongside it.
pub async fn open_store(config: &AgentConfig) -> (LocalStore, Option<SyncMetadata>) {
    match load_state_file(&config.state_file).await {
        Some(persisted) if persisted.state.project_id == config.project_id => {
            tracing::info!(path = %config.state_file.display(), "Restored local state");
            (LocalStore::new(persisted.state), Some(persisted.meta))
        }
        Some(_) => {
            tracing::info!(
                path = %config.state_file.display(),
                "State file holds another project, starting empty",
            );
            (LocalStore::new(ProjectState::new(config.project_id)), None)
        }
        None => (LocalStore::new(ProjectState::new(config.project_id)), None),
    }
}

/// Sync `config.project_id` with `services` until `shutdown` resolves.
pub async fn run(
    config: AgentConfig,
    services: SyncServices,
    shutdown: impl Future<Output = ()>,
) {
    let (store, meta) = open_store(&config).await;
    let store = Arc::new(store);
    let rows: Arc<dyn RowStore> = Arc::clone(&services.rows);

    // Offline until the first probe says otherwise.
    let monitor = Arc::new(ConnectivityMonitor::new(Connectivity::Offline));
    let engine = Arc::new(SyncEngine::new(
        services,
        store,
        config.sync.clone(),
        monitor.subscribe(),
    ));
    if let Some(meta) = meta {
        engine.restore(meta);
    }

    let cancel = CancellationToken::new();
    let prober = tokio::spawn(probe::run(
        rows,
        Arc::clone(&monitor),
        config.probe_interval,
        cancel.child_token(),
    ));
    let persister = tokio::spawn(persist::run(
        Arc::clone(&engine),
        config.state_file.clone(),
        persist::DEFAULT_SAVE_DELAY,
        cancel.child_token(),
    ));
    let reporter = tokio::spawn(report_status(Arc::clone(&engine), cancel.child_token()));

    engine.start_sync(config.project_id, config.client_name.clone()).await;
    tracing::info!(
        project_id = %config.project_id,
        client = %config.client_name,
        "Agent running",
    );

    shutdown.await;
    tracing::info!("Shutting down");

    engine.stop_sync().await;
    cancel.cancel();
    let _ = prober.await;
    let _ = reporter.await;
    let _ = persister.await;
}

/// Log status transitions.
async fn report_status(engine: Arc<SyncEngine>, cancel: CancellationToken) {
    let mut status = engine.status();
    let mut last = status.borrow_and_update().clone();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
        let current = status.borrow_and_update().clone();
        if current.status != last.status || current.error != last.error {
            tracing::info!(
                status = ?current.status,
                pending = current.pending_count,
                members = current.online_member_count,
                error = current.error.as_deref().unwrap_or(""),
                "Sync status",
            );
        }
        last = current;
    }
}
