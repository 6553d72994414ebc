//! Fixtures shared by the sync integration tests: one in-process backend
//! (row store, change feed, presence, object store) and any number of
//! clients against it.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use continuity_core::model::ProjectState;
use continuity_core::EntityId;
use continuity_db::MemoryRowStore;
use continuity_realtime::{MemoryChangeFeed, PresenceRegistry};
use continuity_storage::{MemoryObjectStore, PhotoBlobCache};
use continuity_sync::baseline::Baselines;
use continuity_sync::context::SyncContext;
use continuity_sync::inflight::InFlight;
use continuity_sync::status::StatusHandle;
use continuity_sync::{
    ConnectivityMonitor, LocalStore, PullEngine, PushEngine, RealtimeEngine, SyncConfig,
    SyncEngine, SyncServices, SyncState, SyncStatus,
};

/// Upper bound on any wait in these tests.
const WAIT: Duration = Duration::from_secs(10);

pub struct Backend {
    pub rows: Arc<MemoryRowStore>,
    pub presence: Arc<PresenceRegistry>,
    pub objects: Arc<MemoryObjectStore>,
    pub project_id: EntityId,
}

impl Backend {
    pub fn new() -> Self {
        let rows = Arc::new(MemoryRowStore::new());
        let project_id = rows.create_project("Feature");
        Self {
            rows,
            presence: PresenceRegistry::new(),
            objects: Arc::new(MemoryObjectStore::new()),
            project_id,
        }
    }

    async fn services(&self) -> (SyncServices, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let cache = PhotoBlobCache::open(dir.path()).await.unwrap();
        let feed = MemoryChangeFeed::new(self.rows.clone(), self.presence.clone());
        let services = SyncServices {
            rows: self.rows.clone(),
            feed: Arc::new(feed),
            objects: self.objects.clone(),
            cache,
        };
        (services, dir)
    }
}

pub fn config() -> SyncConfig {
    SyncConfig::default().with_debounce(Duration::from_millis(500))
}

// ---------------------------------------------------------------------------
// Full clients
// ---------------------------------------------------------------------------

/// A client running a sync session against the backend.
pub struct Client {
    pub engine: SyncEngine,
    pub connectivity: ConnectivityMonitor,
    cache_dir: TempDir,
}

impl Client {
    /// Start a client and wait until its feed is subscribed.
    pub async fn join(backend: &Backend, name: &str) -> Self {
        Self::join_with(backend, name, config()).await
    }

    pub async fn join_with(backend: &Backend, name: &str, config: SyncConfig) -> Self {
        let (services, cache_dir) = backend.services().await;
        let connectivity = ConnectivityMonitor::default();
        let store = Arc::new(LocalStore::new(ProjectState::new(backend.project_id)));
        let engine = SyncEngine::new(services, store, config, connectivity.subscribe());
        engine.start_sync(backend.project_id, name).await;

        let client = Self {
            engine,
            connectivity,
            cache_dir,
        };
        client
            .wait_for("subscription", |s| s.online_member_count > 0)
            .await;
        client
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        self.engine.store()
    }

    pub fn snapshot(&self) -> Arc<ProjectState> {
        self.store().snapshot()
    }

    pub fn edit(&self, f: impl FnOnce(&mut ProjectState)) {
        assert!(self.store().update(f), "edit changed nothing");
    }

    pub async fn wait_for(&self, what: &str, check: impl Fn(&SyncState) -> bool) {
        let status = self.engine.status();
        eventually(what, || check(&status.borrow())).await;
    }

    /// Wait until every local change has been pushed.
    pub async fn settle(&self) {
        // The tracker marks edits pending from its own task.
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.wait_for("pending pushes", |s| {
            s.pending_count == 0 && s.status != SyncStatus::Syncing
        })
        .await;
    }

    /// The client's photo cache, opened a second time.
    pub async fn cache(&self) -> PhotoBlobCache {
        PhotoBlobCache::open(self.cache_dir.path()).await.unwrap()
    }
}

// ---------------------------------------------------------------------------
// Engines driven by hand
// ---------------------------------------------------------------------------

/// The pull, push and realtime engines over one context, without any
/// background task.
pub struct Direct {
    pub ctx: Arc<SyncContext>,
    pub pull: PullEngine,
    pub push: PushEngine,
    pub realtime: RealtimeEngine,
    cache_dir: TempDir,
}

impl Direct {
    pub async fn new(backend: &Backend) -> Self {
        Self::with_config(backend, config()).await
    }

    pub async fn with_config(backend: &Backend, config: SyncConfig) -> Self {
        let (services, cache_dir) = backend.services().await;
        let ctx = Arc::new(SyncContext {
            rows: services.rows,
            objects: services.objects,
            cache: services.cache,
            store: Arc::new(LocalStore::new(ProjectState::new(backend.project_id))),
            baselines: Arc::new(Baselines::new()),
            status: StatusHandle::new(),
            in_flight: InFlight::new(),
            config,
        });
        Self {
            pull: PullEngine::new(Arc::clone(&ctx)),
            push: PushEngine::new(Arc::clone(&ctx)),
            realtime: RealtimeEngine::new(Arc::clone(&ctx)),
            ctx,
            cache_dir,
        }
    }

    pub fn project_id(&self) -> EntityId {
        self.ctx.store.project_id()
    }

    pub fn snapshot(&self) -> Arc<ProjectState> {
        self.ctx.store.snapshot()
    }

    /// Apply a local edit and mark what it touched pending, as the change
    /// tracker would.
    pub fn edit(&self, f: impl FnOnce(&mut ProjectState)) {
        let before = self.ctx.store.snapshot();
        self.ctx.store.update(f);
        for category in self.ctx.store.snapshot().changed_categories(&before) {
            self.ctx.status.mark_pending(category);
        }
    }

    pub async fn push_all(&self) {
        self.push.flush(self.project_id()).await.unwrap();
    }

    pub async fn cache(&self) -> PhotoBlobCache {
        PhotoBlobCache::open(self.cache_dir.path()).await.unwrap()
    }
}

/// Poll `check` until it holds, failing the test after [`WAIT`].
pub async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
