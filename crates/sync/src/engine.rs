//! The sync engine facade.
//!
//! One [`SyncEngine`] serves one local store. `start_sync` opens a session
//! for a project: a change tracker, the push workers and a supervisor task
//! that follows connectivity. Going online pulls the project, subscribes to
//! its change feed and flushes pending pushes; going offline drops the
//! subscription and leaves changes pending. `stop_sync` cancels every task
//! of the session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use continuity_core::model::ProjectState;
use continuity_core::EntityId;
use continuity_db::RowStore;
use continuity_realtime::reconnect::delay_for_attempt;
use continuity_realtime::ChangeFeed;
use continuity_storage::{ObjectStore, PhotoBlobCache};

use crate::baseline::Baselines;
use crate::config::{SyncConfig, SyncPolicy};
use crate::connectivity::Connectivity;
use crate::context::SyncContext;
use crate::error::SyncError;
use crate::inflight::InFlight;
use crate::pull::{PullEngine, PullReport};
use crate::push::PushEngine;
use crate::realtime::{RealtimeEngine, RealtimeHandle};
use crate::scheduler::{PushLane, PushScheduler};
use crate::status::{StatusHandle, SyncState};
use crate::store::{LocalStore, SyncMetadata};
use crate::tracker::ChangeTracker;

/// The backend interfaces a session talks to.
pub struct SyncServices {
    pub rows: Arc<dyn RowStore>,
    pub feed: Arc<dyn ChangeFeed>,
    pub objects: Arc<dyn ObjectStore>,
    pub cache: PhotoBlobCache,
}

pub struct SyncEngine {
    ctx: Arc<SyncContext>,
    feed: Arc<dyn ChangeFeed>,
    pull: Arc<PullEngine>,
    push: Arc<PushEngine>,
    realtime: Arc<RealtimeEngine>,
    connectivity: watch::Receiver<Connectivity>,
    session: Mutex<Option<Session>>,
}

struct Session {
    project_id: EntityId,
    cancel: CancellationToken,
    scheduler: PushScheduler,
    tracker: ChangeTracker,
    supervisor: JoinHandle<()>,
}

impl SyncEngine {
    pub fn new(
        services: SyncServices,
        store: Arc<LocalStore>,
        config: SyncConfig,
        connectivity: watch::Receiver<Connectivity>,
    ) -> Self {
        let ctx = Arc::new(SyncContext {
            rows: services.rows,
            objects: services.objects,
            cache: services.cache,
            store,
            baselines: Arc::new(Baselines::new()),
            status: StatusHandle::new(),
            in_flight: InFlight::new(),
            config,
        });
        Self {
            pull: Arc::new(PullEngine::new(Arc::clone(&ctx))),
            push: Arc::new(PushEngine::new(Arc::clone(&ctx))),
            realtime: Arc::new(RealtimeEngine::new(Arc::clone(&ctx))),
            feed: services.feed,
            ctx,
            connectivity,
            session: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.ctx.store
    }

    pub fn status(&self) -> watch::Receiver<SyncState> {
        self.ctx.status.subscribe()
    }

    pub fn current_status(&self) -> SyncState {
        self.ctx.status.current()
    }

    pub fn dismiss_error(&self) {
        self.ctx.status.dismiss_error();
    }

    pub fn config(&self) -> &SyncConfig {
        &self.ctx.config
    }

    /// Reinstate bookkeeping persisted by an earlier run. Call before
    /// `start_sync`.
    pub fn restore(&self, meta: SyncMetadata) {
        self.ctx
            .status
            .restore(meta.pending, meta.last_pushed_at, meta.last_pulled_at);
        self.ctx.baselines.restore(meta.baselines);
    }

    /// Bookkeeping to persist alongside the local snapshot.
    pub fn metadata(&self) -> SyncMetadata {
        SyncMetadata {
            pending: self.ctx.status.pending().into_iter().collect(),
            last_pushed_at: self.ctx.status.last_pushed_at(),
            last_pulled_at: self.ctx.status.last_pulled_at(),
            baselines: self.ctx.baselines.snapshot(),
        }
    }

    pub async fn active_project(&self) -> Option<EntityId> {
        self.session.lock().await.as_ref().map(|s| s.project_id)
    }

    /// Start syncing `project_id` as `identity`, replacing any running
    /// session. Switching to another project clears the local store.
    pub async fn start_sync(&self, project_id: EntityId, identity: impl Into<String>) {
        let mut session = self.session.lock().await;
        if let Some(previous) = session.take() {
            self.close(previous).await;
        }

        if self.ctx.store.project_id() != project_id {
            tracing::info!(project_id = %project_id, "Switching project, clearing local state");
            self.ctx.baselines.reset();
            self.ctx.status.reset();
            self.ctx.store.replace(ProjectState::new(project_id));
        }

        let cancel = CancellationToken::new();
        let scheduler = PushScheduler::start(
            project_id,
            Arc::clone(&self.push) as Arc<dyn PushLane>,
            self.ctx.status.clone(),
            &self.ctx.config,
            cancel.child_token(),
        );
        let tracker = ChangeTracker::spawn(
            project_id,
            self.ctx.store.subscribe(),
            Arc::clone(&self.ctx.store),
            self.ctx.status.clone(),
            self.ctx.config.policy,
            scheduler.trigger(),
            cancel.child_token(),
        );
        let supervisor = Supervisor {
            ctx: Arc::clone(&self.ctx),
            feed: Arc::clone(&self.feed),
            pull: Arc::clone(&self.pull),
            push: Arc::clone(&self.push),
            realtime: Arc::clone(&self.realtime),
            project_id,
            identity: identity.into(),
            connectivity: self.connectivity.clone(),
            cancel: cancel.child_token(),
        };

        tracing::info!(project_id = %project_id, "Sync started");
        *session = Some(Session {
            project_id,
            cancel,
            scheduler,
            tracker,
            supervisor: tokio::spawn(supervisor.run()),
        });
    }

    /// Stop the running session, if any. Pending changes stay pending.
    pub async fn stop_sync(&self) {
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            self.close(session).await;
        }
    }

    async fn close(&self, session: Session) {
        session.cancel.cancel();
        session.scheduler.shutdown().await;
        session.tracker.join().await;
        let _ = session.supervisor.await;
        self.ctx.in_flight.clear();
        self.ctx.status.set_members(0);
        tracing::info!(project_id = %session.project_id, "Sync stopped");
    }

    /// Push every pending category now, whatever the policy.
    pub async fn upload_now(&self) -> Result<(), SyncError> {
        if self.ctx.status.is_offline() {
            return Err(SyncError::Offline);
        }
        self.push.flush(self.ctx.store.project_id()).await
    }

    /// Pull the whole project now. Local edits not pushed yet are kept.
    pub async fn download_now(&self) -> Result<PullReport, SyncError> {
        if self.ctx.status.is_offline() {
            return Err(SyncError::Offline);
        }
        self.pull.pull(self.ctx.store.project_id()).await
    }
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

/// Follows connectivity for one session and keeps the feed subscribed
/// while online.
struct Supervisor {
    ctx: Arc<SyncContext>,
    feed: Arc<dyn ChangeFeed>,
    pull: Arc<PullEngine>,
    push: Arc<PushEngine>,
    realtime: Arc<RealtimeEngine>,
    project_id: EntityId,
    identity: String,
    connectivity: watch::Receiver<Connectivity>,
    cancel: CancellationToken,
}

/// Why bringing the session online stopped.
enum Halt {
    /// Retried with backoff.
    Transient,
    /// Waits for the next connectivity change or a manual sync.
    Permanent,
}

impl Supervisor {
    async fn run(mut self) {
        let (resync_tx, mut resync_rx) = mpsc::channel(1);
        let mut handle: Option<RealtimeHandle> = None;
        let mut failures = 0u32;
        let mut halted = false;

        loop {
            let online = self.connectivity.borrow_and_update().is_online();
            self.ctx.status.set_offline(!online);

            if !online {
                if let Some(feed) = handle.take() {
                    tracing::info!(project_id = %self.project_id, "Offline, closing realtime feed");
                    feed.unsubscribe().await;
                }
                failures = 0;
                halted = false;
            } else if !halted && handle.is_none() {
                match self.go_online(resync_tx.clone()).await {
                    Ok(feed) => {
                        handle = Some(feed);
                        failures = 0;
                    }
                    Err(Halt::Transient) => failures += 1,
                    Err(Halt::Permanent) => halted = true,
                }
            }

            let retry = (online && !halted && handle.is_none() && failures > 0)
                .then(|| delay_for_attempt(failures, &self.ctx.config.retry));

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                changed = self.connectivity.changed() => {
                    if changed.is_err() {
                        // No more reports; stay in the current mode.
                        self.cancel.cancelled().await;
                        break;
                    }
                }
                Some(()) = resync_rx.recv() => {
                    if online && handle.is_some() {
                        self.resync().await;
                    }
                }
                _ = feed_ended(handle.as_ref()) => {
                    if let Some(dead) = handle.take() {
                        dead.unsubscribe().await;
                    }
                    failures += 1;
                }
                _ = tokio::time::sleep(retry.unwrap_or(Duration::ZERO)), if retry.is_some() => {}
            }
        }

        if let Some(feed) = handle {
            feed.unsubscribe().await;
        }
    }

    /// Pull, subscribe, then push what piled up while offline.
    async fn go_online(&self, resync: mpsc::Sender<()>) -> Result<RealtimeHandle, Halt> {
        tracing::info!(project_id = %self.project_id, "Online, syncing project");

        if let Err(e) = self.pull.pull(self.project_id).await {
            return Err(classify(&e));
        }
        let feed = self
            .realtime
            .subscribe(
                self.feed.as_ref(),
                self.project_id,
                self.identity.clone(),
                resync,
                self.cancel.child_token(),
            )
            .await
            .map_err(|e| {
                tracing::warn!(project_id = %self.project_id, error = %e, "Realtime subscribe failed");
                self.ctx.status.set_error(format!("Realtime subscribe failed: {e}"));
                classify(&e)
            })?;
        self.flush().await;
        Ok(feed)
    }

    /// Catch up after the feed may have missed changes.
    async fn resync(&self) {
        if self.pull.pull(self.project_id).await.is_ok() {
            self.flush().await;
        }
    }

    async fn flush(&self) {
        if self.ctx.config.policy != SyncPolicy::Automatic {
            return;
        }
        if let Err(e) = self.push.flush(self.project_id).await {
            tracing::warn!(project_id = %self.project_id, error = %e, "Flushing pending changes failed");
        }
    }
}

async fn feed_ended(handle: Option<&RealtimeHandle>) {
    match handle {
        Some(handle) => handle.ended().await,
        None => std::future::pending().await,
    }
}

fn classify(error: &SyncError) -> Halt {
    if error.is_retryable() {
        Halt::Transient
    } else {
        Halt::Permanent
    }
}
