//! Keeps the state file current.
//!
//! Local mutations and status changes mark the snapshot dirty; a save
//! follows once things have been quiet for the save delay.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio_util::sync::CancellationToken;

use continuity_sync::{save_state_file, PersistedState, SyncEngine};

pub const DEFAULT_SAVE_DELAY: Duration = Duration::from_secs(1);

/// The local store and sync bookkeeping as one persistable value.
pub fn capture(engine: &SyncEngine) -> PersistedState {
    PersistedState {
        state: (*engine.store().snapshot()).clone(),
        meta: engine.metadata(),
    }
}

pub async fn save(engine: &SyncEngine, path: &Path) {
    match save_state_file(path, &capture(engine)).await {
        Ok(()) => tracing::debug!(path = %path.display(), "State saved"),
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Saving state failed"),
    }
}

/// Save after every burst of changes until `cancel` fires, then once more.
pub async fn run(engine: Arc<SyncEngine>, path: PathBuf, delay: Duration, cancel: CancellationToken) {
    let mut mutations = engine.store().subscribe();
    let mut status = engine.status();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = mutations.recv() => {
                if matches!(received, Err(RecvError::Closed)) {
                    break;
                }
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
        // Everything queued meanwhile is covered by this save.
        while !matches!(mutations.try_recv(), Err(TryRecvError::Empty | TryRecvError::Closed)) {}
        let _ = status.borrow_and_update();

        save(&engine, &path).await;
    }

    save(&engine, &path).await;
}
