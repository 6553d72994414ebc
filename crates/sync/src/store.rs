//! The local reactive project store.
//!
//! Holds the current [`ProjectState`] and publishes a [`Mutation`] for
//! every change, tagged with where it came from so the change tracker can
//! ignore merges of server data. A mutation is only published when at
//! least one field group was actually replaced.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use continuity_core::model::ProjectState;
use continuity_core::{EntityId, SyncCategory, Timestamp};

use crate::baseline::BaselineSnapshot;

const MUTATION_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// An edit made on this client.
    Local,
    /// A pull or realtime merge of server data.
    Server,
}

#[derive(Debug, Clone)]
pub struct Mutation {
    pub previous: Arc<ProjectState>,
    pub current: Arc<ProjectState>,
    pub origin: Origin,
}

impl Mutation {
    pub fn changed_categories(&self) -> Vec<SyncCategory> {
        self.current.changed_categories(&self.previous)
    }
}

pub struct LocalStore {
    state: RwLock<Arc<ProjectState>>,
    changes: broadcast::Sender<Mutation>,
}

impl LocalStore {
    pub fn new(state: ProjectState) -> Self {
        let (changes, _) = broadcast::channel(MUTATION_CHANNEL_CAPACITY);
        Self {
            state: RwLock::new(Arc::new(state)),
            changes,
        }
    }

    pub fn snapshot(&self) -> Arc<ProjectState> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn project_id(&self) -> EntityId {
        self.snapshot().project_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Mutation> {
        self.changes.subscribe()
    }

    /// Apply a local edit. Returns whether anything changed.
    pub fn update(&self, f: impl FnOnce(&mut ProjectState)) -> bool {
        self.mutate(Origin::Local, |state| {
            f(state);
            Ok::<_, std::convert::Infallible>(())
        })
        .unwrap_or_else(|never| match never {})
    }

    /// Apply a merge of server data.
    pub fn apply_remote(&self, f: impl FnOnce(&mut ProjectState)) -> bool {
        self.try_apply_remote(|state| {
            f(state);
            Ok::<_, std::convert::Infallible>(())
        })
        .unwrap_or_else(|never| match never {})
    }

    /// Apply a fallible merge of server data; nothing changes on error.
    pub fn try_apply_remote<E>(
        &self,
        f: impl FnOnce(&mut ProjectState) -> Result<(), E>,
    ) -> Result<bool, E> {
        self.mutate(Origin::Server, f)
    }

    /// Swap in a different project wholesale.
    pub fn replace(&self, state: ProjectState) {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let previous = Arc::clone(&guard);
        let current = Arc::new(state);
        *guard = Arc::clone(&current);
        let _ = self.changes.send(Mutation {
            previous,
            current,
            origin: Origin::Server,
        });
    }

    fn mutate<E>(
        &self,
        origin: Origin,
        f: impl FnOnce(&mut ProjectState) -> Result<(), E>,
    ) -> Result<bool, E> {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let previous = Arc::clone(&guard);
        let mut next = ProjectState::clone(&previous);
        f(&mut next)?;
        if next.changed_categories(&previous).is_empty() {
            return Ok(false);
        }
        let current = Arc::new(next);
        *guard = Arc::clone(&current);
        // Sent under the lock so subscribers see mutations in order.
        let _ = self.changes.send(Mutation {
            previous,
            current,
            origin,
        });
        Ok(true)
    }
}

/// Replace `slot` only when `value` differs, keeping the group's identity
/// (and so not signalling a change) for equal content.
pub fn replace_if_changed<T: PartialEq>(slot: &mut Arc<T>, value: T) -> bool {
    if **slot == value {
        return false;
    }
    *slot = Arc::new(value);
    true
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Sync bookkeeping saved next to the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncMetadata {
    pub pending: BTreeSet<SyncCategory>,
    pub last_pushed_at: Option<Timestamp>,
    pub last_pulled_at: Option<Timestamp>,
    pub baselines: BaselineSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub state: ProjectState,
    #[serde(default)]
    pub meta: SyncMetadata,
}

/// Load a state file. A missing or malformed file is treated as absent.
pub async fn load_state_file(path: &Path) -> Option<PersistedState> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "State file unreadable");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(state) => Some(state),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "State file malformed, ignoring");
            None
        }
    }
}

/// Write a state file atomically (temp file, then rename).
pub async fn save_state_file(path: &Path, state: &PersistedState) -> std::io::Result<()> {
    let json = serde_json::to_vec_pretty(state)?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir).await?;
    }
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("state.json");
    let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()));
    tokio::fs::write(&tmp, &json).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}
