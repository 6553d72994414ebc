//! Presence bookkeeping.
//!
//! [`PresenceTracker`] folds the server's `presence_state` /
//! `presence_diff` frames into a member count. [`PresenceRegistry`] is the
//! in-process equivalent shared by every [`MemoryChangeFeed`] subscriber.
//!
//! [`MemoryChangeFeed`]: crate::memory::MemoryChangeFeed

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;

use continuity_core::EntityId;

use crate::messages::{PresenceDiff, PresenceMap};

/// Presence keys and their connection counts for one channel.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    members: HashMap<String, usize>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the member list with a full state snapshot.
    pub fn apply_state(&mut self, state: &PresenceMap) {
        self.members = state
            .iter()
            .filter(|(_, entry)| !entry.metas.is_empty())
            .map(|(key, entry)| (key.clone(), entry.metas.len()))
            .collect();
    }

    pub fn apply_diff(&mut self, diff: &PresenceDiff) {
        for (key, entry) in &diff.joins {
            *self.members.entry(key.clone()).or_default() += entry.metas.len().max(1);
        }
        for (key, entry) in &diff.leaves {
            if let Some(count) = self.members.get_mut(key) {
                *count = count.saturating_sub(entry.metas.len().max(1));
                if *count == 0 {
                    self.members.remove(key);
                }
            }
        }
    }

    /// Distinct identities attached.
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn clear(&mut self) {
        self.members.clear();
    }
}

/// Capacity of the registry's change broadcast.
const PRESENCE_CHANNEL_CAPACITY: usize = 64;

/// Shared in-process presence, keyed by project.
pub struct PresenceRegistry {
    projects: Mutex<HashMap<EntityId, HashMap<String, usize>>>,
    changes: broadcast::Sender<(EntityId, usize)>,
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(PRESENCE_CHANNEL_CAPACITY);
        Self {
            projects: Mutex::new(HashMap::new()),
            changes,
        }
    }
}

impl PresenceRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `(project_id, member_count)` after every join or leave.
    pub fn subscribe(&self) -> broadcast::Receiver<(EntityId, usize)> {
        self.changes.subscribe()
    }

    pub fn member_count(&self, project_id: EntityId) -> usize {
        self.lock().get(&project_id).map_or(0, |m| m.len())
    }

    /// Attach `identity` to `project_id` until the guard is dropped.
    pub fn join(self: &Arc<Self>, project_id: EntityId, identity: &str) -> PresenceGuard {
        let count = {
            let mut projects = self.lock();
            let members = projects.entry(project_id).or_default();
            *members.entry(identity.to_string()).or_default() += 1;
            members.len()
        };
        let _ = self.changes.send((project_id, count));
        PresenceGuard {
            registry: Arc::clone(self),
            project_id,
            identity: identity.to_string(),
        }
    }

    fn leave(&self, project_id: EntityId, identity: &str) {
        let count = {
            let mut projects = self.lock();
            let Some(members) = projects.get_mut(&project_id) else {
                return;
            };
            if let Some(n) = members.get_mut(identity) {
                *n -= 1;
                if *n == 0 {
                    members.remove(identity);
                }
            }
            let count = members.len();
            if count == 0 {
                projects.remove(&project_id);
            }
            count
        };
        let _ = self.changes.send((project_id, count));
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<EntityId, HashMap<String, usize>>> {
        self.projects.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Membership in a [`PresenceRegistry`]; leaves on drop.
pub struct PresenceGuard {
    registry: Arc<PresenceRegistry>,
    project_id: EntityId,
    identity: String,
}

impl Drop for PresenceGuard {
    fn drop(&mut self) {
        self.registry.leave(self.project_id, &self.identity);
    }
}
