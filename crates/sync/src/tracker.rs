//! Classifies local store mutations into pending sync categories.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use continuity_core::model::ProjectState;
use continuity_core::{EntityId, SyncCategory};

use crate::config::SyncPolicy;
use crate::scheduler::PushTrigger;
use crate::status::StatusHandle;
use crate::store::{LocalStore, Mutation, Origin};

/// Categories a mutation makes pending. Merges of server data never do.
pub fn classify(mutation: &Mutation) -> Vec<SyncCategory> {
    match mutation.origin {
        Origin::Local => mutation.changed_categories(),
        Origin::Server => Vec::new(),
    }
}

/// Background task following one project's local mutations.
pub struct ChangeTracker {
    task: JoinHandle<()>,
}

struct TrackerLoop {
    project_id: EntityId,
    store: Arc<LocalStore>,
    status: StatusHandle,
    policy: SyncPolicy,
    trigger: PushTrigger,
    last_seen: Arc<ProjectState>,
}

impl ChangeTracker {
    /// Start tracking. `changes` must be subscribed before any edit the
    /// tracker is expected to see.
    pub fn spawn(
        project_id: EntityId,
        changes: broadcast::Receiver<Mutation>,
        store: Arc<LocalStore>,
        status: StatusHandle,
        policy: SyncPolicy,
        trigger: PushTrigger,
        cancel: CancellationToken,
    ) -> Self {
        let tracker = TrackerLoop {
            project_id,
            last_seen: store.snapshot(),
            store,
            status,
            policy,
            trigger,
        };
        Self {
            task: tokio::spawn(tracker.run(changes, cancel)),
        }
    }

    pub async fn join(self) {
        let _ = self.task.await;
    }
}

impl TrackerLoop {
    async fn run(mut self, mut changes: broadcast::Receiver<Mutation>, cancel: CancellationToken) {
        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                received = changes.recv() => received,
            };
            match received {
                Ok(mutation) => {
                    self.last_seen = Arc::clone(&mutation.current);
                    if mutation.current.project_id == self.project_id {
                        self.record(&classify(&mutation));
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    // Origins of the skipped mutations are lost; diff the
                    // snapshot instead. Re-pushing server data is a no-op
                    // against the baseline.
                    tracing::warn!(skipped, "Change tracker lagged, diffing snapshot");
                    let current = self.store.snapshot();
                    if current.project_id == self.project_id {
                        self.record(&current.changed_categories(&self.last_seen));
                    }
                    self.last_seen = current;
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    fn record(&self, categories: &[SyncCategory]) {
        for &category in categories {
            self.status.mark_pending(category);
            tracing::debug!(category = %category, policy = ?self.policy, "Local change");
            if self.policy == SyncPolicy::Automatic {
                self.trigger.schedule_push(category);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use continuity_core::model::Character;

    #[test]
    fn server_merges_are_never_classified() {
        let store = LocalStore::new(ProjectState::new(uuid::Uuid::new_v4()));
        let mut rx = store.subscribe();

        store.apply_remote(|s| Arc::make_mut(&mut s.characters).push(Character::new("Remote")));
        store.update(|s| Arc::make_mut(&mut s.characters).push(Character::new("Local")));

        let remote = rx.try_recv().unwrap();
        let local = rx.try_recv().unwrap();
        assert!(classify(&remote).is_empty());
        assert_eq!(classify(&local), vec![SyncCategory::Characters]);
    }
}
