//! Debounced per-category push workers.
//!
//! Each category has one worker task fed by a capacity-1 signal channel.
//! `schedule_push` never blocks: a signal arriving while one is already
//! queued is coalesced. A worker waits until no signal has arrived for the
//! debounce period, then pushes whatever the local store holds at that
//! moment, so N quick edits cost one push carrying the last state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use continuity_core::category::ALL_CATEGORIES;
use continuity_core::{EntityId, SyncCategory};
use continuity_realtime::reconnect::delay_for_attempt;
use continuity_realtime::ReconnectConfig;

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::status::StatusHandle;

/// Something that can push one category's pending changes.
#[async_trait]
pub trait PushLane: Send + Sync + 'static {
    async fn push_pending(
        &self,
        project_id: EntityId,
        category: SyncCategory,
    ) -> Result<(), SyncError>;
}

pub struct PushScheduler {
    trigger: PushTrigger,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// Cheap handle for arming category debounces from other tasks.
#[derive(Clone)]
pub struct PushTrigger {
    signals: Arc<HashMap<SyncCategory, mpsc::Sender<()>>>,
}

impl PushTrigger {
    /// Arm (or re-arm) the debounce for `category`. Never blocks.
    pub fn schedule_push(&self, category: SyncCategory) {
        if let Some(tx) = self.signals.get(&category) {
            // Full means a signal is already queued.
            let _ = tx.try_send(());
        }
    }
}

struct Worker {
    project_id: EntityId,
    category: SyncCategory,
    lane: Arc<dyn PushLane>,
    status: StatusHandle,
    debounce: Duration,
    retry: ReconnectConfig,
    max_retries: u32,
    cancel: CancellationToken,
}

impl PushScheduler {
    /// Spawn one worker per category. Workers stop when `cancel` fires.
    pub fn start(
        project_id: EntityId,
        lane: Arc<dyn PushLane>,
        status: StatusHandle,
        config: &SyncConfig,
        cancel: CancellationToken,
    ) -> Self {
        let mut signals = HashMap::new();
        let mut tasks = Vec::with_capacity(ALL_CATEGORIES.len());

        for &category in ALL_CATEGORIES {
            let (tx, rx) = mpsc::channel(1);
            signals.insert(category, tx);
            let worker = Worker {
                project_id,
                category,
                lane: Arc::clone(&lane),
                status: status.clone(),
                debounce: config.debounce,
                retry: config.retry.clone(),
                max_retries: config.max_push_retries,
                cancel: cancel.clone(),
            };
            tasks.push(tokio::spawn(worker.run(rx)));
        }

        Self {
            trigger: PushTrigger {
                signals: Arc::new(signals),
            },
            cancel,
            tasks,
        }
    }

    pub fn schedule_push(&self, category: SyncCategory) {
        self.trigger.schedule_push(category);
    }

    pub fn trigger(&self) -> PushTrigger {
        self.trigger.clone()
    }

    /// Stop every worker and wait for them to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

impl Worker {
    async fn run(self, mut rx: mpsc::Receiver<()>) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                signal = rx.recv() => {
                    if signal.is_none() {
                        return;
                    }
                }
            }

            // Quiet period: every new signal restarts it.
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => return,
                    _ = tokio::time::sleep(self.debounce) => break,
                    signal = rx.recv() => {
                        if signal.is_none() {
                            return;
                        }
                    }
                }
            }

            if self.status.is_offline() {
                tracing::debug!(category = %self.category, "Offline, push deferred");
                continue;
            }
            if !self.push_with_retry().await {
                return;
            }
        }
    }

    /// Returns `false` if cancelled.
    async fn push_with_retry(&self) -> bool {
        let mut attempt = 0u32;
        loop {
            let result = tokio::select! {
                _ = self.cancel.cancelled() => return false,
                result = self.lane.push_pending(self.project_id, self.category) => result,
            };
            let error = match result {
                Ok(()) => return true,
                Err(e) => e,
            };

            if !error.is_retryable() || attempt >= self.max_retries || self.status.is_offline() {
                tracing::warn!(
                    category = %self.category,
                    attempts = attempt + 1,
                    error = %error,
                    "Push failed, left pending",
                );
                return true;
            }

            attempt += 1;
            let delay = delay_for_attempt(attempt, &self.retry);
            tracing::info!(
                category = %self.category,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Retrying push",
            );
            tokio::select! {
                _ = self.cancel.cancelled() => return false,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingLane {
        calls: Mutex<Vec<(SyncCategory, tokio::time::Instant)>>,
        failures: Mutex<Vec<SyncError>>,
    }

    impl RecordingLane {
        fn calls(&self) -> Vec<SyncCategory> {
            self.calls.lock().unwrap().iter().map(|(c, _)| *c).collect()
        }
    }

    #[async_trait]
    impl PushLane for RecordingLane {
        async fn push_pending(
            &self,
            _project_id: EntityId,
            category: SyncCategory,
        ) -> Result<(), SyncError> {
            self.calls
                .lock()
                .unwrap()
                .push((category, tokio::time::Instant::now()));
            match self.failures.lock().unwrap().pop() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    fn start(lane: &Arc<RecordingLane>, status: &StatusHandle) -> PushScheduler {
        let config = SyncConfig::default();
        PushScheduler::start(
            uuid::Uuid::new_v4(),
            Arc::clone(lane) as Arc<dyn PushLane>,
            status.clone(),
            &config,
            CancellationToken::new(),
        )
    }

    async fn settle(duration: Duration) {
        tokio::time::sleep(duration).await;
        // Let woken workers run to their next await.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn quick_edits_coalesce_into_one_push() {
        let lane = Arc::new(RecordingLane::default());
        let status = StatusHandle::new();
        let scheduler = start(&lane, &status);
        let started = tokio::time::Instant::now();

        for _ in 0..5 {
            scheduler.schedule_push(SyncCategory::Characters);
            settle(Duration::from_millis(100)).await;
        }
        assert!(lane.calls().is_empty());

        settle(Duration::from_millis(700)).await;
        let calls = lane.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        // Fired one debounce after the last edit, not the first.
        assert!(calls[0].1 - started >= Duration::from_millis(1000));

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn categories_debounce_independently() {
        let lane = Arc::new(RecordingLane::default());
        let status = StatusHandle::new();
        let scheduler = start(&lane, &status);

        scheduler.schedule_push(SyncCategory::Scenes);
        scheduler.schedule_push(SyncCategory::Looks);
        settle(Duration::from_millis(700)).await;

        let mut calls = lane.calls();
        calls.sort();
        assert_eq!(calls, vec![SyncCategory::Scenes, SyncCategory::Looks]);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn offline_workers_defer_the_push() {
        let lane = Arc::new(RecordingLane::default());
        let status = StatusHandle::new();
        status.set_offline(true);
        let scheduler = start(&lane, &status);

        scheduler.schedule_push(SyncCategory::Captures);
        settle(Duration::from_secs(2)).await;
        assert!(lane.calls().is_empty());
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_with_backoff() {
        let lane = Arc::new(RecordingLane::default());
        lane.failures
            .lock()
            .unwrap()
            .push(SyncError::Network("reset".into()));
        let status = StatusHandle::new();
        let scheduler = start(&lane, &status);

        scheduler.schedule_push(SyncCategory::Characters);
        settle(Duration::from_millis(700)).await;
        assert_eq!(lane.calls().len(), 1);

        // First retry waits the initial backoff of one second.
        settle(Duration::from_millis(1100)).await;
        assert_eq!(lane.calls().len(), 2);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn schema_errors_are_not_retried() {
        let lane = Arc::new(RecordingLane::default());
        lane.failures
            .lock()
            .unwrap()
            .push(SyncError::SchemaMismatch {
                table: continuity_core::Table::Looks,
                message: "bad column".into(),
            });
        let status = StatusHandle::new();
        let scheduler = start(&lane, &status);

        scheduler.schedule_push(SyncCategory::Looks);
        settle(Duration::from_secs(40)).await;
        assert_eq!(lane.calls().len(), 1);
        scheduler.shutdown().await;
    }
}
