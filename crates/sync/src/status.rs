//! Observable sync status.
//!
//! [`StatusHandle`] owns the bookkeeping (pending categories, in-progress
//! operations, last errors) and republishes a derived [`SyncState`] on a
//! `watch` channel after every change.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;

use continuity_core::{SyncCategory, Timestamp};

use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Synced,
    Error,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncState {
    pub status: SyncStatus,
    pub pending_count: usize,
    pub last_pushed_at: Option<Timestamp>,
    pub last_pulled_at: Option<Timestamp>,
    pub online_member_count: usize,
    /// Most recent error not tied to one category (pull, subscription).
    pub error: Option<String>,
    pub category_errors: BTreeMap<SyncCategory, String>,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            status: SyncStatus::Idle,
            pending_count: 0,
            last_pushed_at: None,
            last_pulled_at: None,
            online_member_count: 0,
            error: None,
            category_errors: BTreeMap::new(),
        }
    }
}

#[derive(Default)]
struct Inner {
    active: usize,
    /// Category → generation of the latest change marking it pending.
    pending: BTreeMap<SyncCategory, u64>,
    next_generation: u64,
    offline: bool,
    last_pushed_at: Option<Timestamp>,
    last_pulled_at: Option<Timestamp>,
    members: usize,
    error: Option<String>,
    category_errors: BTreeMap<SyncCategory, String>,
}

impl Inner {
    fn derive(&self) -> SyncState {
        let status = if self.offline {
            SyncStatus::Offline
        } else if self.active > 0 {
            SyncStatus::Syncing
        } else if self.error.is_some() || !self.category_errors.is_empty() {
            SyncStatus::Error
        } else if self.last_pushed_at.is_some() || self.last_pulled_at.is_some() {
            SyncStatus::Synced
        } else {
            SyncStatus::Idle
        };
        SyncState {
            status,
            pending_count: self.pending.len(),
            last_pushed_at: self.last_pushed_at,
            last_pulled_at: self.last_pulled_at,
            online_member_count: self.members,
            error: self.error.clone(),
            category_errors: self.category_errors.clone(),
        }
    }
}

/// Shared status bookkeeping. Clones refer to the same state.
#[derive(Clone)]
pub struct StatusHandle {
    tx: Arc<watch::Sender<SyncState>>,
    inner: Arc<Mutex<Inner>>,
}

impl Default for StatusHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(SyncState::default());
        Self {
            tx: Arc::new(tx),
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> SyncState {
        self.tx.borrow().clone()
    }

    /// Mark `category` pending and return the generation of this change.
    pub fn mark_pending(&self, category: SyncCategory) -> u64 {
        self.modify(|inner| {
            inner.next_generation += 1;
            let generation = inner.next_generation;
            inner.pending.insert(category, generation);
            generation
        })
    }

    /// Restore pending categories and timestamps saved by an earlier run.
    pub fn restore(
        &self,
        pending: impl IntoIterator<Item = SyncCategory>,
        last_pushed_at: Option<Timestamp>,
        last_pulled_at: Option<Timestamp>,
    ) {
        self.modify(|inner| {
            for category in pending {
                inner.next_generation += 1;
                let generation = inner.next_generation;
                inner.pending.insert(category, generation);
            }
            inner.last_pushed_at = last_pushed_at;
            inner.last_pulled_at = last_pulled_at;
        });
    }

    pub fn pending_generation(&self, category: SyncCategory) -> Option<u64> {
        self.lock().pending.get(&category).copied()
    }

    pub fn is_pending(&self, category: SyncCategory) -> bool {
        self.lock().pending.contains_key(&category)
    }

    /// Pending categories in push order.
    pub fn pending(&self) -> Vec<SyncCategory> {
        let inner = self.lock();
        continuity_core::category::ALL_CATEGORIES
            .iter()
            .copied()
            .filter(|c| inner.pending.contains_key(c))
            .collect()
    }

    /// Clear the pending flag, unless the category was marked again after
    /// `generation` was taken.
    pub fn clear_pending(&self, category: SyncCategory, generation: u64) {
        self.modify(|inner| {
            if inner.pending.get(&category) == Some(&generation) {
                inner.pending.remove(&category);
            }
        });
    }

    /// Count an operation as running until the guard drops.
    pub fn begin(&self) -> ActivityGuard {
        self.modify(|inner| inner.active += 1);
        ActivityGuard {
            status: self.clone(),
        }
    }

    pub fn push_succeeded(&self, category: SyncCategory) {
        self.modify(|inner| {
            inner.category_errors.remove(&category);
            inner.last_pushed_at = Some(Utc::now());
        });
    }

    /// Rows went out but some photo bytes did not; the category stays in
    /// error until a later push gets everything through.
    pub fn push_incomplete(&self, category: SyncCategory, message: String) {
        self.modify(|inner| {
            inner.category_errors.insert(category, message);
            inner.last_pushed_at = Some(Utc::now());
        });
    }

    pub fn push_failed(&self, category: SyncCategory, error: &SyncError) {
        self.modify(|inner| {
            inner.category_errors.insert(category, error.to_string());
        });
    }

    pub fn pull_succeeded(&self) {
        self.modify(|inner| {
            inner.error = None;
            inner.last_pulled_at = Some(Utc::now());
        });
    }

    pub fn pull_failed(&self, error: &SyncError) {
        self.set_error(error.to_string());
    }

    pub fn set_error(&self, message: String) {
        self.modify(|inner| inner.error = Some(message));
    }

    pub fn set_offline(&self, offline: bool) {
        self.modify(|inner| inner.offline = offline);
    }

    pub fn is_offline(&self) -> bool {
        self.lock().offline
    }

    pub fn set_members(&self, members: usize) {
        self.modify(|inner| inner.members = members);
    }

    pub fn last_pushed_at(&self) -> Option<Timestamp> {
        self.lock().last_pushed_at
    }

    pub fn last_pulled_at(&self) -> Option<Timestamp> {
        self.lock().last_pulled_at
    }

    /// Clear every recorded error.
    pub fn dismiss_error(&self) {
        self.modify(|inner| {
            inner.error = None;
            inner.category_errors.clear();
        });
    }

    /// Forget everything except connectivity, e.g. on a project switch.
    pub fn reset(&self) {
        self.modify(|inner| {
            let offline = inner.offline;
            *inner = Inner {
                offline,
                ..Inner::default()
            };
        });
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn modify<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> T {
        let mut inner = self.lock();
        let out = f(&mut inner);
        let state = inner.derive();
        // Published under the lock so the channel never goes backwards.
        self.tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        out
    }
}

/// Marks one operation in progress for as long as it lives.
pub struct ActivityGuard {
    status: StatusHandle,
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        self.status
            .modify(|inner| inner.active = inner.active.saturating_sub(1));
    }
}
