//! Categories with a push currently on the wire.
//!
//! Realtime events for an in-flight category are this client's own writes
//! coming back and are dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use continuity_core::SyncCategory;

#[derive(Clone, Default)]
pub struct InFlight {
    inner: Arc<Mutex<HashMap<SyncCategory, usize>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `category` in flight until the guard drops.
    pub fn enter(&self, category: SyncCategory) -> InFlightGuard {
        *self.lock().entry(category).or_insert(0) += 1;
        InFlightGuard {
            set: self.clone(),
            category,
        }
    }

    pub fn contains(&self, category: SyncCategory) -> bool {
        self.lock().contains_key(&category)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SyncCategory, usize>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct InFlightGuard {
    set: InFlight,
    category: SyncCategory,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut map = self.set.lock();
        if let Some(count) = map.get_mut(&self.category) {
            *count -= 1;
            if *count == 0 {
                map.remove(&self.category);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_guards_keep_the_category_until_the_last_drops() {
        let set = InFlight::new();
        let outer = set.enter(SyncCategory::Scenes);
        let inner = set.enter(SyncCategory::Scenes);
        drop(inner);
        assert!(set.contains(SyncCategory::Scenes));
        drop(outer);
        assert!(!set.contains(SyncCategory::Scenes));
    }

    #[test]
    fn clear_outlives_live_guards() {
        let set = InFlight::new();
        let guard = set.enter(SyncCategory::Looks);
        set.clear();
        assert!(!set.contains(SyncCategory::Looks));
        drop(guard);
        assert!(!set.contains(SyncCategory::Looks));
    }
}
