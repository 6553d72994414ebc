//! What the backend is known to hold, per category.
//!
//! A baseline entry is recorded whenever the engine learns a row's server
//! value: from a pull, a realtime merge, or its own successful push. Pushes
//! diff the local snapshot against it, so only changed rows are upserted
//! and only rows the server has are deleted. Pulls use it to tell a local
//! draft (never on the server) from a row deleted remotely.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use continuity_core::EntityId;
use continuity_db::models::{
    CallSheetRow, CaptureRow, CharacterRow, LookRow, SceneRow, ScheduleRow, ScriptUploadRow,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineSnapshot {
    pub scenes: HashMap<EntityId, SceneRow>,
    /// Scene id → linked character ids.
    pub scene_characters: HashMap<EntityId, BTreeSet<EntityId>>,
    pub characters: HashMap<EntityId, CharacterRow>,
    pub looks: HashMap<EntityId, LookRow>,
    /// Look id → scene numbers.
    pub look_scenes: HashMap<EntityId, BTreeSet<String>>,
    pub captures: HashMap<EntityId, CaptureRow>,
    /// Photo id → capture id, for photo rows known to exist.
    pub photos: HashMap<EntityId, EntityId>,
    pub schedules: HashMap<EntityId, ScheduleRow>,
    pub call_sheets: HashMap<EntityId, CallSheetRow>,
    pub scripts: HashMap<EntityId, ScriptUploadRow>,
}

/// Rows to upsert and ids to delete to bring the server to a local state.
#[derive(Debug, Clone, PartialEq)]
pub struct RowDiff<R> {
    pub upsert: Vec<R>,
    pub delete: Vec<EntityId>,
}

impl<R> RowDiff<R> {
    pub fn is_empty(&self) -> bool {
        self.upsert.is_empty() && self.delete.is_empty()
    }
}

/// Diff `desired` (the whole local category) against `baseline`.
pub fn diff_rows<R: Clone + PartialEq>(
    baseline: &HashMap<EntityId, R>,
    desired: &[(EntityId, R)],
) -> RowDiff<R> {
    let upsert = desired
        .iter()
        .filter(|(id, row)| baseline.get(id) != Some(row))
        .map(|(_, row)| row.clone())
        .collect();
    let wanted: BTreeSet<EntityId> = desired.iter().map(|(id, _)| *id).collect();
    let mut delete: Vec<EntityId> = baseline
        .keys()
        .filter(|id| !wanted.contains(id))
        .copied()
        .collect();
    delete.sort();
    RowDiff { upsert, delete }
}

/// Junction rows to add and remove for one parent.
pub fn diff_set<T: Ord + Clone>(
    baseline: Option<&BTreeSet<T>>,
    desired: &BTreeSet<T>,
) -> (BTreeSet<T>, BTreeSet<T>) {
    let empty = BTreeSet::new();
    let baseline = baseline.unwrap_or(&empty);
    let insert = desired.difference(baseline).cloned().collect();
    let delete = baseline.difference(desired).cloned().collect();
    (insert, delete)
}

#[derive(Debug, Default)]
pub struct Baselines {
    inner: Mutex<BaselineSnapshot>,
}

impl Baselines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: BaselineSnapshot) -> Self {
        Self {
            inner: Mutex::new(snapshot),
        }
    }

    pub fn snapshot(&self) -> BaselineSnapshot {
        self.lock().clone()
    }

    pub fn restore(&self, snapshot: BaselineSnapshot) {
        *self.lock() = snapshot;
    }

    /// Forget everything, e.g. on a project switch.
    pub fn reset(&self) {
        *self.lock() = BaselineSnapshot::default();
    }

    pub fn read<T>(&self, f: impl FnOnce(&BaselineSnapshot) -> T) -> T {
        f(&self.lock())
    }

    pub fn update<T>(&self, f: impl FnOnce(&mut BaselineSnapshot) -> T) -> T {
        f(&mut self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, BaselineSnapshot> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BaselineSnapshot {
    pub fn forget_scene(&mut self, id: EntityId) {
        self.scenes.remove(&id);
        self.scene_characters.remove(&id);
        let captures: Vec<EntityId> = self
            .captures
            .values()
            .filter(|c| c.scene_id == id)
            .map(|c| c.id)
            .collect();
        for capture in captures {
            self.forget_capture(capture);
        }
    }

    pub fn forget_character(&mut self, id: EntityId) {
        self.characters.remove(&id);
        for linked in self.scene_characters.values_mut() {
            linked.remove(&id);
        }
        let looks: Vec<EntityId> = self
            .looks
            .values()
            .filter(|l| l.character_id == id)
            .map(|l| l.id)
            .collect();
        for look in looks {
            self.forget_look(look);
        }
        let captures: Vec<EntityId> = self
            .captures
            .values()
            .filter(|c| c.character_id == id)
            .map(|c| c.id)
            .collect();
        for capture in captures {
            self.forget_capture(capture);
        }
    }

    pub fn forget_look(&mut self, id: EntityId) {
        self.looks.remove(&id);
        self.look_scenes.remove(&id);
        for capture in self.captures.values_mut() {
            if capture.look_id == Some(id) {
                capture.look_id = None;
            }
        }
    }

    pub fn forget_capture(&mut self, id: EntityId) {
        self.captures.remove(&id);
        self.photos.retain(|_, capture| *capture != id);
    }
}
