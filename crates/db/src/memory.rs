//! In-process [`RowStore`].
//!
//! Holds every table in one mutex so each call is atomic, checks the same
//! foreign keys as the SQL schema, cascades deletes the way the schema
//! does, and publishes one [`RowChange`] per affected row on a broadcast
//! channel in commit order. Tests use the fault switches to simulate an
//! unreachable or rejecting backend.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;

use continuity_core::{EntityId, Table};

use crate::error::BackendError;
use crate::models::{
    CallSheetRow, CaptureRow, ChangeKind, CharacterRow, LookRow, LookSceneRow, PhotoRow,
    ProjectRow, RowChange, SceneCharacterRow, SceneRow, ScheduleRow, ScriptUploadRow,
};
use crate::store::RowStore;

/// Capacity of the change broadcast. Slow subscribers see `Lagged`.
const CHANGE_CHANNEL_CAPACITY: usize = 1024;

#[derive(Default)]
struct Tables {
    projects: BTreeMap<EntityId, ProjectRow>,
    scenes: BTreeMap<EntityId, SceneRow>,
    characters: BTreeMap<EntityId, CharacterRow>,
    looks: BTreeMap<EntityId, LookRow>,
    captures: BTreeMap<EntityId, CaptureRow>,
    photos: BTreeMap<EntityId, PhotoRow>,
    schedules: BTreeMap<EntityId, ScheduleRow>,
    call_sheets: BTreeMap<EntityId, CallSheetRow>,
    scripts: BTreeMap<EntityId, ScriptUploadRow>,
    scene_characters: BTreeSet<SceneCharacterRow>,
    look_scenes: BTreeSet<LookSceneRow>,
}

#[derive(Default)]
struct Inner {
    tables: Tables,
    unreachable: bool,
    failing: HashMap<Table, BackendError>,
    /// Row count of every upsert call, per table.
    upserts: HashMap<Table, Vec<usize>>,
}

impl Inner {
    fn check(&self, table: Table) -> Result<(), BackendError> {
        if self.unreachable {
            return Err(BackendError::Network("backend unreachable".into()));
        }
        match self.failing.get(&table) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn record_upsert(&mut self, table: Table, rows: usize) {
        self.upserts.entry(table).or_default().push(rows);
    }
}

pub struct MemoryRowStore {
    inner: Mutex<Inner>,
    changes: broadcast::Sender<RowChange>,
}

impl Default for MemoryRowStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRowStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(Inner::default()),
            changes,
        }
    }

    /// Receive every committed row change from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RowChange> {
        self.changes.subscribe()
    }

    /// Create a project row. Projects are managed outside the sync engine.
    pub fn create_project(&self, name: &str) -> EntityId {
        let row = ProjectRow {
            id: uuid::Uuid::new_v4(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        let id = row.id;
        let mut inner = self.lock();
        inner.tables.projects.insert(id, row.clone());
        self.emit(change(Table::Projects, ChangeKind::Insert, Some(&row), None));
        id
    }

    /// Make every call fail with a network error until switched back.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    /// Make every call touching `table` fail with `err`.
    pub fn fail_table(&self, table: Table, err: BackendError) {
        self.lock().failing.insert(table, err);
    }

    pub fn clear_failures(&self) {
        self.lock().failing.clear();
    }

    /// Row counts of the upsert calls made against `table`, oldest first.
    pub fn upsert_history(&self, table: Table) -> Vec<usize> {
        self.lock().upserts.get(&table).cloned().unwrap_or_default()
    }

    pub fn clear_history(&self) {
        self.lock().upserts.clear();
    }

    /// Number of rows currently stored in `table`.
    pub fn row_count(&self, table: Table) -> usize {
        let inner = self.lock();
        let t = &inner.tables;
        match table {
            Table::Projects => t.projects.len(),
            Table::Scenes => t.scenes.len(),
            Table::Characters => t.characters.len(),
            Table::Looks => t.looks.len(),
            Table::SceneCharacters => t.scene_characters.len(),
            Table::LookScenes => t.look_scenes.len(),
            Table::SceneCaptures => t.captures.len(),
            Table::Photos => t.photos.len(),
            Table::Schedules => t.schedules.len(),
            Table::CallSheets => t.call_sheets.len(),
            Table::ScriptUploads => t.scripts.len(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, change: RowChange) {
        // No subscribers is fine.
        let _ = self.changes.send(change);
    }

    fn emit_all(&self, changes: Vec<RowChange>) {
        for c in changes {
            self.emit(c);
        }
    }
}

fn change<T: Serialize>(
    table: Table,
    kind: ChangeKind,
    record: Option<&T>,
    old_record: Option<&T>,
) -> RowChange {
    RowChange {
        table,
        kind,
        record: record.and_then(|r| serde_json::to_value(r).ok()),
        old_record: old_record.and_then(|r| serde_json::to_value(r).ok()),
        commit_timestamp: Utc::now(),
    }
}

fn fk_violation(table: Table, parent: Table, id: EntityId) -> BackendError {
    BackendError::SchemaMismatch {
        table,
        message: format!("violates foreign key constraint: {parent} row {id} does not exist"),
    }
}

fn require<T>(
    rows: &BTreeMap<EntityId, T>,
    table: Table,
    parent: Table,
    id: EntityId,
) -> Result<(), BackendError> {
    if rows.contains_key(&id) {
        Ok(())
    } else {
        Err(fk_violation(table, parent, id))
    }
}

fn upsert_row<T: Clone + Serialize>(
    rows: &mut BTreeMap<EntityId, T>,
    table: Table,
    id: EntityId,
    row: &T,
    out: &mut Vec<RowChange>,
) {
    let old = rows.insert(id, row.clone());
    let kind = if old.is_some() {
        ChangeKind::Update
    } else {
        ChangeKind::Insert
    };
    out.push(change(table, kind, Some(row), old.as_ref()));
}

fn remove_row<T: Serialize>(
    rows: &mut BTreeMap<EntityId, T>,
    table: Table,
    id: EntityId,
    out: &mut Vec<RowChange>,
) -> bool {
    match rows.remove(&id) {
        Some(old) => {
            out.push(change(table, ChangeKind::Delete, None, Some(&old)));
            true
        }
        None => false,
    }
}

// ---------------------------------------------------------------------------
// Cascading deletes, mirroring the schema's ON DELETE rules
// ---------------------------------------------------------------------------

impl Tables {
    fn remove_photo(&mut self, id: EntityId, out: &mut Vec<RowChange>) -> bool {
        remove_row(&mut self.photos, Table::Photos, id, out)
    }

    fn remove_capture(&mut self, id: EntityId, out: &mut Vec<RowChange>) -> bool {
        let photos: Vec<EntityId> = self
            .photos
            .values()
            .filter(|p| p.capture_id == id)
            .map(|p| p.id)
            .collect();
        for photo in photos {
            self.remove_photo(photo, out);
        }
        remove_row(&mut self.captures, Table::SceneCaptures, id, out)
    }

    fn remove_scene_characters_where(
        &mut self,
        keep: impl Fn(&SceneCharacterRow) -> bool,
        out: &mut Vec<RowChange>,
    ) {
        let removed: Vec<SceneCharacterRow> = self
            .scene_characters
            .iter()
            .filter(|r| !keep(r))
            .cloned()
            .collect();
        for row in removed {
            self.scene_characters.remove(&row);
            out.push(change(Table::SceneCharacters, ChangeKind::Delete, None, Some(&row)));
        }
    }

    fn remove_scene(&mut self, id: EntityId, out: &mut Vec<RowChange>) -> bool {
        self.remove_scene_characters_where(|r| r.scene_id != id, out);
        let captures: Vec<EntityId> = self
            .captures
            .values()
            .filter(|c| c.scene_id == id)
            .map(|c| c.id)
            .collect();
        for capture in captures {
            self.remove_capture(capture, out);
        }
        remove_row(&mut self.scenes, Table::Scenes, id, out)
    }

    fn remove_look(&mut self, id: EntityId, out: &mut Vec<RowChange>) -> bool {
        let removed: Vec<LookSceneRow> = self
            .look_scenes
            .iter()
            .filter(|r| r.look_id == id)
            .cloned()
            .collect();
        for row in removed {
            self.look_scenes.remove(&row);
            out.push(change(Table::LookScenes, ChangeKind::Delete, None, Some(&row)));
        }
        // ON DELETE SET NULL
        for capture in self.captures.values_mut() {
            if capture.look_id == Some(id) {
                let old = capture.clone();
                capture.look_id = None;
                out.push(change(
                    Table::SceneCaptures,
                    ChangeKind::Update,
                    Some(&*capture),
                    Some(&old),
                ));
            }
        }
        remove_row(&mut self.looks, Table::Looks, id, out)
    }

    fn remove_character(&mut self, id: EntityId, out: &mut Vec<RowChange>) -> bool {
        let looks: Vec<EntityId> = self
            .looks
            .values()
            .filter(|l| l.character_id == id)
            .map(|l| l.id)
            .collect();
        for look in looks {
            self.remove_look(look, out);
        }
        self.remove_scene_characters_where(|r| r.character_id != id, out);
        let captures: Vec<EntityId> = self
            .captures
            .values()
            .filter(|c| c.character_id == id)
            .map(|c| c.id)
            .collect();
        for capture in captures {
            self.remove_capture(capture, out);
        }
        remove_row(&mut self.characters, Table::Characters, id, out)
    }

    fn remove_project(&mut self, id: EntityId, out: &mut Vec<RowChange>) -> bool {
        let scenes: Vec<EntityId> = owned_by(&self.scenes, id, |r| r.project_id, |r| r.id);
        for scene in scenes {
            self.remove_scene(scene, out);
        }
        let characters: Vec<EntityId> = owned_by(&self.characters, id, |r| r.project_id, |r| r.id);
        for character in characters {
            self.remove_character(character, out);
        }
        for schedule in owned_by(&self.schedules, id, |r| r.project_id, |r| r.id) {
            remove_row(&mut self.schedules, Table::Schedules, schedule, out);
        }
        for sheet in owned_by(&self.call_sheets, id, |r| r.project_id, |r| r.id) {
            remove_row(&mut self.call_sheets, Table::CallSheets, sheet, out);
        }
        for script in owned_by(&self.scripts, id, |r| r.project_id, |r| r.id) {
            remove_row(&mut self.scripts, Table::ScriptUploads, script, out);
        }
        remove_row(&mut self.projects, Table::Projects, id, out)
    }
}

fn owned_by<T>(
    rows: &BTreeMap<EntityId, T>,
    project_id: EntityId,
    owner: impl Fn(&T) -> EntityId,
    id: impl Fn(&T) -> EntityId,
) -> Vec<EntityId> {
    rows.values()
        .filter(|r| owner(r) == project_id)
        .map(id)
        .collect()
}

fn by_project<T: Clone>(
    rows: &BTreeMap<EntityId, T>,
    project_id: EntityId,
    owner: impl Fn(&T) -> EntityId,
) -> Vec<T> {
    rows.values()
        .filter(|r| owner(r) == project_id)
        .cloned()
        .collect()
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn ping(&self) -> Result<(), BackendError> {
        self.lock().check(Table::Projects)
    }

    async fn fetch_project(
        &self,
        project_id: EntityId,
    ) -> Result<Option<ProjectRow>, BackendError> {
        let inner = self.lock();
        inner.check(Table::Projects)?;
        Ok(inner.tables.projects.get(&project_id).cloned())
    }

    async fn list_scenes(&self, project_id: EntityId) -> Result<Vec<SceneRow>, BackendError> {
        let inner = self.lock();
        inner.check(Table::Scenes)?;
        Ok(by_project(&inner.tables.scenes, project_id, |r| r.project_id))
    }

    async fn list_characters(
        &self,
        project_id: EntityId,
    ) -> Result<Vec<CharacterRow>, BackendError> {
        let inner = self.lock();
        inner.check(Table::Characters)?;
        Ok(by_project(&inner.tables.characters, project_id, |r| r.project_id))
    }

    async fn list_looks(&self, project_id: EntityId) -> Result<Vec<LookRow>, BackendError> {
        let inner = self.lock();
        inner.check(Table::Looks)?;
        Ok(by_project(&inner.tables.looks, project_id, |r| r.project_id))
    }

    async fn latest_schedule(
        &self,
        project_id: EntityId,
    ) -> Result<Option<ScheduleRow>, BackendError> {
        let inner = self.lock();
        inner.check(Table::Schedules)?;
        Ok(by_project(&inner.tables.schedules, project_id, |r| r.project_id)
            .into_iter()
            .max_by_key(|r| (r.uploaded_at, r.id)))
    }

    async fn list_call_sheets(
        &self,
        project_id: EntityId,
    ) -> Result<Vec<CallSheetRow>, BackendError> {
        let inner = self.lock();
        inner.check(Table::CallSheets)?;
        let mut rows = by_project(&inner.tables.call_sheets, project_id, |r| r.project_id);
        rows.sort_by_key(|r| (r.shooting_date, r.id));
        Ok(rows)
    }

    async fn latest_script(
        &self,
        project_id: EntityId,
    ) -> Result<Option<ScriptUploadRow>, BackendError> {
        let inner = self.lock();
        inner.check(Table::ScriptUploads)?;
        Ok(by_project(&inner.tables.scripts, project_id, |r| r.project_id)
            .into_iter()
            .max_by_key(|r| (r.uploaded_at, r.id)))
    }

    async fn list_scene_characters(
        &self,
        scene_ids: &[EntityId],
    ) -> Result<Vec<SceneCharacterRow>, BackendError> {
        let inner = self.lock();
        inner.check(Table::SceneCharacters)?;
        let wanted: HashSet<&EntityId> = scene_ids.iter().collect();
        Ok(inner
            .tables
            .scene_characters
            .iter()
            .filter(|r| wanted.contains(&r.scene_id))
            .cloned()
            .collect())
    }

    async fn list_look_scenes(
        &self,
        look_ids: &[EntityId],
    ) -> Result<Vec<LookSceneRow>, BackendError> {
        let inner = self.lock();
        inner.check(Table::LookScenes)?;
        let wanted: HashSet<&EntityId> = look_ids.iter().collect();
        Ok(inner
            .tables
            .look_scenes
            .iter()
            .filter(|r| wanted.contains(&r.look_id))
            .cloned()
            .collect())
    }

    async fn list_captures(&self, scene_ids: &[EntityId]) -> Result<Vec<CaptureRow>, BackendError> {
        let inner = self.lock();
        inner.check(Table::SceneCaptures)?;
        let wanted: HashSet<&EntityId> = scene_ids.iter().collect();
        Ok(inner
            .tables
            .captures
            .values()
            .filter(|r| wanted.contains(&r.scene_id))
            .cloned()
            .collect())
    }

    async fn list_photos(&self, capture_ids: &[EntityId]) -> Result<Vec<PhotoRow>, BackendError> {
        let inner = self.lock();
        inner.check(Table::Photos)?;
        let wanted: HashSet<&EntityId> = capture_ids.iter().collect();
        Ok(inner
            .tables
            .photos
            .values()
            .filter(|r| wanted.contains(&r.capture_id))
            .cloned()
            .collect())
    }

    async fn existing_photo_ids(
        &self,
        photo_ids: &[EntityId],
    ) -> Result<HashSet<EntityId>, BackendError> {
        let inner = self.lock();
        inner.check(Table::Photos)?;
        Ok(photo_ids
            .iter()
            .filter(|id| inner.tables.photos.contains_key(id))
            .copied()
            .collect())
    }

    async fn upsert_scenes(&self, rows: &[SceneRow]) -> Result<(), BackendError> {
        let mut inner = self.lock();
        inner.check(Table::Scenes)?;
        for row in rows {
            require(&inner.tables.projects, Table::Scenes, Table::Projects, row.project_id)?;
        }
        inner.record_upsert(Table::Scenes, rows.len());
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            upsert_row(&mut inner.tables.scenes, Table::Scenes, row.id, row, &mut out);
        }
        self.emit_all(out);
        Ok(())
    }

    async fn upsert_characters(&self, rows: &[CharacterRow]) -> Result<(), BackendError> {
        let mut inner = self.lock();
        inner.check(Table::Characters)?;
        for row in rows {
            require(&inner.tables.projects, Table::Characters, Table::Projects, row.project_id)?;
        }
        inner.record_upsert(Table::Characters, rows.len());
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            upsert_row(&mut inner.tables.characters, Table::Characters, row.id, row, &mut out);
        }
        self.emit_all(out);
        Ok(())
    }

    async fn upsert_looks(&self, rows: &[LookRow]) -> Result<(), BackendError> {
        let mut inner = self.lock();
        inner.check(Table::Looks)?;
        for row in rows {
            require(&inner.tables.projects, Table::Looks, Table::Projects, row.project_id)?;
            require(&inner.tables.characters, Table::Looks, Table::Characters, row.character_id)?;
        }
        inner.record_upsert(Table::Looks, rows.len());
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            upsert_row(&mut inner.tables.looks, Table::Looks, row.id, row, &mut out);
        }
        self.emit_all(out);
        Ok(())
    }

    async fn upsert_captures(&self, rows: &[CaptureRow]) -> Result<(), BackendError> {
        let mut inner = self.lock();
        inner.check(Table::SceneCaptures)?;
        let table = Table::SceneCaptures;
        for row in rows {
            require(&inner.tables.scenes, table, Table::Scenes, row.scene_id)?;
            require(&inner.tables.characters, table, Table::Characters, row.character_id)?;
            if let Some(look_id) = row.look_id {
                require(&inner.tables.looks, table, Table::Looks, look_id)?;
            }
        }
        inner.record_upsert(table, rows.len());
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            upsert_row(&mut inner.tables.captures, table, row.id, row, &mut out);
        }
        self.emit_all(out);
        Ok(())
    }

    async fn insert_photo(&self, row: &PhotoRow) -> Result<(), BackendError> {
        let mut inner = self.lock();
        inner.check(Table::Photos)?;
        require(&inner.tables.captures, Table::Photos, Table::SceneCaptures, row.capture_id)?;
        if inner.tables.photos.contains_key(&row.id) {
            return Ok(());
        }
        inner.tables.photos.insert(row.id, row.clone());
        self.emit(change(Table::Photos, ChangeKind::Insert, Some(row), None));
        Ok(())
    }

    async fn upsert_schedule(&self, row: &ScheduleRow) -> Result<(), BackendError> {
        let mut inner = self.lock();
        inner.check(Table::Schedules)?;
        require(&inner.tables.projects, Table::Schedules, Table::Projects, row.project_id)?;
        inner.record_upsert(Table::Schedules, 1);
        let mut out = Vec::with_capacity(1);
        upsert_row(&mut inner.tables.schedules, Table::Schedules, row.id, row, &mut out);
        self.emit_all(out);
        Ok(())
    }

    async fn upsert_call_sheets(&self, rows: &[CallSheetRow]) -> Result<(), BackendError> {
        let mut inner = self.lock();
        inner.check(Table::CallSheets)?;
        for row in rows {
            require(&inner.tables.projects, Table::CallSheets, Table::Projects, row.project_id)?;
        }
        inner.record_upsert(Table::CallSheets, rows.len());
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            upsert_row(&mut inner.tables.call_sheets, Table::CallSheets, row.id, row, &mut out);
        }
        self.emit_all(out);
        Ok(())
    }

    async fn upsert_script(&self, row: &ScriptUploadRow) -> Result<(), BackendError> {
        let mut inner = self.lock();
        inner.check(Table::ScriptUploads)?;
        require(&inner.tables.projects, Table::ScriptUploads, Table::Projects, row.project_id)?;
        inner.record_upsert(Table::ScriptUploads, 1);
        let mut out = Vec::with_capacity(1);
        upsert_row(&mut inner.tables.scripts, Table::ScriptUploads, row.id, row, &mut out);
        self.emit_all(out);
        Ok(())
    }

    async fn delete_rows(&self, table: Table, ids: &[EntityId]) -> Result<u64, BackendError> {
        let mut inner = self.lock();
        inner.check(table)?;
        let mut out = Vec::new();
        let t = &mut inner.tables;
        let mut removed = 0u64;
        for &id in ids {
            let hit = match table {
                Table::Projects => t.remove_project(id, &mut out),
                Table::Scenes => t.remove_scene(id, &mut out),
                Table::Characters => t.remove_character(id, &mut out),
                Table::Looks => t.remove_look(id, &mut out),
                Table::SceneCaptures => t.remove_capture(id, &mut out),
                Table::Photos => t.remove_photo(id, &mut out),
                Table::Schedules => remove_row(&mut t.schedules, table, id, &mut out),
                Table::CallSheets => remove_row(&mut t.call_sheets, table, id, &mut out),
                Table::ScriptUploads => remove_row(&mut t.scripts, table, id, &mut out),
                Table::SceneCharacters | Table::LookScenes => {
                    return Err(BackendError::SchemaMismatch {
                        table,
                        message: "junction rows have no id column".into(),
                    });
                }
            };
            if hit {
                removed += 1;
            }
        }
        self.emit_all(out);
        Ok(removed)
    }

    async fn apply_scene_character_diff(
        &self,
        insert: &[SceneCharacterRow],
        delete: &[SceneCharacterRow],
    ) -> Result<(), BackendError> {
        let mut inner = self.lock();
        let table = Table::SceneCharacters;
        inner.check(table)?;
        for row in insert {
            require(&inner.tables.scenes, table, Table::Scenes, row.scene_id)?;
            require(&inner.tables.characters, table, Table::Characters, row.character_id)?;
        }
        let mut out = Vec::new();
        let t = &mut inner.tables;
        for row in delete {
            if t.scene_characters.remove(row) {
                out.push(change(table, ChangeKind::Delete, None, Some(row)));
            }
        }
        for row in insert {
            if t.scene_characters.insert(row.clone()) {
                out.push(change(table, ChangeKind::Insert, Some(row), None));
            }
        }
        self.emit_all(out);
        Ok(())
    }

    async fn apply_look_scene_diff(
        &self,
        insert: &[LookSceneRow],
        delete: &[LookSceneRow],
    ) -> Result<(), BackendError> {
        let mut inner = self.lock();
        let table = Table::LookScenes;
        inner.check(table)?;
        for row in insert {
            require(&inner.tables.looks, table, Table::Looks, row.look_id)?;
        }
        let mut out = Vec::new();
        let t = &mut inner.tables;
        for row in delete {
            if t.look_scenes.remove(row) {
                out.push(change(table, ChangeKind::Delete, None, Some(row)));
            }
        }
        for row in insert {
            if t.look_scenes.insert(row.clone()) {
                out.push(change(table, ChangeKind::Insert, Some(row), None));
            }
        }
        self.emit_all(out);
        Ok(())
    }
}
