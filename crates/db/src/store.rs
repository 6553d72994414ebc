//! The backend data interface consumed by the sync engine.

use std::collections::HashSet;

use async_trait::async_trait;
use continuity_core::{EntityId, Table};

use crate::error::BackendError;
use crate::models::{
    CallSheetRow, CaptureRow, CharacterRow, LookRow, LookSceneRow, PhotoRow, ProjectRow,
    SceneCharacterRow, SceneRow, ScheduleRow, ScriptUploadRow,
};

/// Row-level access to one backend.
///
/// Upserts replace whole rows by id (row-level last-writer-wins). Junction
/// tables are changed only through the `apply_*_diff` methods, which must
/// apply their inserts and deletes in a single transaction.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Cheap reachability probe.
    async fn ping(&self) -> Result<(), BackendError>;

    async fn fetch_project(&self, project_id: EntityId)
        -> Result<Option<ProjectRow>, BackendError>;

    // ---- project-scoped selects ----

    async fn list_scenes(&self, project_id: EntityId) -> Result<Vec<SceneRow>, BackendError>;

    async fn list_characters(&self, project_id: EntityId)
        -> Result<Vec<CharacterRow>, BackendError>;

    async fn list_looks(&self, project_id: EntityId) -> Result<Vec<LookRow>, BackendError>;

    /// Most recently uploaded schedule, if any.
    async fn latest_schedule(&self, project_id: EntityId)
        -> Result<Option<ScheduleRow>, BackendError>;

    async fn list_call_sheets(&self, project_id: EntityId)
        -> Result<Vec<CallSheetRow>, BackendError>;

    /// Most recently uploaded script, if any.
    async fn latest_script(&self, project_id: EntityId)
        -> Result<Option<ScriptUploadRow>, BackendError>;

    // ---- id-set selects ----

    async fn list_scene_characters(
        &self,
        scene_ids: &[EntityId],
    ) -> Result<Vec<SceneCharacterRow>, BackendError>;

    async fn list_look_scenes(&self, look_ids: &[EntityId])
        -> Result<Vec<LookSceneRow>, BackendError>;

    async fn list_captures(&self, scene_ids: &[EntityId]) -> Result<Vec<CaptureRow>, BackendError>;

    async fn list_photos(&self, capture_ids: &[EntityId]) -> Result<Vec<PhotoRow>, BackendError>;

    /// The subset of `photo_ids` that already have a row.
    async fn existing_photo_ids(
        &self,
        photo_ids: &[EntityId],
    ) -> Result<HashSet<EntityId>, BackendError>;

    // ---- writes ----

    async fn upsert_scenes(&self, rows: &[SceneRow]) -> Result<(), BackendError>;

    async fn upsert_characters(&self, rows: &[CharacterRow]) -> Result<(), BackendError>;

    async fn upsert_looks(&self, rows: &[LookRow]) -> Result<(), BackendError>;

    async fn upsert_captures(&self, rows: &[CaptureRow]) -> Result<(), BackendError>;

    /// Insert a photo row. A row with the same id is left untouched.
    async fn insert_photo(&self, row: &PhotoRow) -> Result<(), BackendError>;

    async fn upsert_schedule(&self, row: &ScheduleRow) -> Result<(), BackendError>;

    async fn upsert_call_sheets(&self, rows: &[CallSheetRow]) -> Result<(), BackendError>;

    async fn upsert_script(&self, row: &ScriptUploadRow) -> Result<(), BackendError>;

    /// Delete rows by id; children cascade. Returns the number removed.
    async fn delete_rows(&self, table: Table, ids: &[EntityId]) -> Result<u64, BackendError>;

    /// Atomically insert (ignoring existing) and delete scene↔character rows.
    async fn apply_scene_character_diff(
        &self,
        insert: &[SceneCharacterRow],
        delete: &[SceneCharacterRow],
    ) -> Result<(), BackendError>;

    /// Atomically insert (ignoring existing) and delete look↔scene rows.
    async fn apply_look_scene_diff(
        &self,
        insert: &[LookSceneRow],
        delete: &[LookSceneRow],
    ) -> Result<(), BackendError>;
}
