//! [`RowStore`] over Postgres.

use std::collections::HashSet;

use async_trait::async_trait;
use continuity_core::{EntityId, Table};

use crate::error::{classify_sqlx_error, BackendError};
use crate::models::{
    CallSheetRow, CaptureRow, CharacterRow, LookRow, LookSceneRow, PhotoRow, ProjectRow,
    SceneCharacterRow, SceneRow, ScheduleRow, ScriptUploadRow,
};
use crate::repositories::{
    CallSheetRepo, CaptureRepo, CharacterRepo, LookRepo, LookSceneRepo, PhotoRepo, ProjectRepo,
    SceneCharacterRepo, SceneRepo, ScheduleRepo, ScriptUploadRepo,
};
use crate::store::RowStore;
use crate::DbPool;

#[derive(Clone)]
pub struct PgRowStore {
    pool: DbPool,
}

impl PgRowStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

/// Map a repository result into the backend taxonomy for `table`.
fn on(table: Table) -> impl FnOnce(sqlx::Error) -> BackendError {
    move |e| classify_sqlx_error(table, e)
}

#[async_trait]
impl RowStore for PgRowStore {
    async fn ping(&self) -> Result<(), BackendError> {
        ProjectRepo::ping(&self.pool).await.map_err(on(Table::Projects))
    }

    async fn fetch_project(
        &self,
        project_id: EntityId,
    ) -> Result<Option<ProjectRow>, BackendError> {
        ProjectRepo::find_by_id(&self.pool, project_id)
            .await
            .map_err(on(Table::Projects))
    }

    async fn list_scenes(&self, project_id: EntityId) -> Result<Vec<SceneRow>, BackendError> {
        SceneRepo::list_by_project(&self.pool, project_id)
            .await
            .map_err(on(Table::Scenes))
    }

    async fn list_characters(
        &self,
        project_id: EntityId,
    ) -> Result<Vec<CharacterRow>, BackendError> {
        CharacterRepo::list_by_project(&self.pool, project_id)
            .await
            .map_err(on(Table::Characters))
    }

    async fn list_looks(&self, project_id: EntityId) -> Result<Vec<LookRow>, BackendError> {
        LookRepo::list_by_project(&self.pool, project_id)
            .await
            .map_err(on(Table::Looks))
    }

    async fn latest_schedule(
        &self,
        project_id: EntityId,
    ) -> Result<Option<ScheduleRow>, BackendError> {
        ScheduleRepo::latest(&self.pool, project_id)
            .await
            .map_err(on(Table::Schedules))
    }

    async fn list_call_sheets(
        &self,
        project_id: EntityId,
    ) -> Result<Vec<CallSheetRow>, BackendError> {
        CallSheetRepo::list_by_project(&self.pool, project_id)
            .await
            .map_err(on(Table::CallSheets))
    }

    async fn latest_script(
        &self,
        project_id: EntityId,
    ) -> Result<Option<ScriptUploadRow>, BackendError> {
        ScriptUploadRepo::latest(&self.pool, project_id)
            .await
            .map_err(on(Table::ScriptUploads))
    }

    async fn list_scene_characters(
        &self,
        scene_ids: &[EntityId],
    ) -> Result<Vec<SceneCharacterRow>, BackendError> {
        SceneCharacterRepo::list_by_scenes(&self.pool, scene_ids)
            .await
            .map_err(on(Table::SceneCharacters))
    }

    async fn list_look_scenes(
        &self,
        look_ids: &[EntityId],
    ) -> Result<Vec<LookSceneRow>, BackendError> {
        LookSceneRepo::list_by_looks(&self.pool, look_ids)
            .await
            .map_err(on(Table::LookScenes))
    }

    async fn list_captures(&self, scene_ids: &[EntityId]) -> Result<Vec<CaptureRow>, BackendError> {
        CaptureRepo::list_by_scenes(&self.pool, scene_ids)
            .await
            .map_err(on(Table::SceneCaptures))
    }

    async fn list_photos(&self, capture_ids: &[EntityId]) -> Result<Vec<PhotoRow>, BackendError> {
        PhotoRepo::list_by_captures(&self.pool, capture_ids)
            .await
            .map_err(on(Table::Photos))
    }

    async fn existing_photo_ids(
        &self,
        photo_ids: &[EntityId],
    ) -> Result<HashSet<EntityId>, BackendError> {
        PhotoRepo::existing_ids(&self.pool, photo_ids)
            .await
            .map_err(on(Table::Photos))
    }

    async fn upsert_scenes(&self, rows: &[SceneRow]) -> Result<(), BackendError> {
        SceneRepo::upsert_many(&self.pool, rows)
            .await
            .map_err(on(Table::Scenes))
    }

    async fn upsert_characters(&self, rows: &[CharacterRow]) -> Result<(), BackendError> {
        CharacterRepo::upsert_many(&self.pool, rows)
            .await
            .map_err(on(Table::Characters))
    }

    async fn upsert_looks(&self, rows: &[LookRow]) -> Result<(), BackendError> {
        LookRepo::upsert_many(&self.pool, rows)
            .await
            .map_err(on(Table::Looks))
    }

    async fn upsert_captures(&self, rows: &[CaptureRow]) -> Result<(), BackendError> {
        CaptureRepo::upsert_many(&self.pool, rows)
            .await
            .map_err(on(Table::SceneCaptures))
    }

    async fn insert_photo(&self, row: &PhotoRow) -> Result<(), BackendError> {
        PhotoRepo::insert(&self.pool, row)
            .await
            .map_err(on(Table::Photos))
    }

    async fn upsert_schedule(&self, row: &ScheduleRow) -> Result<(), BackendError> {
        ScheduleRepo::upsert(&self.pool, row)
            .await
            .map_err(on(Table::Schedules))
    }

    async fn upsert_call_sheets(&self, rows: &[CallSheetRow]) -> Result<(), BackendError> {
        CallSheetRepo::upsert_many(&self.pool, rows)
            .await
            .map_err(on(Table::CallSheets))
    }

    async fn upsert_script(&self, row: &ScriptUploadRow) -> Result<(), BackendError> {
        ScriptUploadRepo::upsert(&self.pool, row)
            .await
            .map_err(on(Table::ScriptUploads))
    }

    async fn delete_rows(&self, table: Table, ids: &[EntityId]) -> Result<u64, BackendError> {
        ProjectRepo::delete_by_ids(&self.pool, table, ids)
            .await
            .map_err(on(table))
    }

    async fn apply_scene_character_diff(
        &self,
        insert: &[SceneCharacterRow],
        delete: &[SceneCharacterRow],
    ) -> Result<(), BackendError> {
        SceneCharacterRepo::apply_diff(&self.pool, insert, delete)
            .await
            .map_err(on(Table::SceneCharacters))
    }

    async fn apply_look_scene_diff(
        &self,
        insert: &[LookSceneRow],
        delete: &[LookSceneRow],
    ) -> Result<(), BackendError> {
        LookSceneRepo::apply_diff(&self.pool, insert, delete)
            .await
            .map_err(on(Table::LookScenes))
    }
}
