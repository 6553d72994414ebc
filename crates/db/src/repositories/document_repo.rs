//! Repositories for project documents: schedules, call sheets and scripts.

use sqlx::PgPool;
use continuity_core::EntityId;

use crate::models::{CallSheetRow, ScheduleRow, ScriptUploadRow};

const SCHEDULE_COLUMNS: &str =
    "id, project_id, raw_text, days, cast_list, pdf_name, pdf_path, uploaded_at";

const CALL_SHEET_COLUMNS: &str = "id, project_id, shooting_date, day_number, raw_text, data, \
    pdf_name, pdf_path, uploaded_at";

const SCRIPT_COLUMNS: &str =
    "id, project_id, file_name, raw_text, scene_count, pdf_path, uploaded_at";

/// Shooting schedules. A project reads back only its newest upload.
pub struct ScheduleRepo;

impl ScheduleRepo {
    pub async fn latest(
        pool: &PgPool,
        project_id: EntityId,
    ) -> Result<Option<ScheduleRow>, sqlx::Error> {
        let query = format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE project_id = $1 \
             ORDER BY uploaded_at DESC, id DESC LIMIT 1"
        );
        sqlx::query_as::<_, ScheduleRow>(&query)
            .bind(project_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn upsert(pool: &PgPool, row: &ScheduleRow) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO schedules \
                (id, project_id, raw_text, days, cast_list, pdf_name, pdf_path, uploaded_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (id) DO UPDATE SET \
                raw_text = EXCLUDED.raw_text, \
                days = EXCLUDED.days, \
                cast_list = EXCLUDED.cast_list, \
                pdf_name = EXCLUDED.pdf_name, \
                pdf_path = EXCLUDED.pdf_path, \
                uploaded_at = EXCLUDED.uploaded_at, \
                updated_at = NOW()",
        )
        .bind(row.id)
        .bind(row.project_id)
        .bind(&row.raw_text)
        .bind(&row.days)
        .bind(&row.cast_list)
        .bind(&row.pdf_name)
        .bind(&row.pdf_path)
        .bind(row.uploaded_at)
        .execute(pool)
        .await?;
        Ok(())
    }
}

/// Daily call sheets.
pub struct CallSheetRepo;

impl CallSheetRepo {
    pub async fn list_by_project(
        pool: &PgPool,
        project_id: EntityId,
    ) -> Result<Vec<CallSheetRow>, sqlx::Error> {
        let query = format!(
            "SELECT {CALL_SHEET_COLUMNS} FROM call_sheets WHERE project_id = $1 \
             ORDER BY shooting_date, id"
        );
        sqlx::query_as::<_, CallSheetRow>(&query)
            .bind(project_id)
            .fetch_all(pool)
            .await
    }

    pub async fn upsert_many(pool: &PgPool, rows: &[CallSheetRow]) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;
        for row in rows {
            sqlx::query(
                "INSERT INTO call_sheets \
                    (id, project_id, shooting_date, day_number, raw_text, data, \
                     pdf_name, pdf_path, uploaded_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
                 ON CONFLICT (id) DO UPDATE SET \
                    shooting_date = EXCLUDED.shooting_date, \
                    day_number = EXCLUDED.day_number, \
                    raw_text = EXCLUDED.raw_text, \
                    data = EXCLUDED.data, \
                    pdf_name = EXCLUDED.pdf_name, \
                    pdf_path = EXCLUDED.pdf_path, \
                    uploaded_at = EXCLUDED.uploaded_at, \
                    updated_at = NOW()",
            )
            .bind(row.id)
            .bind(row.project_id)
            .bind(row.shooting_date)
            .bind(row.day_number)
            .bind(&row.raw_text)
            .bind(&row.data)
            .bind(&row.pdf_name)
            .bind(&row.pdf_path)
            .bind(row.uploaded_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await
    }
}

/// Uploaded screenplays. A project reads back only its newest upload.
pub struct ScriptUploadRepo;

impl ScriptUploadRepo {
    pub async fn latest(
        pool: &PgPool,
        project_id: EntityId,
    ) -> Result<Option<ScriptUploadRow>, sqlx::Error> {
        let query = format!(
            "SELECT {SCRIPT_COLUMNS} FROM script_uploads WHERE project_id = $1 \
             ORDER BY uploaded_at DESC, id DESC LIMIT 1"
        );
        sqlx::query_as::<_, ScriptUploadRow>(&query)
            .bind(project_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn upsert(pool: &PgPool, row: &ScriptUploadRow) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO script_uploads \
                (id, project_id, file_name, raw_text, scene_count, pdf_path, uploaded_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (id) DO UPDATE SET \
                file_name = EXCLUDED.file_name, \
                raw_text = EXCLUDED.raw_text, \
                scene_count = EXCLUDED.scene_count, \
                pdf_path = EXCLUDED.pdf_path, \
                uploaded_at = EXCLUDED.uploaded_at, \
                updated_at = NOW()",
        )
        .bind(row.id)
        .bind(row.project_id)
        .bind(&row.file_name)
        .bind(&row.raw_text)
        .bind(row.scene_count)
        .bind(&row.pdf_path)
        .bind(row.uploaded_at)
        .execute(pool)
        .await?;
        Ok(())
    }
}
