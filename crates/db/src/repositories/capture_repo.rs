//! Repository for the `scene_captures` table.

use sqlx::PgPool;
use continuity_core::EntityId;

use crate::models::CaptureRow;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, scene_id, character_id, look_id, continuity_flags, \
    continuity_events, sfx_details, notes, application_minutes, captured_at";

/// Provides select and upsert operations for scene captures.
pub struct CaptureRepo;

impl CaptureRepo {
    /// List captures belonging to any of the given scenes.
    pub async fn list_by_scenes(
        pool: &PgPool,
        scene_ids: &[EntityId],
    ) -> Result<Vec<CaptureRow>, sqlx::Error> {
        if scene_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query =
            format!("SELECT {COLUMNS} FROM scene_captures WHERE scene_id = ANY($1) ORDER BY id");
        sqlx::query_as::<_, CaptureRow>(&query)
            .bind(scene_ids)
            .fetch_all(pool)
            .await
    }

    /// Upsert captures by id within a transaction.
    pub async fn upsert_many(pool: &PgPool, rows: &[CaptureRow]) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;
        for row in rows {
            sqlx::query(
                "INSERT INTO scene_captures \
                    (id, scene_id, character_id, look_id, continuity_flags, \
                     continuity_events, sfx_details, notes, application_minutes, captured_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
                 ON CONFLICT (id) DO UPDATE SET \
                    look_id = EXCLUDED.look_id, \
                    continuity_flags = EXCLUDED.continuity_flags, \
                    continuity_events = EXCLUDED.continuity_events, \
                    sfx_details = EXCLUDED.sfx_details, \
                    notes = EXCLUDED.notes, \
                    application_minutes = EXCLUDED.application_minutes, \
                    captured_at = EXCLUDED.captured_at, \
                    updated_at = NOW()",
            )
            .bind(row.id)
            .bind(row.scene_id)
            .bind(row.character_id)
            .bind(row.look_id)
            .bind(&row.continuity_flags)
            .bind(&row.continuity_events)
            .bind(&row.sfx_details)
            .bind(&row.notes)
            .bind(row.application_minutes)
            .bind(row.captured_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await
    }
}
