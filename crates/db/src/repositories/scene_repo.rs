//! Repository for the `scenes` table.

use sqlx::PgPool;
use continuity_core::EntityId;

use crate::models::SceneRow;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, project_id, scene_number, int_ext, location, time_of_day, \
    synopsis, filming_status, filming_notes, is_complete";

/// Provides select and upsert operations for scenes.
pub struct SceneRepo;

impl SceneRepo {
    /// List all scenes of a project.
    pub async fn list_by_project(
        pool: &PgPool,
        project_id: EntityId,
    ) -> Result<Vec<SceneRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM scenes WHERE project_id = $1 ORDER BY id");
        sqlx::query_as::<_, SceneRow>(&query)
            .bind(project_id)
            .fetch_all(pool)
            .await
    }

    /// Upsert scenes by id within a transaction. Whole rows are replaced.
    pub async fn upsert_many(pool: &PgPool, rows: &[SceneRow]) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;
        for row in rows {
            sqlx::query(
                "INSERT INTO scenes \
                    (id, project_id, scene_number, int_ext, location, time_of_day, \
                     synopsis, filming_status, filming_notes, is_complete) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
                 ON CONFLICT (id) DO UPDATE SET \
                    scene_number = EXCLUDED.scene_number, \
                    int_ext = EXCLUDED.int_ext, \
                    location = EXCLUDED.location, \
                    time_of_day = EXCLUDED.time_of_day, \
                    synopsis = EXCLUDED.synopsis, \
                    filming_status = EXCLUDED.filming_status, \
                    filming_notes = EXCLUDED.filming_notes, \
                    is_complete = EXCLUDED.is_complete, \
                    updated_at = NOW()",
            )
            .bind(row.id)
            .bind(row.project_id)
            .bind(&row.scene_number)
            .bind(&row.int_ext)
            .bind(&row.location)
            .bind(&row.time_of_day)
            .bind(&row.synopsis)
            .bind(&row.filming_status)
            .bind(&row.filming_notes)
            .bind(row.is_complete)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await
    }
}
