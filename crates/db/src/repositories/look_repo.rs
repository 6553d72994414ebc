//! Repository for the `looks` table.

use sqlx::PgPool;
use continuity_core::EntityId;

use crate::models::LookRow;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, project_id, character_id, name, description, estimated_minutes, \
    makeup, hair, master_reference, continuity_flags, continuity_events, sfx_details";

/// Provides select and upsert operations for looks.
pub struct LookRepo;

impl LookRepo {
    /// List all looks of a project.
    pub async fn list_by_project(
        pool: &PgPool,
        project_id: EntityId,
    ) -> Result<Vec<LookRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM looks WHERE project_id = $1 ORDER BY id");
        sqlx::query_as::<_, LookRow>(&query)
            .bind(project_id)
            .fetch_all(pool)
            .await
    }

    /// Upsert looks by id within a transaction.
    pub async fn upsert_many(pool: &PgPool, rows: &[LookRow]) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;
        for row in rows {
            sqlx::query(
                "INSERT INTO looks \
                    (id, project_id, character_id, name, description, estimated_minutes, \
                     makeup, hair, master_reference, continuity_flags, continuity_events, \
                     sfx_details) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
                 ON CONFLICT (id) DO UPDATE SET \
                    character_id = EXCLUDED.character_id, \
                    name = EXCLUDED.name, \
                    description = EXCLUDED.description, \
                    estimated_minutes = EXCLUDED.estimated_minutes, \
                    makeup = EXCLUDED.makeup, \
                    hair = EXCLUDED.hair, \
                    master_reference = EXCLUDED.master_reference, \
                    continuity_flags = EXCLUDED.continuity_flags, \
                    continuity_events = EXCLUDED.continuity_events, \
                    sfx_details = EXCLUDED.sfx_details, \
                    updated_at = NOW()",
            )
            .bind(row.id)
            .bind(row.project_id)
            .bind(row.character_id)
            .bind(&row.name)
            .bind(&row.description)
            .bind(row.estimated_minutes)
            .bind(&row.makeup)
            .bind(&row.hair)
            .bind(&row.master_reference)
            .bind(&row.continuity_flags)
            .bind(&row.continuity_events)
            .bind(&row.sfx_details)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await
    }
}
