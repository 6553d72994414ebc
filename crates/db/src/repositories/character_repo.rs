//! Repository for the `characters` table.

use sqlx::PgPool;
use continuity_core::EntityId;

use crate::models::CharacterRow;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, project_id, name, initials, color";

/// Provides select and upsert operations for characters.
pub struct CharacterRepo;

impl CharacterRepo {
    /// List all characters of a project.
    pub async fn list_by_project(
        pool: &PgPool,
        project_id: EntityId,
    ) -> Result<Vec<CharacterRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM characters WHERE project_id = $1 ORDER BY id");
        sqlx::query_as::<_, CharacterRow>(&query)
            .bind(project_id)
            .fetch_all(pool)
            .await
    }

    /// Upsert characters by id within a transaction.
    pub async fn upsert_many(pool: &PgPool, rows: &[CharacterRow]) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;
        for row in rows {
            sqlx::query(
                "INSERT INTO characters (id, project_id, name, initials, color) \
                 VALUES ($1, $2, $3, $4, $5) \
                 ON CONFLICT (id) DO UPDATE SET \
                    name = EXCLUDED.name, \
                    initials = EXCLUDED.initials, \
                    color = EXCLUDED.color, \
                    updated_at = NOW()",
            )
            .bind(row.id)
            .bind(row.project_id)
            .bind(&row.name)
            .bind(&row.initials)
            .bind(&row.color)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await
    }
}
