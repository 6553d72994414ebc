//! Repository for the `projects` table.

use sqlx::PgPool;
use continuity_core::{EntityId, Table};

use crate::models::ProjectRow;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, name, created_at";

/// Read access to projects. Project rows are managed outside the sync engine.
pub struct ProjectRepo;

impl ProjectRepo {
    /// Find a project by id.
    pub async fn find_by_id(pool: &PgPool, id: EntityId) -> Result<Option<ProjectRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM projects WHERE id = $1");
        sqlx::query_as::<_, ProjectRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Round-trip a trivial query to check connectivity.
    pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(pool).await?;
        Ok(())
    }

    /// Delete rows of any synced table by id. Children cascade via FKs.
    ///
    /// Returns the number of rows removed.
    pub async fn delete_by_ids(
        pool: &PgPool,
        table: Table,
        ids: &[EntityId],
    ) -> Result<u64, sqlx::Error> {
        if ids.is_empty() {
            return Ok(0);
        }
        let query = format!("DELETE FROM {} WHERE id = ANY($1)", table.name());
        let result = sqlx::query(&query).bind(ids).execute(pool).await?;
        Ok(result.rows_affected())
    }
}
