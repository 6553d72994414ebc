//! Repository for the `photos` table.
//!
//! Photos are insert-only: the bytes behind a storage path never change.

use std::collections::HashSet;

use sqlx::PgPool;
use continuity_core::EntityId;

use crate::models::PhotoRow;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, capture_id, storage_path, angle, taken_at";

pub struct PhotoRepo;

impl PhotoRepo {
    /// List photos belonging to any of the given captures.
    pub async fn list_by_captures(
        pool: &PgPool,
        capture_ids: &[EntityId],
    ) -> Result<Vec<PhotoRow>, sqlx::Error> {
        if capture_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = format!("SELECT {COLUMNS} FROM photos WHERE capture_id = ANY($1) ORDER BY id");
        sqlx::query_as::<_, PhotoRow>(&query)
            .bind(capture_ids)
            .fetch_all(pool)
            .await
    }

    /// Return the subset of `ids` that already exist.
    pub async fn existing_ids(
        pool: &PgPool,
        ids: &[EntityId],
    ) -> Result<HashSet<EntityId>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let found: Vec<(EntityId,)> = sqlx::query_as("SELECT id FROM photos WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(pool)
            .await?;
        Ok(found.into_iter().map(|(id,)| id).collect())
    }

    /// Insert a photo row; an existing id is left untouched.
    pub async fn insert(pool: &PgPool, row: &PhotoRow) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO photos (id, capture_id, storage_path, angle, taken_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(row.id)
        .bind(row.capture_id)
        .bind(&row.storage_path)
        .bind(&row.angle)
        .bind(row.taken_at)
        .execute(pool)
        .await?;
        Ok(())
    }
}
