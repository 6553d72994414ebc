//! Repositories for the junction tables `scene_characters` and `look_scenes`.
//!
//! Junction rows are changed as a diff: inserts use `ON CONFLICT DO NOTHING`
//! so a row added concurrently by another client survives, and deletes only
//! name rows the caller knows it removed. Both halves run in one transaction.

use sqlx::PgPool;
use continuity_core::EntityId;

use crate::models::{LookSceneRow, SceneCharacterRow};

pub struct SceneCharacterRepo;

impl SceneCharacterRepo {
    pub async fn list_by_scenes(
        pool: &PgPool,
        scene_ids: &[EntityId],
    ) -> Result<Vec<SceneCharacterRow>, sqlx::Error> {
        if scene_ids.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_as::<_, SceneCharacterRow>(
            "SELECT scene_id, character_id FROM scene_characters \
             WHERE scene_id = ANY($1) ORDER BY scene_id, character_id",
        )
        .bind(scene_ids)
        .fetch_all(pool)
        .await
    }

    pub async fn apply_diff(
        pool: &PgPool,
        insert: &[SceneCharacterRow],
        delete: &[SceneCharacterRow],
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;

        if !delete.is_empty() {
            let (scenes, characters): (Vec<EntityId>, Vec<EntityId>) =
                delete.iter().map(|r| (r.scene_id, r.character_id)).unzip();
            sqlx::query(
                "DELETE FROM scene_characters sc \
                 USING UNNEST($1::uuid[], $2::uuid[]) AS d(scene_id, character_id) \
                 WHERE sc.scene_id = d.scene_id AND sc.character_id = d.character_id",
            )
            .bind(&scenes)
            .bind(&characters)
            .execute(&mut *tx)
            .await?;
        }

        if !insert.is_empty() {
            let (scenes, characters): (Vec<EntityId>, Vec<EntityId>) =
                insert.iter().map(|r| (r.scene_id, r.character_id)).unzip();
            sqlx::query(
                "INSERT INTO scene_characters (scene_id, character_id) \
                 SELECT * FROM UNNEST($1::uuid[], $2::uuid[]) \
                 ON CONFLICT (scene_id, character_id) DO NOTHING",
            )
            .bind(&scenes)
            .bind(&characters)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await
    }
}

pub struct LookSceneRepo;

impl LookSceneRepo {
    pub async fn list_by_looks(
        pool: &PgPool,
        look_ids: &[EntityId],
    ) -> Result<Vec<LookSceneRow>, sqlx::Error> {
        if look_ids.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_as::<_, LookSceneRow>(
            "SELECT look_id, scene_number FROM look_scenes \
             WHERE look_id = ANY($1) ORDER BY look_id, scene_number",
        )
        .bind(look_ids)
        .fetch_all(pool)
        .await
    }

    pub async fn apply_diff(
        pool: &PgPool,
        insert: &[LookSceneRow],
        delete: &[LookSceneRow],
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;

        if !delete.is_empty() {
            let (looks, numbers): (Vec<EntityId>, Vec<String>) =
                delete.iter().map(|r| (r.look_id, r.scene_number.clone())).unzip();
            sqlx::query(
                "DELETE FROM look_scenes ls \
                 USING UNNEST($1::uuid[], $2::text[]) AS d(look_id, scene_number) \
                 WHERE ls.look_id = d.look_id AND ls.scene_number = d.scene_number",
            )
            .bind(&looks)
            .bind(&numbers)
            .execute(&mut *tx)
            .await?;
        }

        if !insert.is_empty() {
            let (looks, numbers): (Vec<EntityId>, Vec<String>) =
                insert.iter().map(|r| (r.look_id, r.scene_number.clone())).unzip();
            sqlx::query(
                "INSERT INTO look_scenes (look_id, scene_number) \
                 SELECT * FROM UNNEST($1::uuid[], $2::text[]) \
                 ON CONFLICT (look_id, scene_number) DO NOTHING",
            )
            .bind(&looks)
            .bind(&numbers)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await
    }
}
