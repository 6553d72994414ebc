//! Many-to-many association rows.
//!
//! Junction rows have no identity of their own; they are synchronized as
//! sets per parent.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use continuity_core::EntityId;

/// A row from the `scene_characters` table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, FromRow, Serialize, Deserialize)]
pub struct SceneCharacterRow {
    pub scene_id: EntityId,
    pub character_id: EntityId,
}

/// A row from the `look_scenes` table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, FromRow, Serialize, Deserialize)]
pub struct LookSceneRow {
    pub look_id: EntityId,
    pub scene_number: String,
}
