//! Scene row.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use continuity_core::EntityId;

/// A row from the `scenes` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct SceneRow {
    pub id: EntityId,
    pub project_id: EntityId,
    pub scene_number: String,
    pub int_ext: String,
    pub location: String,
    pub time_of_day: String,
    pub synopsis: Option<String>,
    /// One of `not_filmed`, `partially_filmed`, `filmed`, `wrapped`.
    pub filming_status: String,
    pub filming_notes: Option<String>,
    pub is_complete: bool,
}
