//! Character row.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use continuity_core::EntityId;

/// A row from the `characters` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct CharacterRow {
    pub id: EntityId,
    pub project_id: EntityId,
    pub name: String,
    pub initials: String,
    pub color: String,
}
