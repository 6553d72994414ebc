//! Project row.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use continuity_core::{EntityId, Timestamp};

/// A row from the `projects` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ProjectRow {
    pub id: EntityId,
    pub name: String,
    pub created_at: Timestamp,
}
