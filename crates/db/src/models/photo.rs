//! Photo metadata row.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use continuity_core::{EntityId, Timestamp};

/// A row from the `photos` table. Insert-only: photo bytes are immutable.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct PhotoRow {
    pub id: EntityId,
    pub capture_id: EntityId,
    pub storage_path: String,
    pub angle: String,
    pub taken_at: Timestamp,
}
