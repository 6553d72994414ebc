//! Scene capture row.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use continuity_core::{EntityId, Timestamp};

/// A row from the `scene_captures` table.
///
/// Has no `project_id`: captures are reached through their scene.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct CaptureRow {
    pub id: EntityId,
    pub scene_id: EntityId,
    pub character_id: EntityId,
    pub look_id: Option<EntityId>,
    pub continuity_flags: serde_json::Value,
    pub continuity_events: serde_json::Value,
    pub sfx_details: Option<serde_json::Value>,
    pub notes: String,
    pub application_minutes: Option<i32>,
    pub captured_at: Timestamp,
}
