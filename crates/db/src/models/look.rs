//! Look row.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use continuity_core::EntityId;

/// A row from the `looks` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct LookRow {
    pub id: EntityId,
    pub project_id: EntityId,
    pub character_id: EntityId,
    pub name: String,
    pub description: Option<String>,
    pub estimated_minutes: Option<i32>,
    pub makeup: serde_json::Value,
    pub hair: serde_json::Value,
    // -- Look-level continuity (nullable; older writers leave them NULL) --
    #[serde(default)]
    pub master_reference: Option<serde_json::Value>,
    #[serde(default)]
    pub continuity_flags: Option<serde_json::Value>,
    #[serde(default)]
    pub continuity_events: Option<serde_json::Value>,
    #[serde(default)]
    pub sfx_details: Option<serde_json::Value>,
}
