//! Schedule, call sheet and script upload rows.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use continuity_core::{EntityId, Timestamp};

/// A row from the `schedules` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ScheduleRow {
    pub id: EntityId,
    pub project_id: EntityId,
    pub raw_text: Option<String>,
    pub days: serde_json::Value,
    pub cast_list: serde_json::Value,
    pub pdf_name: Option<String>,
    pub pdf_path: Option<String>,
    pub uploaded_at: Timestamp,
}

/// A row from the `call_sheets` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct CallSheetRow {
    pub id: EntityId,
    pub project_id: EntityId,
    pub shooting_date: NaiveDate,
    pub day_number: Option<i32>,
    pub raw_text: Option<String>,
    /// `{ "scene_numbers": [...], "unit_call": ..., "notes": ... }`
    pub data: serde_json::Value,
    pub pdf_name: Option<String>,
    pub pdf_path: Option<String>,
    pub uploaded_at: Timestamp,
}

/// A row from the `script_uploads` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ScriptUploadRow {
    pub id: EntityId,
    pub project_id: EntityId,
    pub file_name: String,
    pub raw_text: Option<String>,
    pub scene_count: i32,
    pub pdf_path: Option<String>,
    pub uploaded_at: Timestamp,
}
