//! Schedule, call sheet and script upload ↔ their rows.
//!
//! PDF bytes never travel through a row; only `pdf_path` does. Local bytes
//! awaiting upload are carried over from `existing` while the server has
//! no path for them.

use serde::{Deserialize, Serialize};

use continuity_core::model::{Attachment, CallSheet, Schedule, ScriptUpload};
use continuity_core::{EntityId, Table};
use continuity_db::models::{CallSheetRow, ScheduleRow, ScriptUploadRow};

use crate::error::MapperError;
use crate::mapper::{decode, decode_object, encode, to_i32, to_u32};

fn merge_attachment(
    file_name: Option<String>,
    storage_path: Option<String>,
    existing: Option<&Attachment>,
) -> Attachment {
    let bytes = match (&storage_path, existing) {
        (None, Some(local)) => local.bytes.clone(),
        _ => None,
    };
    Attachment {
        file_name,
        storage_path,
        bytes,
    }
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

pub fn schedule_to_row(schedule: &Schedule, project_id: EntityId) -> Result<ScheduleRow, MapperError> {
    Ok(ScheduleRow {
        id: schedule.id,
        project_id,
        raw_text: schedule.raw_text.clone(),
        days: encode(Table::Schedules, "days", &schedule.days)?,
        cast_list: encode(Table::Schedules, "cast_list", &schedule.cast_list)?,
        pdf_name: schedule.pdf.file_name.clone(),
        pdf_path: schedule.pdf.storage_path.clone(),
        uploaded_at: schedule.uploaded_at,
    })
}

pub fn schedule_from_row(
    row: &ScheduleRow,
    existing: Option<&Schedule>,
) -> Result<Schedule, MapperError> {
    let existing = existing.filter(|s| s.id == row.id);
    Ok(Schedule {
        id: row.id,
        raw_text: row.raw_text.clone(),
        days: decode(Table::Schedules, "days", &row.days)?,
        cast_list: decode(Table::Schedules, "cast_list", &row.cast_list)?,
        pdf: merge_attachment(
            row.pdf_name.clone(),
            row.pdf_path.clone(),
            existing.map(|s| &s.pdf),
        ),
        uploaded_at: row.uploaded_at,
    })
}

// ---------------------------------------------------------------------------
// Call sheets
// ---------------------------------------------------------------------------

/// Shape of `call_sheets.data`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CallSheetData {
    #[serde(default)]
    scene_numbers: Vec<String>,
    #[serde(default)]
    unit_call: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

pub fn call_sheet_to_row(sheet: &CallSheet, project_id: EntityId) -> Result<CallSheetRow, MapperError> {
    let data = CallSheetData {
        scene_numbers: sheet.scene_numbers.clone(),
        unit_call: sheet.unit_call.clone(),
        notes: sheet.notes.clone(),
    };
    Ok(CallSheetRow {
        id: sheet.id,
        project_id,
        shooting_date: sheet.shooting_date,
        day_number: sheet.day_number.map(to_i32),
        raw_text: sheet.raw_text.clone(),
        data: encode(Table::CallSheets, "data", &data)?,
        pdf_name: sheet.pdf.file_name.clone(),
        pdf_path: sheet.pdf.storage_path.clone(),
        uploaded_at: sheet.uploaded_at,
    })
}

pub fn call_sheet_from_row(
    row: &CallSheetRow,
    existing: Option<&CallSheet>,
) -> Result<CallSheet, MapperError> {
    let data: CallSheetData = decode_object(Table::CallSheets, "data", &row.data)?;
    Ok(CallSheet {
        id: row.id,
        shooting_date: row.shooting_date,
        day_number: row
            .day_number
            .map(|d| to_u32(Table::CallSheets, "day_number", d))
            .transpose()?,
        raw_text: row.raw_text.clone(),
        scene_numbers: data.scene_numbers,
        unit_call: data.unit_call,
        notes: data.notes,
        pdf: merge_attachment(
            row.pdf_name.clone(),
            row.pdf_path.clone(),
            existing.map(|s| &s.pdf),
        ),
        uploaded_at: row.uploaded_at,
    })
}

// ---------------------------------------------------------------------------
// Script uploads
// ---------------------------------------------------------------------------

pub fn script_to_row(script: &ScriptUpload, project_id: EntityId) -> ScriptUploadRow {
    ScriptUploadRow {
        id: script.id,
        project_id,
        file_name: script.file_name.clone(),
        raw_text: script.raw_text.clone(),
        scene_count: to_i32(script.scene_count),
        pdf_path: script.pdf.storage_path.clone(),
        uploaded_at: script.uploaded_at,
    }
}

pub fn script_from_row(
    row: &ScriptUploadRow,
    existing: Option<&ScriptUpload>,
) -> Result<ScriptUpload, MapperError> {
    let existing = existing.filter(|s| s.id == row.id);
    Ok(ScriptUpload {
        id: row.id,
        file_name: row.file_name.clone(),
        raw_text: row.raw_text.clone(),
        scene_count: to_u32(Table::ScriptUploads, "scene_count", row.scene_count)?,
        pdf: merge_attachment(
            Some(row.file_name.clone()),
            row.pdf_path.clone(),
            existing.map(|s| &s.pdf),
        ),
        uploaded_at: row.uploaded_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{NaiveDate, Utc};
    use continuity_core::model::ScheduleDay;
    use serde_json::json;

    #[test]
    fn schedule_days_round_trip_through_json_columns() {
        let mut schedule = Schedule::new(Utc::now());
        schedule.days = vec![ScheduleDay {
            day_number: 1,
            date: NaiveDate::from_ymd_opt(2026, 3, 2),
            location: Some("Pinewood".into()),
            scene_numbers: vec!["1".into(), "4A".into()],
            notes: None,
        }];
        let row = schedule_to_row(&schedule, uuid::Uuid::new_v4()).unwrap();
        assert_eq!(schedule_from_row(&row, None).unwrap().days, schedule.days);
    }

    #[test]
    fn pending_pdf_bytes_survive_until_the_server_has_a_path() {
        let mut schedule = Schedule::new(Utc::now());
        schedule.pdf.bytes = Some(Arc::new(b"%PDF".to_vec()));
        let mut row = schedule_to_row(&schedule, uuid::Uuid::new_v4()).unwrap();

        let merged = schedule_from_row(&row, Some(&schedule)).unwrap();
        assert!(merged.pdf.needs_upload());

        row.pdf_path = Some("projects/p/schedules/s.pdf".into());
        let merged = schedule_from_row(&row, Some(&schedule)).unwrap();
        assert!(merged.pdf.bytes.is_none());
    }

    #[test]
    fn call_sheet_data_column_must_be_an_object() {
        let sheet = CallSheet::new(NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(), Utc::now());
        let mut row = call_sheet_to_row(&sheet, uuid::Uuid::new_v4()).unwrap();
        row.data = json!({ "scene_numbers": ["3", "5"], "unit_call": "07:00" });
        let back = call_sheet_from_row(&row, None).unwrap();
        assert_eq!(back.scene_numbers, vec!["3".to_string(), "5".to_string()]);
        assert_eq!(back.unit_call.as_deref(), Some("07:00"));

        row.data = json!("07:00");
        assert!(call_sheet_from_row(&row, None).is_err());
        row.data = json!([["3", "5"], "07:00"]);
        assert!(call_sheet_from_row(&row, None).is_err());
    }

    #[test]
    fn negative_scene_count_is_rejected() {
        let script = ScriptUpload::new("draft3.pdf", Utc::now());
        let mut row = script_to_row(&script, uuid::Uuid::new_v4());
        row.scene_count = -4;
        assert!(script_from_row(&row, None).is_err());
    }
}
