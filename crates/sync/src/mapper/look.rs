//! Look ↔ `looks` row (+ `look_scenes` junction).
//!
//! Makeup and hair are JSON columns. The look-level continuity fields are
//! nullable JSON columns: a non-null server value wins, a null one keeps
//! the local value so rows written by older clients never erase them.

use std::collections::BTreeSet;

use continuity_core::model::Look;
use continuity_core::{EntityId, Table};
use continuity_db::models::{LookRow, LookSceneRow};

use crate::error::MapperError;
use crate::mapper::{decode, decode_object, encode, ordered_like, to_i32, to_u32};

const TABLE: Table = Table::Looks;

pub fn to_row(look: &Look, project_id: EntityId) -> Result<LookRow, MapperError> {
    Ok(LookRow {
        id: look.id,
        project_id,
        character_id: look.character_id,
        name: look.name.clone(),
        description: look.description.clone(),
        estimated_minutes: look.estimated_minutes.map(to_i32),
        makeup: encode(TABLE, "makeup", &look.makeup)?,
        hair: encode(TABLE, "hair", &look.hair)?,
        master_reference: look
            .master_reference
            .as_ref()
            .map(|p| encode(TABLE, "master_reference", p))
            .transpose()?,
        continuity_flags: look
            .continuity_flags
            .as_ref()
            .map(|f| encode(TABLE, "continuity_flags", f))
            .transpose()?,
        continuity_events: Some(encode(TABLE, "continuity_events", &look.continuity_events)?),
        sfx_details: look
            .sfx_details
            .as_ref()
            .map(|s| encode(TABLE, "sfx_details", s))
            .transpose()?,
    })
}

pub fn scene_set(look: &Look) -> BTreeSet<String> {
    look.scenes.iter().cloned().collect()
}

pub fn junction_rows(look_id: EntityId, scenes: &BTreeSet<String>) -> Vec<LookSceneRow> {
    scenes
        .iter()
        .map(|scene_number| LookSceneRow {
            look_id,
            scene_number: scene_number.clone(),
        })
        .collect()
}

/// A nullable JSON column: `None` and JSON `null` both mean "not set".
fn present(value: &Option<serde_json::Value>) -> Option<&serde_json::Value> {
    value.as_ref().filter(|v| !v.is_null())
}

pub fn from_row(
    row: &LookRow,
    scene_numbers: &[String],
    existing: Option<&Look>,
) -> Result<Look, MapperError> {
    let estimated_minutes = row
        .estimated_minutes
        .map(|m| to_u32(TABLE, "estimated_minutes", m))
        .transpose()?;

    let master_reference = match present(&row.master_reference) {
        Some(v) => {
            let mut photo: continuity_core::model::Photo = decode_object(TABLE, "master_reference", v)?;
            // Bytes never travel through the row; keep any not yet cached.
            if let Some(local) = existing.and_then(|l| l.master_reference.as_ref()) {
                if local.id == photo.id {
                    photo.inline = local.inline.clone();
                }
            }
            Some(photo)
        }
        None => existing.and_then(|l| l.master_reference.clone()),
    };
    let continuity_flags = match present(&row.continuity_flags) {
        Some(v) => Some(decode_object(TABLE, "continuity_flags", v)?),
        None => existing.and_then(|l| l.continuity_flags),
    };
    let continuity_events = match present(&row.continuity_events) {
        Some(v) => decode(TABLE, "continuity_events", v)?,
        None => existing.map(|l| l.continuity_events.clone()).unwrap_or_default(),
    };
    let sfx_details = match present(&row.sfx_details) {
        Some(v) => Some(decode_object(TABLE, "sfx_details", v)?),
        None => existing.and_then(|l| l.sfx_details.clone()),
    };
    let local_scenes = existing.map(|l| l.scenes.as_slice()).unwrap_or_default();

    Ok(Look {
        id: row.id,
        character_id: row.character_id,
        name: row.name.clone(),
        description: row.description.clone(),
        estimated_minutes,
        scenes: ordered_like(local_scenes, scene_numbers),
        makeup: decode_object(TABLE, "makeup", &row.makeup)?,
        hair: decode_object(TABLE, "hair", &row.hair)?,
        master_reference,
        continuity_flags,
        continuity_events,
        sfx_details,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use continuity_core::model::{ContinuityFlags, Photo, PhotoAngle, SfxDetails};
    use serde_json::json;

    fn local_look() -> Look {
        let mut look = Look::new(uuid::Uuid::new_v4(), "Day 1 clean");
        look.makeup.foundation = Some("Fenty 220".into());
        look.hair.style = Some("Low bun".into());
        look.master_reference = Some(Photo::new(PhotoAngle::Front, Utc::now()));
        look.continuity_flags = Some(ContinuityFlags {
            sweat: true,
            ..Default::default()
        });
        look.sfx_details = Some(SfxDetails {
            wounds: vec!["Graze, left cheek".into()],
            ..Default::default()
        });
        look
    }

    #[test]
    fn null_look_level_columns_keep_local_values() {
        let local = local_look();
        let mut row = to_row(&local, uuid::Uuid::new_v4()).unwrap();
        row.master_reference = None;
        row.continuity_flags = Some(serde_json::Value::Null);
        row.continuity_events = None;
        row.sfx_details = None;

        let merged = from_row(&row, &[], Some(&local)).unwrap();
        assert_eq!(merged.master_reference, local.master_reference);
        assert_eq!(merged.continuity_flags, local.continuity_flags);
        assert_eq!(merged.sfx_details, local.sfx_details);
    }

    #[test]
    fn non_null_server_values_win() {
        let local = local_look();
        let mut row = to_row(&local, uuid::Uuid::new_v4()).unwrap();
        row.continuity_flags = Some(json!({ "blood": true }));
        row.makeup = json!({ "lips": "Ruby Woo" });

        let merged = from_row(&row, &[], Some(&local)).unwrap();
        let flags = merged.continuity_flags.unwrap();
        assert!(flags.blood && !flags.sweat);
        assert_eq!(merged.makeup.lips.as_deref(), Some("Ruby Woo"));
        assert!(merged.makeup.foundation.is_none());
    }

    #[test]
    fn mapped_row_is_stable() {
        let local = local_look();
        let project = uuid::Uuid::new_v4();
        let row = to_row(&local, project).unwrap();
        let back = from_row(&row, &[], Some(&local)).unwrap();
        assert_eq!(to_row(&back, project).unwrap(), row);
    }

    #[test]
    fn malformed_json_column_is_a_mapper_error() {
        let mut row = to_row(&local_look(), uuid::Uuid::new_v4()).unwrap();
        row.hair = json!(["not", "an", "object"]);
        let err = from_row(&row, &[], None).unwrap_err();
        assert!(matches!(err, MapperError::UnexpectedShape { field: "hair", .. }));
    }

    #[test]
    fn scene_numbers_come_from_the_junction() {
        let mut local = local_look();
        local.scenes = vec!["4".into(), "2".into()];
        let row = to_row(&local, uuid::Uuid::new_v4()).unwrap();
        let merged = from_row(&row, &["2".into(), "7".into()], Some(&local)).unwrap();
        assert_eq!(merged.scenes, vec!["2".to_string(), "7".to_string()]);
    }
}
