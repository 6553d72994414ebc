//! SceneCapture ↔ `scene_captures` row (+ its `photos` rows).

use std::collections::HashSet;

use continuity_core::model::{CapturePhotos, SceneCapture};
use continuity_core::Table;
use continuity_db::models::{CaptureRow, PhotoRow};

use crate::error::MapperError;
use crate::mapper::{decode, decode_object, encode, photo, to_i32, to_u32};

const TABLE: Table = Table::SceneCaptures;

pub fn to_row(capture: &SceneCapture) -> Result<CaptureRow, MapperError> {
    Ok(CaptureRow {
        id: capture.id,
        scene_id: capture.scene_id,
        character_id: capture.character_id,
        look_id: capture.look_id,
        continuity_flags: encode(TABLE, "continuity_flags", &capture.continuity_flags)?,
        continuity_events: encode(TABLE, "continuity_events", &capture.continuity_events)?,
        sfx_details: capture
            .sfx_details
            .as_ref()
            .map(|s| encode(TABLE, "sfx_details", s))
            .transpose()?,
        notes: capture.notes.clone(),
        application_minutes: capture.application_minutes.map(to_i32),
        captured_at: capture.captured_at,
    })
}

/// Build a capture from its row.
///
/// With `photos` given, the server's photo rows define the photo set and
/// only local photos that were never uploaded are kept alongside them.
/// With `None` the photos of `existing` are kept as they are.
pub fn from_row(
    row: &CaptureRow,
    photos: Option<&[PhotoRow]>,
    existing: Option<&SceneCapture>,
) -> Result<SceneCapture, MapperError> {
    let photos = match photos {
        Some(rows) => merge_photos(rows, existing.map(|c| &c.photos))?,
        None => existing.map(|c| c.photos.clone()).unwrap_or_default(),
    };
    let sfx_details = match row.sfx_details.as_ref().filter(|v| !v.is_null()) {
        Some(v) => Some(decode_object(TABLE, "sfx_details", v)?),
        None => None,
    };

    Ok(SceneCapture {
        id: row.id,
        scene_id: row.scene_id,
        character_id: row.character_id,
        look_id: row.look_id,
        photos,
        continuity_flags: decode_object(TABLE, "continuity_flags", &row.continuity_flags)?,
        continuity_events: decode(TABLE, "continuity_events", &row.continuity_events)?,
        sfx_details,
        notes: row.notes.clone(),
        application_minutes: row
            .application_minutes
            .map(|m| to_u32(TABLE, "application_minutes", m))
            .transpose()?,
        captured_at: row.captured_at,
    })
}

fn merge_photos(
    rows: &[PhotoRow],
    local: Option<&CapturePhotos>,
) -> Result<CapturePhotos, MapperError> {
    let mut server: Vec<_> = rows.iter().map(photo::from_row).collect::<Result<_, _>>()?;
    // Later shots win a contested angle slot.
    server.sort_by_key(|p| (p.taken_at, p.id));
    let server_ids: HashSet<_> = server.iter().map(|p| p.id).collect();

    let mut merged = CapturePhotos::default();
    for p in server {
        merged.place(p);
    }
    if let Some(local) = local {
        for p in local.iter() {
            if p.storage_path.is_none() && !server_ids.contains(&p.id) {
                merged.place(p.clone());
            }
        }
    }
    Ok(merged)
}
