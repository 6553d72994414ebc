//! Photo ↔ `photos` row.

use continuity_core::model::{Photo, PhotoAngle};
use continuity_core::{EntityId, Table};
use continuity_db::models::PhotoRow;

use crate::error::MapperError;

pub fn to_row(photo: &Photo, capture_id: EntityId, storage_path: String) -> PhotoRow {
    PhotoRow {
        id: photo.id,
        capture_id,
        storage_path,
        angle: photo.angle.as_str().to_string(),
        taken_at: photo.taken_at,
    }
}

pub fn from_row(row: &PhotoRow) -> Result<Photo, MapperError> {
    let angle = PhotoAngle::from_name(&row.angle)
        .map_err(|e| MapperError::shape(Table::Photos, "angle", e))?;
    Ok(Photo {
        id: row.id,
        angle,
        taken_at: row.taken_at,
        storage_path: Some(row.storage_path.clone()),
        inline: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn row_keeps_angle_and_path() {
        let photo = Photo::new(PhotoAngle::Left, Utc::now());
        let row = to_row(&photo, uuid::Uuid::new_v4(), "projects/p/photos/x.jpg".into());
        let back = from_row(&row).unwrap();
        assert_eq!(back.angle, PhotoAngle::Left);
        assert_eq!(back.storage_path.as_deref(), Some("projects/p/photos/x.jpg"));
    }

    #[test]
    fn unknown_angle_is_rejected() {
        let photo = Photo::new(PhotoAngle::Left, Utc::now());
        let mut row = to_row(&photo, uuid::Uuid::new_v4(), String::new());
        row.angle = "overhead".into();
        assert!(from_row(&row).is_err());
    }
}
