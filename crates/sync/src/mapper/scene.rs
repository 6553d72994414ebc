//! Scene ↔ `scenes` row (+ `scene_characters` junction).

use std::collections::BTreeSet;

use continuity_core::model::{FilmingStatus, Scene};
use continuity_core::{EntityId, Table};
use continuity_db::models::{SceneCharacterRow, SceneRow};

use crate::error::MapperError;
use crate::mapper::ordered_like;

pub fn to_row(scene: &Scene, project_id: EntityId) -> SceneRow {
    SceneRow {
        id: scene.id,
        project_id,
        scene_number: scene.scene_number.clone(),
        int_ext: scene.int_ext.clone(),
        location: scene.location.clone(),
        time_of_day: scene.time_of_day.clone(),
        synopsis: scene.synopsis.clone(),
        filming_status: scene.filming_status.as_str().to_string(),
        filming_notes: scene.filming_notes.clone(),
        is_complete: scene.is_complete,
    }
}

/// The scene's characters as a junction set.
pub fn character_set(scene: &Scene) -> BTreeSet<EntityId> {
    scene.characters.iter().copied().collect()
}

pub fn junction_rows(scene_id: EntityId, characters: &BTreeSet<EntityId>) -> Vec<SceneCharacterRow> {
    characters
        .iter()
        .map(|&character_id| SceneCharacterRow {
            scene_id,
            character_id,
        })
        .collect()
}

/// Build a scene from its row and server-side character links, keeping
/// the client-only fields of `existing`.
pub fn from_row(
    row: &SceneRow,
    characters: &[EntityId],
    existing: Option<&Scene>,
) -> Result<Scene, MapperError> {
    let filming_status = FilmingStatus::from_name(&row.filming_status)
        .map_err(|e| MapperError::shape(Table::Scenes, "filming_status", e))?;
    let local = existing.map(Scene::local_fields).unwrap_or_default();
    let characters = match existing {
        Some(scene) => ordered_like(&scene.characters, characters),
        None => ordered_like(&[], characters),
    };

    Ok(Scene {
        id: row.id,
        scene_number: row.scene_number.clone(),
        int_ext: row.int_ext.clone(),
        location: row.location.clone(),
        time_of_day: row.time_of_day.clone(),
        synopsis: row.synopsis.clone(),
        filming_status,
        filming_notes: row.filming_notes.clone(),
        is_complete: row.is_complete,
        characters,
        script_content: local.script_content,
        amendments: local.amendments,
        suggested_characters: local.suggested_characters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use continuity_core::model::Amendment;

    fn local_scene() -> Scene {
        let mut scene = Scene::new("12");
        scene.location = "KITCHEN".into();
        scene.script_content = Some("MARTHA enters, soaked.".into());
        scene.amendments = vec![Amendment {
            amended_at: Utc::now(),
            previous_content: "MARTHA enters.".into(),
            note: None,
        }];
        scene.suggested_characters = vec!["MARTHA".into()];
        scene
    }

    #[test]
    fn server_fields_win_and_client_only_fields_survive() {
        let local = local_scene();
        let mut row = to_row(&local, uuid::Uuid::new_v4());
        row.location = "HALLWAY".into();
        row.filming_status = "wrapped".into();

        let merged = from_row(&row, &[], Some(&local)).unwrap();
        assert_eq!(merged.location, "HALLWAY");
        assert_eq!(merged.filming_status, FilmingStatus::Wrapped);
        assert_eq!(merged.script_content, local.script_content);
        assert_eq!(merged.amendments, local.amendments);
        assert_eq!(merged.suggested_characters, local.suggested_characters);
    }

    #[test]
    fn new_scene_has_empty_client_only_fields() {
        let row = to_row(&local_scene(), uuid::Uuid::new_v4());
        let scene = from_row(&row, &[], None).unwrap();
        assert!(scene.script_content.is_none());
        assert!(scene.amendments.is_empty());
    }

    #[test]
    fn unknown_filming_status_is_a_mapper_error() {
        let mut row = to_row(&local_scene(), uuid::Uuid::new_v4());
        row.filming_status = "in_progress".into();
        let err = from_row(&row, &[], None).unwrap_err();
        assert!(matches!(
            err,
            MapperError::UnexpectedShape { table: Table::Scenes, field: "filming_status", .. }
        ));
    }

    #[test]
    fn character_links_come_from_the_server() {
        let (a, b, c) = (uuid::Uuid::new_v4(), uuid::Uuid::new_v4(), uuid::Uuid::new_v4());
        let mut local = local_scene();
        local.characters = vec![b, a];
        let row = to_row(&local, uuid::Uuid::new_v4());

        let merged = from_row(&row, &[a, c], Some(&local)).unwrap();
        assert_eq!(merged.characters, vec![a, c]);
    }
}
