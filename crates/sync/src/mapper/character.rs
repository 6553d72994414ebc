//! Character ↔ `characters` row.

use continuity_core::model::Character;
use continuity_core::EntityId;
use continuity_db::models::CharacterRow;

pub fn to_row(character: &Character, project_id: EntityId) -> CharacterRow {
    CharacterRow {
        id: character.id,
        project_id,
        name: character.name.clone(),
        initials: character.initials.clone(),
        color: character.color.clone(),
    }
}

/// The cast number has no column and is carried over from `existing`.
pub fn from_row(row: &CharacterRow, existing: Option<&Character>) -> Character {
    Character {
        id: row.id,
        name: row.name.clone(),
        initials: row.initials.clone(),
        color: row.color.clone(),
        actor_number: existing.and_then(|c| c.actor_number),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actor_number_survives_a_rename() {
        let mut local = Character::new("Alice");
        local.actor_number = Some(3);
        let mut row = to_row(&local, uuid::Uuid::new_v4());
        row.name = "Alicia".into();

        let merged = from_row(&row, Some(&local));
        assert_eq!(merged.name, "Alicia");
        assert_eq!(merged.actor_number, Some(3));
        assert_eq!(from_row(&row, None).actor_number, None);
    }
}
