//! Backend table names and their sync categories.
//!
//! Lives in `core` so that the row store, the realtime transport and the
//! sync engine all agree on the same table vocabulary.

use serde::{Deserialize, Serialize};

use crate::category::SyncCategory;
use crate::error::CoreError;

/// Every backend table the sync engine reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Projects,
    Scenes,
    Characters,
    Looks,
    SceneCharacters,
    LookScenes,
    SceneCaptures,
    Photos,
    Schedules,
    CallSheets,
    ScriptUploads,
}

/// All tables, in pull dependency order.
pub const ALL_TABLES: &[Table] = &[
    Table::Projects,
    Table::Scenes,
    Table::Characters,
    Table::Looks,
    Table::Schedules,
    Table::CallSheets,
    Table::ScriptUploads,
    Table::SceneCharacters,
    Table::LookScenes,
    Table::SceneCaptures,
    Table::Photos,
];

impl Table {
    /// The SQL / wire name of the table.
    pub fn name(self) -> &'static str {
        match self {
            Self::Projects => "projects",
            Self::Scenes => "scenes",
            Self::Characters => "characters",
            Self::Looks => "looks",
            Self::SceneCharacters => "scene_characters",
            Self::LookScenes => "look_scenes",
            Self::SceneCaptures => "scene_captures",
            Self::Photos => "photos",
            Self::Schedules => "schedules",
            Self::CallSheets => "call_sheets",
            Self::ScriptUploads => "script_uploads",
        }
    }

    /// Parse from the SQL / wire name.
    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        ALL_TABLES
            .iter()
            .copied()
            .find(|t| t.name() == name)
            .ok_or_else(|| CoreError::UnknownVariant {
                kind: "table",
                value: name.to_string(),
            })
    }

    /// Whether rows carry a `project_id` column the server can filter on.
    ///
    /// Captures and photos hang off scenes/captures and must be filtered
    /// client-side.
    pub fn is_project_scoped(self) -> bool {
        matches!(
            self,
            Self::Scenes
                | Self::Characters
                | Self::Looks
                | Self::Schedules
                | Self::CallSheets
                | Self::ScriptUploads
        )
    }

    /// The sync category a change to this table belongs to.
    ///
    /// `Projects` has no category; the project row itself is never pushed.
    pub fn category(self) -> Option<SyncCategory> {
        match self {
            Self::Projects => None,
            Self::Scenes | Self::SceneCharacters => Some(SyncCategory::Scenes),
            Self::Characters => Some(SyncCategory::Characters),
            Self::Looks | Self::LookScenes => Some(SyncCategory::Looks),
            Self::SceneCaptures | Self::Photos => Some(SyncCategory::Captures),
            Self::Schedules => Some(SyncCategory::Schedule),
            Self::CallSheets => Some(SyncCategory::CallSheets),
            Self::ScriptUploads => Some(SyncCategory::Script),
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_parse_back() {
        for table in ALL_TABLES {
            assert_eq!(Table::from_name(table.name()).unwrap(), *table);
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert!(Table::from_name("users").is_err());
    }

    #[test]
    fn captures_and_photos_are_not_project_scoped() {
        assert!(!Table::SceneCaptures.is_project_scoped());
        assert!(!Table::Photos.is_project_scoped());
        assert!(Table::Scenes.is_project_scoped());
    }

    #[test]
    fn junctions_map_to_parent_category() {
        assert_eq!(Table::SceneCharacters.category(), Some(SyncCategory::Scenes));
        assert_eq!(Table::LookScenes.category(), Some(SyncCategory::Looks));
        assert_eq!(Table::Photos.category(), Some(SyncCategory::Captures));
        assert_eq!(Table::Projects.category(), None);
    }
}
