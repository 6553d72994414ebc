//! Scene aggregate.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{new_id, EntityId, Timestamp};

/// How far through shooting a scene is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilmingStatus {
    #[default]
    NotFilmed,
    PartiallyFilmed,
    Filmed,
    Wrapped,
}

impl FilmingStatus {
    /// Value stored in the `scenes.filming_status` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFilmed => "not_filmed",
            Self::PartiallyFilmed => "partially_filmed",
            Self::Filmed => "filmed",
            Self::Wrapped => "wrapped",
        }
    }

    /// Parse from the `scenes.filming_status` column.
    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        match name {
            "not_filmed" => Ok(Self::NotFilmed),
            "partially_filmed" => Ok(Self::PartiallyFilmed),
            "filmed" => Ok(Self::Filmed),
            "wrapped" => Ok(Self::Wrapped),
            other => Err(CoreError::UnknownVariant {
                kind: "filming status",
                value: other.to_string(),
            }),
        }
    }
}

/// One entry in a scene's script amendment history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Amendment {
    pub amended_at: Timestamp,
    pub previous_content: String,
    #[serde(default)]
    pub note: Option<String>,
}

/// A scene in the shooting script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: EntityId,
    /// Display key; not unique (e.g. "12", "12A", and repeats after rewrites).
    pub scene_number: String,
    pub int_ext: String,
    pub location: String,
    pub time_of_day: String,
    #[serde(default)]
    pub synopsis: Option<String>,
    #[serde(default)]
    pub filming_status: FilmingStatus,
    #[serde(default)]
    pub filming_notes: Option<String>,
    #[serde(default)]
    pub is_complete: bool,
    /// Characters appearing in the scene (backend junction `scene_characters`).
    #[serde(default)]
    pub characters: Vec<EntityId>,

    // -- Client-only: no backend column --
    #[serde(default)]
    pub script_content: Option<String>,
    #[serde(default)]
    pub amendments: Vec<Amendment>,
    #[serde(default)]
    pub suggested_characters: Vec<String>,
}

/// The client-only part of a [`Scene`], carried across merges.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneLocalFields {
    pub script_content: Option<String>,
    pub amendments: Vec<Amendment>,
    pub suggested_characters: Vec<String>,
}

impl Scene {
    pub fn new(scene_number: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            scene_number: scene_number.into(),
            int_ext: "INT".into(),
            location: String::new(),
            time_of_day: "DAY".into(),
            synopsis: None,
            filming_status: FilmingStatus::NotFilmed,
            filming_notes: None,
            is_complete: false,
            characters: Vec::new(),
            script_content: None,
            amendments: Vec::new(),
            suggested_characters: Vec::new(),
        }
    }

    pub fn local_fields(&self) -> SceneLocalFields {
        SceneLocalFields {
            script_content: self.script_content.clone(),
            amendments: self.amendments.clone(),
            suggested_characters: self.suggested_characters.clone(),
        }
    }
}
