//! Looks: a character's makeup and hair design for a run of scenes.

use serde::{Deserialize, Serialize};

use crate::model::capture::{ContinuityEvent, ContinuityFlags, SfxDetails};
use crate::model::photo::Photo;
use crate::types::{new_id, EntityId};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MakeupDetails {
    pub foundation: Option<String>,
    pub concealer: Option<String>,
    pub blush: Option<String>,
    pub eyes: Option<String>,
    pub brows: Option<String>,
    pub lips: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HairDetails {
    pub style: Option<String>,
    pub products: Option<String>,
    pub parting: Option<String>,
    pub accessories: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Look {
    pub id: EntityId,
    pub character_id: EntityId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub estimated_minutes: Option<u32>,
    /// Scene numbers this look is worn in (backend junction `look_scenes`).
    #[serde(default)]
    pub scenes: Vec<String>,
    #[serde(default)]
    pub makeup: MakeupDetails,
    #[serde(default)]
    pub hair: HairDetails,

    // -- Look-level continuity (nullable backend columns) --
    #[serde(default)]
    pub master_reference: Option<Photo>,
    #[serde(default)]
    pub continuity_flags: Option<ContinuityFlags>,
    #[serde(default)]
    pub continuity_events: Vec<ContinuityEvent>,
    #[serde(default)]
    pub sfx_details: Option<SfxDetails>,
}

impl Look {
    pub fn new(character_id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            character_id,
            name: name.into(),
            description: None,
            estimated_minutes: None,
            scenes: Vec::new(),
            makeup: MakeupDetails::default(),
            hair: HairDetails::default(),
            master_reference: None,
            continuity_flags: None,
            continuity_events: Vec::new(),
            sfx_details: None,
        }
    }

    pub fn is_worn_in(&self, scene_number: &str) -> bool {
        self.scenes.iter().any(|s| s == scene_number)
    }
}
