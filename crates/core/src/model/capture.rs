//! Continuity captures: one per (scene, character) pair.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;
use crate::model::photo::{Photo, PhotoAngle};
use crate::types::{new_id, EntityId, Timestamp};

/// Fixed set of continuity conditions to watch between takes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContinuityFlags {
    pub sweat: bool,
    pub dishevelled: bool,
    pub blood: bool,
    pub dirt: bool,
    pub wet_hair: bool,
    pub tears: bool,
}

impl ContinuityFlags {
    pub fn any(&self) -> bool {
        self.sweat || self.dishevelled || self.blood || self.dirt || self.wet_hair || self.tears
    }
}

/// A timed continuity event (injury progression, costume damage, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuityEvent {
    pub id: EntityId,
    pub kind: String,
    pub description: String,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub scene_range: Option<String>,
}

/// Special-effects makeup details.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SfxDetails {
    pub prosthetics: Vec<String>,
    pub blood_types: Vec<String>,
    pub wounds: Vec<String>,
    pub notes: Option<String>,
}

/// Composite key of a capture within a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CaptureKey {
    pub scene_id: EntityId,
    pub character_id: EntityId,
}

impl CaptureKey {
    pub fn new(scene_id: EntityId, character_id: EntityId) -> Self {
        Self {
            scene_id,
            character_id,
        }
    }
}

impl fmt::Display for CaptureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scene_id, self.character_id)
    }
}

impl FromStr for CaptureKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::Validation(format!("Invalid capture key '{s}'"));
        let (scene, character) = s.split_once(':').ok_or_else(invalid)?;
        Ok(Self {
            scene_id: scene.parse().map_err(|_| invalid())?,
            character_id: character.parse().map_err(|_| invalid())?,
        })
    }
}

// Serialized as "scene:character" so the capture map can be a JSON object.
impl Serialize for CaptureKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CaptureKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The four named angles plus an open list of extra shots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapturePhotos {
    pub front: Option<Photo>,
    pub left: Option<Photo>,
    pub right: Option<Photo>,
    pub back: Option<Photo>,
    pub additional: Vec<Photo>,
}

impl CapturePhotos {
    /// All photos, named angles first.
    pub fn iter(&self) -> impl Iterator<Item = &Photo> {
        [&self.front, &self.left, &self.right, &self.back]
            .into_iter()
            .flatten()
            .chain(self.additional.iter())
    }

    pub fn contains(&self, photo_id: EntityId) -> bool {
        self.iter().any(|p| p.id == photo_id)
    }

    pub fn slot(&self, angle: PhotoAngle) -> Option<&Photo> {
        match angle {
            PhotoAngle::Front => self.front.as_ref(),
            PhotoAngle::Left => self.left.as_ref(),
            PhotoAngle::Right => self.right.as_ref(),
            PhotoAngle::Back => self.back.as_ref(),
            PhotoAngle::Additional => None,
        }
    }

    /// Put a photo in its angle slot (replacing) or append to `additional`.
    ///
    /// A photo already present by id is replaced in place.
    pub fn place(&mut self, photo: Photo) {
        if let Some(existing) = self.additional.iter_mut().find(|p| p.id == photo.id) {
            *existing = photo;
            return;
        }
        match photo.angle {
            PhotoAngle::Front => self.front = Some(photo),
            PhotoAngle::Left => self.left = Some(photo),
            PhotoAngle::Right => self.right = Some(photo),
            PhotoAngle::Back => self.back = Some(photo),
            PhotoAngle::Additional => self.additional.push(photo),
        }
    }

    /// Take a photo out of whichever slot holds it.
    pub fn remove(&mut self, photo_id: EntityId) -> Option<Photo> {
        for slot in [&mut self.front, &mut self.left, &mut self.right, &mut self.back] {
            if slot.as_ref().is_some_and(|p| p.id == photo_id) {
                return slot.take();
            }
        }
        let index = self.additional.iter().position(|p| p.id == photo_id)?;
        Some(self.additional.remove(index))
    }

    /// Mutable access to a photo by id.
    pub fn get_mut(&mut self, photo_id: EntityId) -> Option<&mut Photo> {
        [&mut self.front, &mut self.left, &mut self.right, &mut self.back]
            .into_iter()
            .flatten()
            .chain(self.additional.iter_mut())
            .find(|p| p.id == photo_id)
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Continuity documentation for one character in one scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneCapture {
    pub id: EntityId,
    pub scene_id: EntityId,
    pub character_id: EntityId,
    #[serde(default)]
    pub look_id: Option<EntityId>,
    #[serde(default)]
    pub photos: CapturePhotos,
    #[serde(default)]
    pub continuity_flags: ContinuityFlags,
    #[serde(default)]
    pub continuity_events: Vec<ContinuityEvent>,
    #[serde(default)]
    pub sfx_details: Option<SfxDetails>,
    #[serde(default)]
    pub notes: String,
    /// Minutes spent in the chair.
    #[serde(default)]
    pub application_minutes: Option<u32>,
    pub captured_at: Timestamp,
}

impl SceneCapture {
    pub fn new(scene_id: EntityId, character_id: EntityId, captured_at: Timestamp) -> Self {
        Self {
            id: new_id(),
            scene_id,
            character_id,
            look_id: None,
            photos: CapturePhotos::default(),
            continuity_flags: ContinuityFlags::default(),
            continuity_events: Vec::new(),
            sfx_details: None,
            notes: String::new(),
            application_minutes: None,
            captured_at,
        }
    }

    pub fn key(&self) -> CaptureKey {
        CaptureKey::new(self.scene_id, self.character_id)
    }
}
