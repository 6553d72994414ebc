//! Continuity photos.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{new_id, EntityId, Timestamp};

/// Which angle a photo was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhotoAngle {
    Front,
    Left,
    Right,
    Back,
    Additional,
}

impl PhotoAngle {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Front => "front",
            Self::Left => "left",
            Self::Right => "right",
            Self::Back => "back",
            Self::Additional => "additional",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        match name {
            "front" => Ok(Self::Front),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "back" => Ok(Self::Back),
            "additional" => Ok(Self::Additional),
            other => Err(CoreError::UnknownVariant {
                kind: "photo angle",
                value: other.to_string(),
            }),
        }
    }
}

/// A photo attached to a capture or used as a look's master reference.
///
/// The binary payload lives in the photo blob cache keyed by `id`; once
/// uploaded it is never overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    pub id: EntityId,
    pub angle: PhotoAngle,
    pub taken_at: Timestamp,
    /// Object-store path once uploaded.
    #[serde(default)]
    pub storage_path: Option<String>,
    /// Freshly captured bytes not yet written to the blob cache.
    #[serde(skip)]
    pub inline: Option<Arc<Vec<u8>>>,
}

impl Photo {
    pub fn new(angle: PhotoAngle, taken_at: Timestamp) -> Self {
        Self {
            id: new_id(),
            angle,
            taken_at,
            storage_path: None,
            inline: None,
        }
    }

    pub fn with_inline(mut self, bytes: Vec<u8>) -> Self {
        self.inline = Some(Arc::new(bytes));
        self
    }
}
