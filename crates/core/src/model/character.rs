//! Character aggregate.

use serde::{Deserialize, Serialize};

use crate::types::{new_id, EntityId};

/// Default display colour for new characters.
pub const DEFAULT_CHARACTER_COLOR: &str = "#C9A96E";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: EntityId,
    pub name: String,
    pub initials: String,
    pub color: String,

    // -- Client-only: no backend column --
    /// Cast list number from the call sheet.
    #[serde(default)]
    pub actor_number: Option<u32>,
}

impl Character {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: new_id(),
            initials: initials_for(&name),
            name,
            color: DEFAULT_CHARACTER_COLOR.into(),
            actor_number: None,
        }
    }
}

/// First letter of up to the first two words, upper-cased.
pub fn initials_for(name: &str) -> String {
    name.split_whitespace()
        .take(2)
        .filter_map(|w| w.chars().next())
        .flat_map(char::to_uppercase)
        .collect()
}
