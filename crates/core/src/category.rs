//! Sync categories: the unit of debounced push and change classification.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A coarse data group pushed as one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncCategory {
    Scenes,
    Characters,
    Looks,
    Captures,
    Schedule,
    CallSheets,
    Script,
}

/// All categories in push order (parents before children).
pub const ALL_CATEGORIES: &[SyncCategory] = &[
    SyncCategory::Characters,
    SyncCategory::Scenes,
    SyncCategory::Looks,
    SyncCategory::Captures,
    SyncCategory::Schedule,
    SyncCategory::CallSheets,
    SyncCategory::Script,
];

impl SyncCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scenes => "scenes",
            Self::Characters => "characters",
            Self::Looks => "looks",
            Self::Captures => "captures",
            Self::Schedule => "schedule",
            Self::CallSheets => "call_sheets",
            Self::Script => "script",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        ALL_CATEGORIES
            .iter()
            .copied()
            .find(|c| c.as_str() == name)
            .ok_or_else(|| CoreError::UnknownVariant {
                kind: "sync category",
                value: name.to_string(),
            })
    }
}

impl std::fmt::Display for SyncCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_category_round_trips_by_name() {
        for category in ALL_CATEGORIES {
            assert_eq!(SyncCategory::from_name(category.as_str()).unwrap(), *category);
        }
    }

    #[test]
    fn characters_push_before_scenes_and_looks() {
        let pos = |c| ALL_CATEGORIES.iter().position(|x| *x == c).unwrap();
        assert!(pos(SyncCategory::Characters) < pos(SyncCategory::Looks));
        assert!(pos(SyncCategory::Scenes) < pos(SyncCategory::Captures));
    }
}
