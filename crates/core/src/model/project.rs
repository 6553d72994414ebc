//! The locally held project aggregate.
//!
//! Every field group sits behind its own `Arc`. A mutation that touches a
//! group replaces that group's `Arc`, so comparing two snapshots by pointer
//! identity tells exactly which categories changed.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::category::SyncCategory;
use crate::model::capture::{CaptureKey, SceneCapture};
use crate::model::character::Character;
use crate::model::document::{CallSheet, Schedule, ScriptUpload};
use crate::model::look::Look;
use crate::model::scene::Scene;
use crate::types::EntityId;

pub type CaptureMap = BTreeMap<CaptureKey, SceneCapture>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectState {
    pub project_id: EntityId,
    #[serde(default)]
    pub scenes: Arc<Vec<Scene>>,
    #[serde(default)]
    pub characters: Arc<Vec<Character>>,
    #[serde(default)]
    pub looks: Arc<Vec<Look>>,
    #[serde(default)]
    pub captures: Arc<CaptureMap>,
    #[serde(default)]
    pub schedule: Arc<Option<Schedule>>,
    #[serde(default)]
    pub call_sheets: Arc<Vec<CallSheet>>,
    #[serde(default)]
    pub script: Arc<Option<ScriptUpload>>,
}

impl ProjectState {
    pub fn new(project_id: EntityId) -> Self {
        Self {
            project_id,
            scenes: Arc::default(),
            characters: Arc::default(),
            looks: Arc::default(),
            captures: Arc::default(),
            schedule: Arc::default(),
            call_sheets: Arc::default(),
            script: Arc::default(),
        }
    }

    /// Categories whose group was replaced between `previous` and `self`.
    pub fn changed_categories(&self, previous: &ProjectState) -> Vec<SyncCategory> {
        let mut changed = Vec::new();
        if !Arc::ptr_eq(&self.characters, &previous.characters) {
            changed.push(SyncCategory::Characters);
        }
        if !Arc::ptr_eq(&self.scenes, &previous.scenes) {
            changed.push(SyncCategory::Scenes);
        }
        if !Arc::ptr_eq(&self.looks, &previous.looks) {
            changed.push(SyncCategory::Looks);
        }
        if !Arc::ptr_eq(&self.captures, &previous.captures) {
            changed.push(SyncCategory::Captures);
        }
        if !Arc::ptr_eq(&self.schedule, &previous.schedule) {
            changed.push(SyncCategory::Schedule);
        }
        if !Arc::ptr_eq(&self.call_sheets, &previous.call_sheets) {
            changed.push(SyncCategory::CallSheets);
        }
        if !Arc::ptr_eq(&self.script, &previous.script) {
            changed.push(SyncCategory::Script);
        }
        changed
    }

    /// No scenes, characters or looks yet.
    pub fn is_blank(&self) -> bool {
        self.scenes.is_empty() && self.characters.is_empty() && self.looks.is_empty()
    }

    pub fn scene(&self, id: EntityId) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.id == id)
    }

    pub fn character(&self, id: EntityId) -> Option<&Character> {
        self.characters.iter().find(|c| c.id == id)
    }

    pub fn look(&self, id: EntityId) -> Option<&Look> {
        self.looks.iter().find(|l| l.id == id)
    }

    pub fn capture_by_id(&self, id: EntityId) -> Option<&SceneCapture> {
        self.captures.values().find(|c| c.id == id)
    }

    pub fn has_scene(&self, id: EntityId) -> bool {
        self.scene(id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::new_id;

    #[test]
    fn clone_shares_every_group() {
        let state = ProjectState::new(new_id());
        let copy = state.clone();
        assert!(copy.changed_categories(&state).is_empty());
    }

    #[test]
    fn replacing_a_group_marks_only_that_category() {
        let state = ProjectState::new(new_id());
        let mut next = state.clone();
        Arc::make_mut(&mut next.scenes).push(Scene::new("1"));

        assert_eq!(next.changed_categories(&state), vec![SyncCategory::Scenes]);
    }

    #[test]
    fn equal_content_with_new_arc_still_counts_as_changed() {
        let state = ProjectState::new(new_id());
        let mut next = state.clone();
        next.looks = Arc::new(Vec::new());
        assert_eq!(next.changed_categories(&state), vec![SyncCategory::Looks]);
    }

    #[test]
    fn blank_project_has_no_primary_rows() {
        let mut state = ProjectState::new(new_id());
        assert!(state.is_blank());
        Arc::make_mut(&mut state.characters).push(Character::new("Rory"));
        assert!(!state.is_blank());
    }
}
