//! Project-scoped documents: shooting schedule, call sheets, script uploads.
//!
//! Each has a raw-text field, structured data derived from it, and an
//! optional PDF stored out-of-band in the object store.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::{new_id, EntityId, Timestamp};

/// An out-of-band binary attachment (PDF).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub file_name: Option<String>,
    /// Object-store path once uploaded.
    #[serde(default)]
    pub storage_path: Option<String>,
    /// Local bytes awaiting upload.
    #[serde(skip)]
    pub bytes: Option<Arc<Vec<u8>>>,
}

impl Attachment {
    /// Local bytes exist but have not been uploaded yet.
    pub fn needs_upload(&self) -> bool {
        self.storage_path.is_none() && self.bytes.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleDay {
    pub day_number: u32,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub scene_numbers: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastMember {
    pub number: u32,
    pub character_name: String,
    #[serde(default)]
    pub actor_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: EntityId,
    #[serde(default)]
    pub raw_text: Option<String>,
    #[serde(default)]
    pub days: Vec<ScheduleDay>,
    #[serde(default)]
    pub cast_list: Vec<CastMember>,
    #[serde(default)]
    pub pdf: Attachment,
    pub uploaded_at: Timestamp,
}

impl Schedule {
    pub fn new(uploaded_at: Timestamp) -> Self {
        Self {
            id: new_id(),
            raw_text: None,
            days: Vec::new(),
            cast_list: Vec::new(),
            pdf: Attachment::default(),
            uploaded_at,
        }
    }

    pub fn has_days(&self) -> bool {
        !self.days.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSheet {
    pub id: EntityId,
    pub shooting_date: NaiveDate,
    #[serde(default)]
    pub day_number: Option<u32>,
    #[serde(default)]
    pub raw_text: Option<String>,
    #[serde(default)]
    pub scene_numbers: Vec<String>,
    #[serde(default)]
    pub unit_call: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub pdf: Attachment,
    pub uploaded_at: Timestamp,
}

impl CallSheet {
    pub fn new(shooting_date: NaiveDate, uploaded_at: Timestamp) -> Self {
        Self {
            id: new_id(),
            shooting_date,
            day_number: None,
            raw_text: None,
            scene_numbers: Vec::new(),
            unit_call: None,
            notes: None,
            pdf: Attachment::default(),
            uploaded_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptUpload {
    pub id: EntityId,
    pub file_name: String,
    #[serde(default)]
    pub raw_text: Option<String>,
    #[serde(default)]
    pub scene_count: u32,
    #[serde(default)]
    pub pdf: Attachment,
    pub uploaded_at: Timestamp,
}

impl ScriptUpload {
    pub fn new(file_name: impl Into<String>, uploaded_at: Timestamp) -> Self {
        Self {
            id: new_id(),
            file_name: file_name.into(),
            raw_text: None,
            scene_count: 0,
            pdf: Attachment::default(),
            uploaded_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_needs_upload_only_with_bytes_and_no_path() {
        let mut pdf = Attachment::default();
        assert!(!pdf.needs_upload());

        pdf.bytes = Some(Arc::new(b"%PDF-1.7".to_vec()));
        assert!(pdf.needs_upload());

        pdf.storage_path = Some("projects/p/schedules/s.pdf".into());
        assert!(!pdf.needs_upload());
    }

    #[test]
    fn attachment_bytes_are_not_serialized() {
        let pdf = Attachment {
            file_name: Some("schedule.pdf".into()),
            storage_path: None,
            bytes: Some(Arc::new(vec![1, 2, 3])),
        };
        let json = serde_json::to_value(&pdf).unwrap();
        assert!(json.get("bytes").is_none());
    }
}
