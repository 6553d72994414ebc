//! Row-change records carried by the realtime change feed.

use serde::{Deserialize, Serialize};
use continuity_core::{EntityId, Table, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One committed row change.
///
/// `record` is the new row (absent for deletes); `old_record` carries at
/// least the primary key for deletes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowChange {
    pub table: Table,
    pub kind: ChangeKind,
    #[serde(default)]
    pub record: Option<serde_json::Value>,
    #[serde(default)]
    pub old_record: Option<serde_json::Value>,
    pub commit_timestamp: Timestamp,
}

impl RowChange {
    /// The row this change describes, new image preferred.
    pub fn row(&self) -> Option<&serde_json::Value> {
        self.record.as_ref().or(self.old_record.as_ref())
    }

    /// Read a uuid column from the row image.
    pub fn uuid_field(&self, column: &str) -> Option<EntityId> {
        self.row()?
            .get(column)?
            .as_str()
            .and_then(|s| s.parse().ok())
    }

    /// Read a string column from the row image.
    pub fn str_field(&self, column: &str) -> Option<&str> {
        self.row()?.get(column)?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn delete_reads_id_from_old_record() {
        let id = uuid::Uuid::new_v4();
        let change = RowChange {
            table: Table::Scenes,
            kind: ChangeKind::Delete,
            record: None,
            old_record: Some(serde_json::json!({ "id": id.to_string() })),
            commit_timestamp: Utc::now(),
        };
        assert_eq!(change.uuid_field("id"), Some(id));
        assert_eq!(change.uuid_field("project_id"), None);
    }

    #[test]
    fn kind_serializes_uppercase() {
        assert_eq!(serde_json::to_value(ChangeKind::Update).unwrap(), "UPDATE");
    }
}
