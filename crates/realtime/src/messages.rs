//! Phoenix channel frames used by the realtime server.
//!
//! Every frame has the shape
//! `{"topic": "...", "event": "...", "payload": {...}, "ref": "..."}`.
//! Outgoing frames are built with the `*_frame` helpers; incoming frames
//! are parsed with [`parse_frame`] into a typed [`ServerMessage`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use continuity_core::Table;
use continuity_db::models::{ChangeKind, RowChange};

use crate::feed::TableFilter;

pub const EVENT_JOIN: &str = "phx_join";
pub const EVENT_LEAVE: &str = "phx_leave";
pub const EVENT_REPLY: &str = "phx_reply";
pub const EVENT_ERROR: &str = "phx_error";
pub const EVENT_CLOSE: &str = "phx_close";
pub const EVENT_HEARTBEAT: &str = "heartbeat";
pub const EVENT_POSTGRES_CHANGES: &str = "postgres_changes";
pub const EVENT_PRESENCE: &str = "presence";
pub const EVENT_PRESENCE_STATE: &str = "presence_state";
pub const EVENT_PRESENCE_DIFF: &str = "presence_diff";

/// Topic heartbeats are sent on.
pub const PHOENIX_TOPIC: &str = "phoenix";

/// A raw Phoenix frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

/// Channel topic for one project.
pub fn project_topic(project_id: impl std::fmt::Display) -> String {
    format!("realtime:project-{project_id}")
}

/// Join a channel, registering one `postgres_changes` listener per table
/// and a presence key.
pub fn join_frame(
    topic: &str,
    tables: &[TableFilter],
    presence_key: &str,
    access_token: Option<&str>,
    reference: &str,
) -> Frame {
    let listeners: Vec<serde_json::Value> = tables
        .iter()
        .map(|t| {
            let mut listener = json!({
                "event": "*",
                "schema": "public",
                "table": t.table.name(),
            });
            if let Some(filter) = t.filter_expr() {
                listener["filter"] = json!(filter);
            }
            listener
        })
        .collect();

    let mut payload = json!({
        "config": {
            "broadcast": { "self": false },
            "presence": { "key": presence_key },
            "postgres_changes": listeners,
        }
    });
    if let Some(token) = access_token {
        payload["access_token"] = json!(token);
    }

    Frame {
        topic: topic.to_string(),
        event: EVENT_JOIN.to_string(),
        payload,
        reference: Some(reference.to_string()),
        join_ref: Some(reference.to_string()),
    }
}

/// Announce this client in the channel's presence list.
pub fn track_frame(topic: &str, presence_key: &str, reference: &str) -> Frame {
    Frame {
        topic: topic.to_string(),
        event: EVENT_PRESENCE.to_string(),
        payload: json!({
            "type": "presence",
            "event": "track",
            "payload": { "identity": presence_key, "online_at": Utc::now().to_rfc3339() },
        }),
        reference: Some(reference.to_string()),
        join_ref: None,
    }
}

pub fn heartbeat_frame(reference: &str) -> Frame {
    Frame {
        topic: PHOENIX_TOPIC.to_string(),
        event: EVENT_HEARTBEAT.to_string(),
        payload: json!({}),
        reference: Some(reference.to_string()),
        join_ref: None,
    }
}

pub fn leave_frame(topic: &str, reference: &str) -> Frame {
    Frame {
        topic: topic.to_string(),
        event: EVENT_LEAVE.to_string(),
        payload: json!({}),
        reference: Some(reference.to_string()),
        join_ref: None,
    }
}

// ---------------------------------------------------------------------------
// Incoming
// ---------------------------------------------------------------------------

/// Body of a `postgres_changes` frame (`payload.data`).
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeData {
    pub table: String,
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    #[serde(default)]
    pub record: Option<serde_json::Value>,
    #[serde(default)]
    pub old_record: Option<serde_json::Value>,
    pub commit_timestamp: DateTime<Utc>,
}

impl ChangeData {
    /// Convert into a [`RowChange`]; `None` for tables this client does not know.
    pub fn into_row_change(self) -> Option<RowChange> {
        let table = Table::from_name(&self.table).ok()?;
        Some(RowChange {
            table,
            kind: self.kind,
            record: self.record.filter(|r| !r.is_null()),
            old_record: self.old_record.filter(|r| !r.is_null()),
            commit_timestamp: self.commit_timestamp,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ChangePayload {
    data: ChangeData,
}

/// One presence key's metadata list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PresenceEntry {
    #[serde(default)]
    pub metas: Vec<serde_json::Value>,
}

pub type PresenceMap = HashMap<String, PresenceEntry>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PresenceDiff {
    #[serde(default)]
    pub joins: PresenceMap,
    #[serde(default)]
    pub leaves: PresenceMap,
}

/// Typed view of an incoming frame.
#[derive(Debug, Clone)]
pub enum ServerMessage {
    Change(ChangeData),
    PresenceState(PresenceMap),
    PresenceDiff(PresenceDiff),
    Reply {
        reference: Option<String>,
        ok: bool,
        response: serde_json::Value,
    },
    ChannelError(serde_json::Value),
    ChannelClosed,
    /// Any other event; callers log and continue.
    Other(String),
}

/// Parse a text frame.
///
/// Returns `Err` for malformed JSON or a known event with a malformed
/// payload.
pub fn parse_frame(text: &str) -> Result<ServerMessage, serde_json::Error> {
    let frame: Frame = serde_json::from_str(text)?;
    let message = match frame.event.as_str() {
        EVENT_POSTGRES_CHANGES => {
            let payload: ChangePayload = serde_json::from_value(frame.payload)?;
            ServerMessage::Change(payload.data)
        }
        EVENT_PRESENCE_STATE => ServerMessage::PresenceState(serde_json::from_value(frame.payload)?),
        EVENT_PRESENCE_DIFF => ServerMessage::PresenceDiff(serde_json::from_value(frame.payload)?),
        EVENT_REPLY => {
            let ok = frame.payload.get("status").and_then(|s| s.as_str()) == Some("ok");
            let response = frame
                .payload
                .get("response")
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            ServerMessage::Reply {
                reference: frame.reference,
                ok,
                response,
            }
        }
        EVENT_ERROR => ServerMessage::ChannelError(frame.payload),
        EVENT_CLOSE => ServerMessage::ChannelClosed,
        other => ServerMessage::Other(other.to_string()),
    };
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_frame_carries_filters_and_presence_key() {
        let project = uuid::Uuid::from_u128(7);
        let tables = [
            TableFilter::project(Table::Scenes, project),
            TableFilter::unfiltered(Table::SceneCaptures),
        ];
        let frame = join_frame(&project_topic(project), &tables, "client-a", Some("tok"), "1");

        assert_eq!(frame.event, "phx_join");
        let listeners = frame.payload["config"]["postgres_changes"].as_array().unwrap();
        assert_eq!(listeners[0]["table"], "scenes");
        assert_eq!(listeners[0]["filter"], format!("project_id=eq.{project}"));
        assert!(listeners[1].get("filter").is_none());
        assert_eq!(frame.payload["config"]["presence"]["key"], "client-a");
        assert_eq!(frame.payload["access_token"], "tok");

        let text = serde_json::to_string(&frame).unwrap();
        assert!(text.contains("\"ref\":\"1\""));
    }

    #[test]
    fn parses_postgres_change() {
        let text = r#"{
            "topic": "realtime:project-1",
            "event": "postgres_changes",
            "payload": {
                "data": {
                    "schema": "public",
                    "table": "characters",
                    "type": "UPDATE",
                    "commit_timestamp": "2026-03-01T10:00:00Z",
                    "record": {"id": "00000000-0000-0000-0000-000000000001", "name": "Rory"},
                    "old_record": {"id": "00000000-0000-0000-0000-000000000001"}
                },
                "ids": [1]
            },
            "ref": null
        }"#;
        let ServerMessage::Change(data) = parse_frame(text).unwrap() else {
            panic!("expected a change");
        };
        let change = data.into_row_change().unwrap();
        assert_eq!(change.table, Table::Characters);
        assert_eq!(change.kind, ChangeKind::Update);
        assert_eq!(change.str_field("name"), Some("Rory"));
    }

    #[test]
    fn unknown_table_is_dropped() {
        let data = ChangeData {
            table: "audit_log".into(),
            kind: ChangeKind::Insert,
            record: Some(json!({})),
            old_record: None,
            commit_timestamp: Utc::now(),
        };
        assert!(data.into_row_change().is_none());
    }

    #[test]
    fn parses_presence_diff() {
        let text = r#"{"topic":"t","event":"presence_diff","payload":{
            "joins": {"client-b": {"metas": [{"phx_ref": "x"}]}},
            "leaves": {}
        },"ref":null}"#;
        let ServerMessage::PresenceDiff(diff) = parse_frame(text).unwrap() else {
            panic!("expected a presence diff");
        };
        assert_eq!(diff.joins["client-b"].metas.len(), 1);
        assert!(diff.leaves.is_empty());
    }

    #[test]
    fn reply_status_is_read() {
        let text = r#"{"topic":"t","event":"phx_reply","payload":{"status":"error","response":{"reason":"unauthorized"}},"ref":"1"}"#;
        let ServerMessage::Reply { ok, response, reference } = parse_frame(text).unwrap() else {
            panic!("expected a reply");
        };
        assert!(!ok);
        assert_eq!(reference.as_deref(), Some("1"));
        assert_eq!(response["reason"], "unauthorized");
    }

    #[test]
    fn unknown_event_is_other() {
        let text = r#"{"topic":"t","event":"system","payload":{},"ref":null}"#;
        assert!(matches!(parse_frame(text).unwrap(), ServerMessage::Other(e) if e == "system"));
    }
}
