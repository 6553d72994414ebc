/// All entity identifiers are UUIDs assigned by the creating client.
pub type EntityId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Generate a fresh entity id.
pub fn new_id() -> EntityId {
    uuid::Uuid::new_v4()
}
