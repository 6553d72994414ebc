use crate::types::EntityId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: EntityId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unknown {kind} '{value}'")]
    UnknownVariant { kind: &'static str, value: String },
}
