use std::time::Duration;

use continuity_core::{EntityId, SyncCategory, Table};
use continuity_db::BackendError;
use continuity_realtime::RealtimeError;
use continuity_storage::StorageError;

/// A backend row that does not have the shape the mapper expects.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MapperError {
    #[error("Unexpected shape in {table}.{field}: {message}")]
    UnexpectedShape {
        table: Table,
        field: &'static str,
        message: String,
    },
}

impl MapperError {
    pub(crate) fn shape(table: Table, field: &'static str, message: impl ToString) -> Self {
        Self::UnexpectedShape {
            table,
            field,
            message: message.to_string(),
        }
    }

    pub fn table(&self) -> Table {
        match self {
            Self::UnexpectedShape { table, .. } => *table,
        }
    }
}

/// A pull that stopped part way. Groups in `merged` were applied locally
/// before the failure and are kept.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Pull failed at {table}: {source}")]
pub struct PullError {
    pub table: Table,
    pub merged: Vec<SyncCategory>,
    #[source]
    pub source: Box<SyncError>,
}

/// Coarse classification used for status reporting and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    AuthRequired,
    Network,
    SchemaMismatch,
    PartialMerge,
    ProjectNotFound,
    Mapping,
    Storage,
    Offline,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    /// No valid session; never retried.
    #[error("Authentication required")]
    AuthRequired,

    /// Transient transport failure or timeout.
    #[error("Network error: {0}")]
    Network(String),

    /// The backend rejected a write; never retried.
    #[error("Schema mismatch on {table}: {message}")]
    SchemaMismatch { table: Table, message: String },

    #[error(transparent)]
    Pull(#[from] PullError),

    #[error("Project {0} not found")]
    ProjectNotFound(EntityId),

    #[error(transparent)]
    Mapping(#[from] MapperError),

    #[error("Storage error: {0}")]
    Storage(String),

    /// A manual sync was requested with no connectivity.
    #[error("Offline")]
    Offline,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AuthRequired => ErrorKind::AuthRequired,
            Self::Network(_) => ErrorKind::Network,
            Self::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
            Self::Pull(_) => ErrorKind::PartialMerge,
            Self::ProjectNotFound(_) => ErrorKind::ProjectNotFound,
            Self::Mapping(_) => ErrorKind::Mapping,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Offline => ErrorKind::Offline,
        }
    }

    /// Only transport failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Pull(e) => e.source.is_retryable(),
            _ => false,
        }
    }

    pub(crate) fn timed_out(after: Duration) -> Self {
        Self::Network(format!("request timed out after {}s", after.as_secs_f32()))
    }
}

impl From<BackendError> for SyncError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::AuthRequired => Self::AuthRequired,
            BackendError::Network(message) => Self::Network(message),
            BackendError::SchemaMismatch { table, message } => {
                Self::SchemaMismatch { table, message }
            }
            BackendError::Timeout => Self::Network("request timed out".into()),
        }
    }
}

impl From<StorageError> for SyncError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::AuthRequired => Self::AuthRequired,
            e if e.is_retryable() => Self::Network(e.to_string()),
            e => Self::Storage(e.to_string()),
        }
    }
}

impl From<RealtimeError> for SyncError {
    fn from(err: RealtimeError) -> Self {
        Self::Network(err.to_string())
    }
}
