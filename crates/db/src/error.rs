use continuity_core::Table;

/// Failure talking to the backend data interface.
///
/// The variants are the sync engine's error taxonomy at the storage
/// boundary: only `Network` and `Timeout` are worth retrying.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    /// No valid session; abort immediately.
    #[error("Authentication required")]
    AuthRequired,

    /// Transient transport failure.
    #[error("Network error: {0}")]
    Network(String),

    /// The server rejected the row shape.
    #[error("Schema mismatch on {table}: {message}")]
    SchemaMismatch { table: Table, message: String },

    #[error("Request timed out")]
    Timeout,
}

impl BackendError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout)
    }
}

/// Classify a sqlx error into the backend taxonomy.
///
/// - SQLSTATE class `28` (invalid authorization) maps to `AuthRequired`.
/// - Classes `22` (data exception), `23` (integrity violation) and `42`
///   (syntax / undefined column) map to `SchemaMismatch`.
/// - I/O, TLS, pool and protocol failures map to `Network`.
pub fn classify_sqlx_error(table: Table, err: sqlx::Error) -> BackendError {
    match &err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.to_string()).unwrap_or_default();
            if code.starts_with("28") {
                return BackendError::AuthRequired;
            }
            if code.starts_with("22") || code.starts_with("23") || code.starts_with("42") {
                return BackendError::SchemaMismatch {
                    table,
                    message: db_err.message().to_string(),
                };
            }
            tracing::error!(table = %table, error = %db_err, "Unclassified database error");
            BackendError::Network(db_err.message().to_string())
        }
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_) => BackendError::SchemaMismatch {
            table,
            message: err.to_string(),
        },
        sqlx::Error::PoolTimedOut => BackendError::Timeout,
        other => BackendError::Network(other.to_string()),
    }
}
