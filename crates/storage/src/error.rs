/// Errors from the photo cache and the object store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing failed: {0}")]
    Image(#[from] image::ImageError),

    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The object store returned a non-2xx status code.
    #[error("Object store error ({status}): {body}")]
    Http { status: u16, body: String },

    #[error("Authentication required")]
    AuthRequired,

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Object store unreachable: {0}")]
    Unreachable(String),

    /// Blocking work (thumbnail generation) panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Task(String),
}

impl StorageError {
    /// Transport failures and 5xx responses are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request(_) | Self::Unreachable(_) => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_retryable_client_errors_are_not() {
        assert!(StorageError::Http { status: 503, body: String::new() }.is_retryable());
        assert!(!StorageError::Http { status: 400, body: String::new() }.is_retryable());
        assert!(!StorageError::AuthRequired.is_retryable());
        assert!(StorageError::Unreachable("offline".into()).is_retryable());
    }
}
