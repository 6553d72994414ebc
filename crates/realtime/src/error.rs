/// Errors from the realtime transport.
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    /// Failed to establish the WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A protocol-level error on an established connection.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server refused the channel join.
    #[error("Join rejected: {0}")]
    JoinRejected(String),
}
