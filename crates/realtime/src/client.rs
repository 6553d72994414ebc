//! WebSocket client for the realtime server.
//!
//! [`RealtimeClient`] holds the connection configuration. Call
//! [`RealtimeClient::connect`] to establish a live [`RealtimeConnection`].

use tokio_tungstenite::{connect_async, MaybeTlsStream};

use crate::error::RealtimeError;

/// Protocol version appended to the socket URL.
const PROTOCOL_VSN: &str = "1.0.0";

pub type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Configuration handle for one realtime server.
pub struct RealtimeClient {
    ws_url: String,
    api_key: Option<String>,
}

/// A live WebSocket connection.
pub struct RealtimeConnection {
    /// Unique id of this connection, for log correlation.
    pub connection_id: String,
    pub ws_stream: WsStream,
}

impl RealtimeClient {
    /// * `ws_url` - Realtime socket base URL, e.g. `wss://host/realtime/v1`.
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into().trim_end_matches('/').to_string(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// Full socket URL including the api key and protocol version.
    pub fn socket_url(&self) -> String {
        match &self.api_key {
            Some(key) => format!("{}/websocket?apikey={key}&vsn={PROTOCOL_VSN}", self.ws_url),
            None => format!("{}/websocket?vsn={PROTOCOL_VSN}", self.ws_url),
        }
    }

    pub async fn connect(&self) -> Result<RealtimeConnection, RealtimeError> {
        let connection_id = uuid::Uuid::new_v4().to_string();

        let (ws_stream, _response) = connect_async(self.socket_url()).await.map_err(|e| {
            RealtimeError::Connection(format!(
                "Failed to connect to realtime server at {}: {e}",
                self.ws_url
            ))
        })?;

        tracing::info!(
            connection_id = %connection_id,
            "Connected to realtime server at {}",
            self.ws_url,
        );

        Ok(RealtimeConnection {
            connection_id,
            ws_stream,
        })
    }
}
