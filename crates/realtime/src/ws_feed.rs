//! [`ChangeFeed`] over the realtime WebSocket.
//!
//! One task per subscription: join the project channel, forward
//! `postgres_changes` and presence frames, send a heartbeat on a timer,
//! and on any transport failure report `Reconnecting` and rejoin through
//! [`reconnect_loop`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::client::{RealtimeClient, RealtimeConnection};
use crate::error::RealtimeError;
use crate::feed::{
    ChangeFeed, FeedMessage, FeedStatus, Subscription, SubscriptionRequest, FEED_CHANNEL_CAPACITY,
};
use crate::messages::{
    heartbeat_frame, join_frame, leave_frame, parse_frame, project_topic, track_frame, Frame,
    ServerMessage,
};
use crate::presence::PresenceTracker;
use crate::reconnect::{reconnect_loop, ReconnectConfig};

/// Interval between heartbeats; the server drops sockets silent for 60 s.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

pub struct WsChangeFeed {
    client: Arc<RealtimeClient>,
    reconnect: ReconnectConfig,
    heartbeat_interval: Duration,
    access_token: Option<String>,
}

impl WsChangeFeed {
    pub fn new(client: RealtimeClient) -> Self {
        Self {
            client: Arc::new(client),
            reconnect: ReconnectConfig::default(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            access_token: None,
        }
    }

    pub fn with_reconnect(mut self, config: ReconnectConfig) -> Self {
        self.reconnect = config;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// User token sent with the channel join for row-level security.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }
}

#[async_trait]
impl ChangeFeed for WsChangeFeed {
    async fn subscribe(&self, request: SubscriptionRequest) -> Result<Subscription, RealtimeError> {
        let conn = self.client.connect().await?;
        let (tx, rx) = mpsc::channel(FEED_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let session = Session {
            client: Arc::clone(&self.client),
            reconnect: self.reconnect.clone(),
            heartbeat_interval: self.heartbeat_interval,
            access_token: self.access_token.clone(),
            request,
            tx,
            cancel: cancel.clone(),
            next_ref: 0,
        };
        let task = tokio::spawn(session.run(conn));
        Ok(Subscription::new(rx, cancel, task))
    }
}

/// How a single connection's session ended.
#[derive(Debug)]
enum SessionEnd {
    Cancelled,
    /// The subscriber dropped its receiver.
    ConsumerGone,
    /// The transport failed; reconnect.
    Dropped,
    /// The server refused the join; do not retry.
    Rejected(String),
}

struct Session {
    client: Arc<RealtimeClient>,
    reconnect: ReconnectConfig,
    heartbeat_interval: Duration,
    access_token: Option<String>,
    request: SubscriptionRequest,
    tx: mpsc::Sender<FeedMessage>,
    cancel: CancellationToken,
    next_ref: u64,
}

impl Session {
    async fn run(mut self, mut conn: RealtimeConnection) {
        let project_id = self.request.project_id;
        loop {
            let connection_id = conn.connection_id.clone();
            match self.run_connection(conn).await {
                SessionEnd::Cancelled | SessionEnd::ConsumerGone => {
                    tracing::info!(project_id = %project_id, connection_id = %connection_id, "Realtime feed stopped");
                    return;
                }
                SessionEnd::Rejected(reason) => {
                    tracing::error!(project_id = %project_id, reason = %reason, "Realtime join rejected");
                    let _ = self
                        .tx
                        .send(FeedMessage::Status(FeedStatus::Closed(reason)))
                        .await;
                    return;
                }
                SessionEnd::Dropped => {
                    tracing::warn!(project_id = %project_id, connection_id = %connection_id, "Realtime connection dropped");
                }
            }

            if self
                .tx
                .send(FeedMessage::Status(FeedStatus::Reconnecting))
                .await
                .is_err()
            {
                return;
            }
            match reconnect_loop(&self.client, &self.reconnect, &self.cancel).await {
                Some(next) => conn = next,
                None => return,
            }
        }
    }

    fn next_ref(&mut self) -> String {
        self.next_ref += 1;
        self.next_ref.to_string()
    }

    /// Drive one WebSocket connection: join, then multiplex heartbeats,
    /// incoming frames and cancellation via `tokio::select!`.
    async fn run_connection(&mut self, conn: RealtimeConnection) -> SessionEnd {
        let topic = project_topic(self.request.project_id);
        let (mut sink, mut stream) = conn.ws_stream.split();

        let join_ref = self.next_ref();
        let join = join_frame(
            &topic,
            &self.request.tables,
            &self.request.identity,
            self.access_token.as_deref(),
            &join_ref,
        );
        if let Err(e) = send_frame(&mut sink, &join).await {
            tracing::warn!(error = %e, "Failed to send channel join");
            return SessionEnd::Dropped;
        }

        let period = self.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + period, period);
        let mut awaiting_heartbeat: Option<String> = None;
        let mut presence = PresenceTracker::new();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let leave = leave_frame(&topic, &self.next_ref());
                    let _ = send_frame(&mut sink, &leave).await;
                    let _ = sink.close().await;
                    return SessionEnd::Cancelled;
                }
                _ = heartbeat.tick() => {
                    if awaiting_heartbeat.is_some() {
                        tracing::warn!(topic = %topic, "Heartbeat reply overdue");
                        return SessionEnd::Dropped;
                    }
                    let reference = self.next_ref();
                    if let Err(e) = send_frame(&mut sink, &heartbeat_frame(&reference)).await {
                        tracing::warn!(error = %e, "Failed to send heartbeat");
                        return SessionEnd::Dropped;
                    }
                    awaiting_heartbeat = Some(reference);
                }
                msg = stream.next() => {
                    let text = match msg {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(?frame, "Realtime server closed WebSocket");
                            return SessionEnd::Dropped;
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "WebSocket receive error");
                            return SessionEnd::Dropped;
                        }
                        None => return SessionEnd::Dropped,
                    };

                    let message = match parse_frame(&text) {
                        Ok(m) => m,
                        Err(e) => {
                            tracing::warn!(error = %e, "Unparseable realtime frame");
                            continue;
                        }
                    };

                    match message {
                        ServerMessage::Reply { reference, ok, response } => {
                            if reference.as_deref() == Some(join_ref.as_str()) {
                                if !ok {
                                    return SessionEnd::Rejected(response.to_string());
                                }
                                let track_ref = self.next_ref();
                                let track = track_frame(&topic, &self.request.identity, &track_ref);
                                if let Err(e) = send_frame(&mut sink, &track).await {
                                    tracing::warn!(error = %e, "Failed to send presence track");
                                    return SessionEnd::Dropped;
                                }
                                tracing::info!(topic = %topic, "Joined realtime channel");
                                if self.emit(FeedMessage::Status(FeedStatus::Subscribed)).await.is_err() {
                                    return SessionEnd::ConsumerGone;
                                }
                            } else if reference.is_some() && reference == awaiting_heartbeat {
                                awaiting_heartbeat = None;
                            }
                        }
                        ServerMessage::Change(data) => {
                            let Some(change) = data.into_row_change() else {
                                continue;
                            };
                            if !self.request.matches(&change) {
                                continue;
                            }
                            if self.emit(FeedMessage::Change(change)).await.is_err() {
                                return SessionEnd::ConsumerGone;
                            }
                        }
                        ServerMessage::PresenceState(state) => {
                            presence.apply_state(&state);
                            let members = presence.member_count();
                            if self.emit(FeedMessage::Presence { members }).await.is_err() {
                                return SessionEnd::ConsumerGone;
                            }
                        }
                        ServerMessage::PresenceDiff(diff) => {
                            presence.apply_diff(&diff);
                            let members = presence.member_count();
                            if self.emit(FeedMessage::Presence { members }).await.is_err() {
                                return SessionEnd::ConsumerGone;
                            }
                        }
                        ServerMessage::ChannelError(payload) => {
                            tracing::warn!(topic = %topic, %payload, "Realtime channel error");
                            return SessionEnd::Dropped;
                        }
                        ServerMessage::ChannelClosed => return SessionEnd::Dropped,
                        ServerMessage::Other(event) => {
                            tracing::debug!(event = %event, "Ignoring realtime event");
                        }
                    }
                }
            }
        }
    }

    async fn emit(&self, message: FeedMessage) -> Result<(), mpsc::error::SendError<FeedMessage>> {
        self.tx.send(message).await
    }
}

/// Serialize and send one frame as a text message.
async fn send_frame<S>(sink: &mut S, frame: &Frame) -> Result<(), RealtimeError>
where
    S: SinkExt<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let json = serde_json::to_string(frame).map_err(|e| RealtimeError::Protocol(e.to_string()))?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| RealtimeError::Protocol(e.to_string()))
}
