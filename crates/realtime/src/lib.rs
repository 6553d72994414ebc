//! Realtime change feed for the continuity sync engine.
//!
//! [`ChangeFeed`] is the interface the sync engine consumes: one
//! subscription per project delivering committed row changes and presence
//! counts. [`WsChangeFeed`] speaks the Phoenix channel protocol over
//! WebSocket with heartbeats and exponential-backoff reconnect;
//! [`MemoryChangeFeed`] serves the same messages from an in-process
//! [`MemoryRowStore`](continuity_db::MemoryRowStore).

pub mod client;
pub mod error;
pub mod feed;
pub mod memory;
pub mod messages;
pub mod presence;
pub mod reconnect;
pub mod ws_feed;

pub use client::{RealtimeClient, RealtimeConnection};
pub use error::RealtimeError;
pub use feed::{ChangeFeed, FeedMessage, FeedStatus, Subscription, SubscriptionRequest, TableFilter};
pub use memory::MemoryChangeFeed;
pub use presence::{PresenceRegistry, PresenceTracker};
pub use reconnect::ReconnectConfig;
pub use ws_feed::WsChangeFeed;
