//! [`ChangeFeed`] over an in-process [`MemoryRowStore`].
//!
//! Clients sharing one store and one [`PresenceRegistry`] see each other's
//! commits and presence exactly as they would through the WebSocket feed.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use continuity_db::MemoryRowStore;

use crate::error::RealtimeError;
use crate::feed::{
    ChangeFeed, FeedMessage, FeedStatus, Subscription, SubscriptionRequest, FEED_CHANNEL_CAPACITY,
};
use crate::presence::PresenceRegistry;

pub struct MemoryChangeFeed {
    store: Arc<MemoryRowStore>,
    presence: Arc<PresenceRegistry>,
}

impl MemoryChangeFeed {
    pub fn new(store: Arc<MemoryRowStore>, presence: Arc<PresenceRegistry>) -> Self {
        Self { store, presence }
    }
}

#[async_trait]
impl ChangeFeed for MemoryChangeFeed {
    async fn subscribe(&self, request: SubscriptionRequest) -> Result<Subscription, RealtimeError> {
        // Subscribe before returning so no commit after this call is missed.
        let mut changes = self.store.subscribe();
        let guard = self.presence.join(request.project_id, &request.identity);
        // Our own join is reported through the initial count, not the broadcast.
        let mut presence_rx = self.presence.subscribe();
        let initial_members = self.presence.member_count(request.project_id);

        let (tx, rx) = mpsc::channel(FEED_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            // Held for the life of the task.
            let _guard = guard;
            let project_id = request.project_id;

            if tx.send(FeedMessage::Status(FeedStatus::Subscribed)).await.is_err() {
                return;
            }
            let initial = FeedMessage::Presence {
                members: initial_members,
            };
            if tx.send(initial).await.is_err() {
                return;
            }

            loop {
                let message = tokio::select! {
                    _ = token.cancelled() => return,
                    change = changes.recv() => match change {
                        Ok(change) if request.matches(&change) => FeedMessage::Change(change),
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(project_id = %project_id, skipped, "Change feed lagged");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            let _ = tx
                                .send(FeedMessage::Status(FeedStatus::Closed("store dropped".into())))
                                .await;
                            return;
                        }
                    },
                    update = presence_rx.recv() => match update {
                        Ok((project, members)) if project == project_id => {
                            FeedMessage::Presence { members }
                        }
                        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => continue,
                    },
                };
                if tx.send(message).await.is_err() {
                    return;
                }
            }
        });

        Ok(Subscription::new(rx, cancel, task))
    }
}
