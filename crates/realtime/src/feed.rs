//! The change feed interface consumed by the sync engine.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use continuity_core::{EntityId, Table};
use continuity_db::models::RowChange;

use crate::error::RealtimeError;

/// Buffer between a feed task and its consumer.
pub const FEED_CHANNEL_CAPACITY: usize = 256;

/// One table to listen on, optionally filtered server-side by project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableFilter {
    pub table: Table,
    pub project_id: Option<EntityId>,
}

impl TableFilter {
    /// Rows whose `project_id` column equals `project_id`.
    pub fn project(table: Table, project_id: EntityId) -> Self {
        Self {
            table,
            project_id: Some(project_id),
        }
    }

    /// Every row of the table. Tables without a `project_id` column are
    /// subscribed this way and filtered by the consumer.
    pub fn unfiltered(table: Table) -> Self {
        Self {
            table,
            project_id: None,
        }
    }

    /// Server-side filter expression, e.g. `project_id=eq.<uuid>`.
    pub fn filter_expr(&self) -> Option<String> {
        self.project_id.map(|id| format!("project_id=eq.{id}"))
    }

    pub fn matches(&self, change: &RowChange) -> bool {
        if change.table != self.table {
            return false;
        }
        match self.project_id {
            Some(id) => change.uuid_field("project_id") == Some(id),
            None => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubscriptionRequest {
    pub project_id: EntityId,
    /// Presence key identifying this client.
    pub identity: String,
    pub tables: Vec<TableFilter>,
}

impl SubscriptionRequest {
    pub fn matches(&self, change: &RowChange) -> bool {
        self.tables.iter().any(|t| t.matches(change))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedStatus {
    /// The channel join was acknowledged.
    Subscribed,
    /// The transport dropped; the feed is reconnecting on its own.
    Reconnecting,
    /// The feed gave up; no further messages will arrive.
    Closed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    Change(RowChange),
    /// Distinct identities currently attached to the project channel.
    Presence { members: usize },
    Status(FeedStatus),
}

/// Source of committed row changes for one project.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Open a subscription. Changes committed after this returns are
    /// delivered in commit order.
    async fn subscribe(&self, request: SubscriptionRequest) -> Result<Subscription, RealtimeError>;
}

/// A live subscription. Dropping it stops the feed task.
pub struct Subscription {
    rx: mpsc::Receiver<FeedMessage>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(
        rx: mpsc::Receiver<FeedMessage>,
        cancel: CancellationToken,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            rx,
            cancel,
            task: Some(task),
        }
    }

    /// Next message, or `None` once the feed task has ended.
    pub async fn recv(&mut self) -> Option<FeedMessage> {
        self.rx.recv().await
    }

    /// Stop the feed task and wait for it to exit.
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use continuity_db::models::ChangeKind;
    use serde_json::json;

    fn change(table: Table, project: EntityId) -> RowChange {
        RowChange {
            table,
            kind: ChangeKind::Insert,
            record: Some(json!({ "id": uuid::Uuid::new_v4(), "project_id": project })),
            old_record: None,
            commit_timestamp: Utc::now(),
        }
    }

    #[test]
    fn project_filter_checks_table_and_project() {
        let mine = uuid::Uuid::new_v4();
        let other = uuid::Uuid::new_v4();
        let filter = TableFilter::project(Table::Scenes, mine);

        assert!(filter.matches(&change(Table::Scenes, mine)));
        assert!(!filter.matches(&change(Table::Scenes, other)));
        assert!(!filter.matches(&change(Table::Looks, mine)));
    }

    #[test]
    fn unfiltered_matches_any_row_of_the_table() {
        let filter = TableFilter::unfiltered(Table::Photos);
        assert!(filter.matches(&change(Table::Photos, uuid::Uuid::new_v4())));
        assert_eq!(filter.filter_expr(), None);
    }
}
