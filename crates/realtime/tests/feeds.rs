//! Change feeds end to end: the in-process feed over a shared store, and
//! the WebSocket feed against a scripted local server.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use continuity_core::{EntityId, Table};
use continuity_db::models::{CharacterRow, ChangeKind};
use continuity_db::{MemoryRowStore, RowStore};
use continuity_realtime::{
    ChangeFeed, FeedMessage, FeedStatus, MemoryChangeFeed, PresenceRegistry, RealtimeClient,
    ReconnectConfig, Subscription, SubscriptionRequest, TableFilter, WsChangeFeed,
};

fn request(project_id: EntityId, identity: &str) -> SubscriptionRequest {
    SubscriptionRequest {
        project_id,
        identity: identity.to_string(),
        tables: vec![
            TableFilter::project(Table::Characters, project_id),
            TableFilter::unfiltered(Table::SceneCaptures),
        ],
    }
}

fn character(project_id: EntityId, name: &str) -> CharacterRow {
    CharacterRow {
        id: uuid::Uuid::new_v4(),
        project_id,
        name: name.to_string(),
        initials: "R".into(),
        color: "#C9A961".into(),
    }
}

async fn next(sub: &mut Subscription) -> FeedMessage {
    tokio::time::timeout(Duration::from_secs(5), sub.recv())
        .await
        .expect("feed message within 5s")
        .expect("feed still open")
}

/// Skip presence updates, which arrive whenever anyone joins or leaves.
async fn next_non_presence(sub: &mut Subscription) -> FeedMessage {
    loop {
        match next(sub).await {
            FeedMessage::Presence { .. } => continue,
            other => return other,
        }
    }
}

// ---------------------------------------------------------------------------
// In-process feed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn memory_feed_delivers_only_this_projects_rows() {
    let store = Arc::new(MemoryRowStore::new());
    let registry = PresenceRegistry::new();
    let feed = MemoryChangeFeed::new(Arc::clone(&store), Arc::clone(&registry));
    let mine = store.create_project("Mine");
    let other = store.create_project("Other");

    let mut sub = feed.subscribe(request(mine, "a")).await.unwrap();
    assert_matches!(next(&mut sub).await, FeedMessage::Status(FeedStatus::Subscribed));
    assert_matches!(next(&mut sub).await, FeedMessage::Presence { members: 1 });

    store.upsert_characters(&[character(other, "Elsewhere")]).await.unwrap();
    let row = character(mine, "Rory");
    store.upsert_characters(&[row.clone()]).await.unwrap();

    let FeedMessage::Change(change) = next_non_presence(&mut sub).await else {
        panic!("expected a change");
    };
    assert_eq!(change.table, Table::Characters);
    assert_eq!(change.kind, ChangeKind::Insert);
    assert_eq!(change.uuid_field("id"), Some(row.id));
}

#[tokio::test]
async fn memory_feed_reports_presence_of_other_clients() {
    let store = Arc::new(MemoryRowStore::new());
    let registry = PresenceRegistry::new();
    let feed = MemoryChangeFeed::new(Arc::clone(&store), Arc::clone(&registry));
    let project = store.create_project("Feature");

    let mut a = feed.subscribe(request(project, "a")).await.unwrap();
    assert_matches!(next(&mut a).await, FeedMessage::Status(FeedStatus::Subscribed));
    assert_matches!(next(&mut a).await, FeedMessage::Presence { members: 1 });

    let b = feed.subscribe(request(project, "b")).await.unwrap();
    assert_matches!(next(&mut a).await, FeedMessage::Presence { members: 2 });

    b.close().await;
    assert_matches!(next(&mut a).await, FeedMessage::Presence { members: 1 });
}

// ---------------------------------------------------------------------------
// WebSocket feed
// ---------------------------------------------------------------------------

/// Accept one connection, acknowledge the join, then push one change and
/// one presence state.
async fn scripted_server(listener: TcpListener, project_id: EntityId, character_id: EntityId) {
    let (tcp, _) = listener.accept().await.unwrap();
    let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

    let join = loop {
        match ws.next().await.unwrap().unwrap() {
            Message::Text(text) => break serde_json::from_str::<serde_json::Value>(&text).unwrap(),
            _ => continue,
        }
    };
    assert_eq!(join["event"], "phx_join");
    let topic = join["topic"].as_str().unwrap().to_string();
    let reply = json!({
        "topic": topic,
        "event": "phx_reply",
        "payload": { "status": "ok", "response": {} },
        "ref": join["ref"],
    });
    ws.send(Message::Text(reply.to_string())).await.unwrap();

    let change = json!({
        "topic": topic,
        "event": "postgres_changes",
        "payload": { "data": {
            "schema": "public",
            "table": "characters",
            "type": "INSERT",
            "commit_timestamp": Utc::now().to_rfc3339(),
            "record": { "id": character_id, "project_id": project_id, "name": "Rory" },
            "old_record": null,
        }},
        "ref": null,
    });
    ws.send(Message::Text(change.to_string())).await.unwrap();

    let presence = json!({
        "topic": topic,
        "event": "presence_state",
        "payload": {
            "a": { "metas": [{ "phx_ref": "1" }] },
            "b": { "metas": [{ "phx_ref": "2" }] },
        },
        "ref": null,
    });
    ws.send(Message::Text(presence.to_string())).await.unwrap();

    // Keep the socket open until the client leaves.
    while let Some(Ok(_)) = ws.next().await {}
}

#[tokio::test]
async fn ws_feed_joins_and_forwards_changes_and_presence() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let project_id = uuid::Uuid::new_v4();
    let character_id = uuid::Uuid::new_v4();
    let server = tokio::spawn(scripted_server(listener, project_id, character_id));

    let feed = WsChangeFeed::new(RealtimeClient::new(format!("ws://{addr}")))
        .with_reconnect(ReconnectConfig {
            initial_delay: Duration::from_millis(10),
            ..Default::default()
        })
        .with_heartbeat_interval(Duration::from_secs(60));
    let mut sub = feed.subscribe(request(project_id, "a")).await.unwrap();

    assert_matches!(next(&mut sub).await, FeedMessage::Status(FeedStatus::Subscribed));
    let FeedMessage::Change(change) = next(&mut sub).await else {
        panic!("expected a change");
    };
    assert_eq!(change.uuid_field("id"), Some(character_id));
    assert_matches!(next(&mut sub).await, FeedMessage::Presence { members: 2 });

    sub.close().await;
    let _ = tokio::time::timeout(Duration::from_secs(5), server).await;
}

#[tokio::test]
async fn ws_feed_subscribe_fails_when_server_is_down() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let feed = WsChangeFeed::new(RealtimeClient::new(format!("ws://{addr}")));
    assert!(feed.subscribe(request(uuid::Uuid::new_v4(), "a")).await.is_err());
}
