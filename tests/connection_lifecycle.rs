//! Integration tests for subscription cleanup across the connection lifecycle.

mod common;

use common::TestServer;
use entwatch_proto::ServerFrame;
use std::time::Duration;

#[tokio::test]
async fn test_closing_connection_purges_its_subscriptions() {
    let server = TestServer::spawn().await.expect("Failed to spawn test server");
    let mut leaving = server.connect().await.unwrap();
    let mut staying = server.connect().await.unwrap();

    leaving.subscribe("a", "User", "1", None).await.unwrap();
    leaving.recv().await.unwrap();
    leaving.subscribe("b", "Order", "9", None).await.unwrap();
    leaving.recv().await.unwrap();
    staying.subscribe("c", "User", "1", None).await.unwrap();
    staying.recv().await.unwrap();
    server.wait_for_subscriptions(3).await.unwrap();

    leaving.close().await.unwrap();
    server.wait_for_subscriptions(1).await.unwrap();

    server
        .store()
        .insert("User", "1", serde_json::json!({"id": "1"}));
    match staying.recv().await.unwrap() {
        ServerFrame::EntityAdded { .. } => {}
        other => panic!("Expected entity-added, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_unsubscribe_stops_notifications() {
    let server = TestServer::spawn().await.expect("Failed to spawn test server");
    let mut client = server.connect().await.unwrap();

    client.subscribe("a", "User", "1", None).await.unwrap();
    let subscription_id = match client.recv().await.unwrap() {
        ServerFrame::Subscribed {
            subscription_id, ..
        } => subscription_id,
        other => panic!("Expected subscribed, got: {:?}", other),
    };

    client.unsubscribe(&subscription_id).await.unwrap();
    server.wait_for_subscriptions(0).await.unwrap();

    // Unknown and repeated ids are ignored without closing the connection.
    client.unsubscribe(&subscription_id).await.unwrap();
    client.unsubscribe("no-such-id").await.unwrap();

    server
        .store()
        .insert("User", "1", serde_json::json!({"id": "1"}));
    client
        .expect_silence(Duration::from_millis(200))
        .await
        .unwrap();

    client.subscribe("b", "User", "1", None).await.unwrap();
    match client.recv().await.unwrap() {
        ServerFrame::Subscribed { request_id, .. } => assert_eq!(request_id, "b"),
        other => panic!("Expected subscribed, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_duplicate_subscriptions_each_get_notified() {
    let server = TestServer::spawn().await.expect("Failed to spawn test server");
    let mut client = server.connect().await.unwrap();

    client.subscribe("a", "User", "1", None).await.unwrap();
    client.recv().await.unwrap();
    client.subscribe("b", "User", "1", None).await.unwrap();
    client.recv().await.unwrap();
    server.wait_for_subscriptions(2).await.unwrap();

    server
        .store()
        .insert("User", "1", serde_json::json!({"id": "1"}));
    for _ in 0..2 {
        match client.recv().await.unwrap() {
            ServerFrame::EntityAdded { version, .. } => assert_eq!(version.seq, 1),
            other => panic!("Expected entity-added, got: {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_dispose_drops_every_subscription() {
    let server = TestServer::spawn().await.expect("Failed to spawn test server");
    let mut client = server.connect().await.unwrap();

    client.subscribe("a", "User", "1", None).await.unwrap();
    client.recv().await.unwrap();
    server.wait_for_subscriptions(1).await.unwrap();

    server.manager().dispose().unwrap();
    assert_eq!(server.manager().active_subscription_count(), 0);
    assert!(server.manager().model_names().is_empty());
    assert_eq!(server.store().observer_count(), 0);

    server
        .store()
        .insert("User", "1", serde_json::json!({"id": "1"}));
    client
        .expect_silence(Duration::from_millis(200))
        .await
        .unwrap();
}
