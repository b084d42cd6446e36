// Copyright 2025 Cowboy AI, LLC.

//! End-to-end bus scenarios against a live broker
//!
//! These tests require a running NATS server with JetStream enabled:
//! ```bash
//! docker run -d --name nats-test -p 4222:4222 nats:latest -js
//! ```
//! They skip silently when no broker is reachable.

use bytes::Bytes;
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

use cim_identity::pubsub::handler;
use cim_identity::{NatsPubSub, PubSub, PullBasedPubSub};

const NATS_URL: &str = "nats://localhost:4222";

async fn connect_or_skip() -> Option<NatsPubSub> {
    match NatsPubSub::connect(NATS_URL).await {
        Ok(bus) => Some(bus),
        Err(_) => {
            eprintln!("skipping: no NATS server at {NATS_URL}");
            None
        }
    }
}

#[tokio::test]
async fn plain_subscribe_receives_wildcard_matches() {
    let Some(bus) = connect_or_skip().await else {
        return;
    };

    let suffix = Uuid::new_v4().simple().to_string();
    let prefix = format!("tests-{suffix}");

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    bus.subscribe(
        &format!("{prefix}.>"),
        handler(move |msg| {
            let tx = tx.clone();
            async move {
                tx.send((msg.topic.clone(), msg.data.clone())).ok();
                Ok(())
            }
        }),
    )
    .await
    .unwrap();

    // subscription interest must be flushed before the publish
    tokio::time::sleep(Duration::from_millis(100)).await;

    bus.publish(&format!("{prefix}.hello"), Bytes::from_static(b"world"))
        .await
        .unwrap();

    let (topic, data) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no delivery within timeout")
        .expect("channel closed");

    assert_eq!(topic, format!("{prefix}.hello"));
    assert_eq!(data, Bytes::from_static(b"world"));

    bus.close().await.unwrap();
}

#[tokio::test]
async fn durable_pull_consumer_delivers_and_acks() {
    let Some(bus) = connect_or_skip().await else {
        return;
    };

    let suffix = Uuid::new_v4().simple().to_string();
    let stream = format!("TESTS-{suffix}");
    let subject = format!("tests-{suffix}");

    bus.add_stream(&stream, json!({ "subjects": [format!("{subject}.>")] }))
        .await
        .unwrap();
    bus.add_consumer("test-1", &stream, json!({ "ack_policy": "explicit" }))
        .await
        .unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    bus.pull_subscribe(
        "test-1",
        &stream,
        handler(move |msg| {
            let tx = tx.clone();
            async move {
                tx.send(msg.data.clone()).ok();
                Ok(())
            }
        }),
    )
    .await
    .unwrap();

    bus.publish(&format!("{subject}.hello"), Bytes::from_static(b"world"))
        .await
        .unwrap();

    let data = tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("no delivery within timeout")
        .expect("channel closed");
    assert_eq!(data, Bytes::from_static(b"world"));

    bus.close().await.unwrap();
}

#[tokio::test]
async fn resubscribe_replaces_the_fetch_loop_without_double_delivery() {
    let Some(bus) = connect_or_skip().await else {
        return;
    };

    let suffix = Uuid::new_v4().simple().to_string();
    let stream = format!("TESTS-{suffix}");
    let subject = format!("tests-{suffix}");

    bus.add_stream(&stream, json!({ "subjects": [format!("{subject}.>")] }))
        .await
        .unwrap();
    bus.add_consumer("test-1", &stream, json!({ "ack_policy": "explicit" }))
        .await
        .unwrap();

    let (tx1, mut rx1) = tokio::sync::mpsc::unbounded_channel();
    bus.pull_subscribe(
        "test-1",
        &stream,
        handler(move |msg| {
            let tx = tx1.clone();
            async move {
                tx.send(msg.data.clone()).ok();
                Ok(())
            }
        }),
    )
    .await
    .unwrap();

    bus.publish(&format!("{subject}.first"), Bytes::from_static(b"one"))
        .await
        .unwrap();
    let first = tokio::time::timeout(Duration::from_secs(10), rx1.recv())
        .await
        .expect("no delivery within timeout")
        .expect("channel closed");
    assert_eq!(first, Bytes::from_static(b"one"));

    // same (consumer, stream) key: replaces the first loop
    let (tx2, mut rx2) = tokio::sync::mpsc::unbounded_channel();
    bus.pull_subscribe(
        "test-1",
        &stream,
        handler(move |msg| {
            let tx = tx2.clone();
            async move {
                tx.send(msg.data.clone()).ok();
                Ok(())
            }
        }),
    )
    .await
    .unwrap();

    // give the superseded loop time to observe its cancellation
    tokio::time::sleep(Duration::from_millis(200)).await;

    bus.publish(&format!("{subject}.second"), Bytes::from_static(b"two"))
        .await
        .unwrap();

    let second = tokio::time::timeout(Duration::from_secs(10), rx2.recv())
        .await
        .expect("no delivery within timeout")
        .expect("channel closed");
    assert_eq!(second, Bytes::from_static(b"two"));

    // exactly one live fetch loop: the first handler saw nothing more
    assert!(rx1.try_recv().is_err());

    bus.close().await.unwrap();
}
