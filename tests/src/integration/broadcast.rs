//! Cache invalidation broadcast and pattern fan-out.

use std::time::Duration;

use serde_json::json;
use shared_bus::ChannelKind;
use shared_types::channels::ChannelTemplate;

use crate::fixtures::{collector, wait_for, TestCluster};

#[tokio::test]
async fn test_cache_invalidation_reaches_every_node() {
    let cluster = TestCluster::new();
    let writer = cluster.node("writer");
    let readers: Vec<_> = ["reader-1", "reader-2", "reader-3"]
        .into_iter()
        .map(|id| cluster.node(id))
        .collect();

    let wildcard = ChannelTemplate::CACHE_INVALIDATE.wildcard();
    let mut seen = Vec::new();
    for reader in &readers {
        let (log, handler) = collector();
        assert!(reader.broker.subscribe(&wildcard, handler, ChannelKind::Pattern).await);
        assert!(reader.broker.start_listening());
        seen.push(log);
    }

    let channel = ChannelTemplate::CACHE_INVALIDATE
        .render(&[("key", "prices:AAPL")])
        .unwrap();
    assert!(
        writer
            .broker
            .publish_event(&channel, "cache_invalidation", json!({"key": "prices:AAPL"}))
            .await
    );

    assert!(wait_for(|| seen.iter().all(|log| log.lock().len() == 1)).await);
    for log in &seen {
        let delivered = log.lock();
        assert_eq!(delivered[0].channel, channel);
        assert_eq!(delivered[0].source, "writer");
        assert_eq!(delivered[0].message_type, "cache_invalidation");
    }

    for reader in &readers {
        reader.broker.stop_listening().await;
    }
}

#[tokio::test]
async fn test_exact_and_pattern_both_deliver() {
    let cluster = TestCluster::new();
    let publisher = cluster.node("pub");
    let subscriber = cluster.node("sub");

    let (exact, exact_handler) = collector();
    let (pattern, pattern_handler) = collector();
    subscriber
        .broker
        .subscribe("market:update:MSFT", exact_handler, ChannelKind::Exact)
        .await;
    subscriber
        .broker
        .subscribe("market:update:*", pattern_handler, ChannelKind::Pattern)
        .await;
    subscriber.broker.start_listening();

    publisher
        .broker
        .publish_event("market:update:MSFT", "tick", json!({"price": 411.2}))
        .await;
    publisher
        .broker
        .publish_event("market:update:GOOG", "tick", json!({"price": 171.0}))
        .await;

    assert!(wait_for(|| exact.lock().len() == 1 && pattern.lock().len() == 2).await);
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(exact.lock().len(), 1);
    assert_eq!(pattern.lock().len(), 2);

    subscriber.broker.stop_listening().await;
}

#[tokio::test]
async fn test_unsubscribed_node_stops_receiving() {
    let cluster = TestCluster::new();
    let publisher = cluster.node("pub");
    let subscriber = cluster.node("sub");
    let (seen, handler) = collector();

    subscriber
        .broker
        .subscribe("jobs:status:42", handler, ChannelKind::Exact)
        .await;
    subscriber.broker.start_listening();

    publisher
        .broker
        .publish_event("jobs:status:42", "job_status", json!({"state": "running"}))
        .await;
    assert!(wait_for(|| seen.lock().len() == 1).await);

    assert!(subscriber.broker.unsubscribe("jobs:status:42").await);
    publisher
        .broker
        .publish_event("jobs:status:42", "job_status", json!({"state": "done"}))
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(seen.lock().len(), 1);

    subscriber.broker.stop_listening().await;
}
