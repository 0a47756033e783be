//! Transport loss, exponential backoff and resubscription.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use shared_bus::{BrokerConfig, ChannelKind, PubSubBroker};

use crate::fixtures::{collector, wait_for, TestCluster};

#[tokio::test]
async fn test_backoff_grows_and_resets() {
    let cluster = TestCluster::new();
    let transport = Arc::new(cluster.hub.connect());
    let config = BrokerConfig {
        initial_backoff: Duration::from_millis(5),
        backoff_multiplier: 2.0,
        max_backoff: Duration::from_millis(20),
        ..BrokerConfig::for_testing()
    };
    let broker = PubSubBroker::new("flaky", transport.clone(), config);
    let (seen, handler) = collector();
    broker.subscribe("alerts", handler, ChannelKind::Exact).await;

    // Receives fail until the hub comes back.
    cluster.hub.set_available(false);
    broker.start_listening();
    assert!(wait_for(|| broker.stats().transport_errors >= 4).await);
    assert_eq!(broker.stats().current_backoff_ms, 20);

    cluster.hub.set_available(true);
    assert!(wait_for(|| broker.stats().reconnects >= 1 && broker.stats().current_backoff_ms == 5).await);

    // Subscriptions were re-issued on the new connection.
    let publisher = cluster.node("publisher");
    assert!(wait_for(|| transport.subscription_count() == 1).await);
    publisher
        .broker
        .publish_event("alerts", "alert", json!({"level": "high"}))
        .await;
    assert!(wait_for(|| seen.lock().len() == 1).await);

    broker.stop_listening().await;
}

#[tokio::test]
async fn test_publish_fails_while_hub_down() {
    let cluster = TestCluster::new();
    let node = cluster.node("n");

    cluster.hub.set_available(false);
    assert!(!node.broker.publish_event("alerts", "alert", json!({})).await);
    assert_eq!(node.broker.stats().publish_failures, 1);

    cluster.hub.set_available(true);
    assert!(node.broker.publish_event("alerts", "alert", json!({})).await);
    assert_eq!(node.broker.stats().published, 1);
}

#[tokio::test]
async fn test_injected_receive_failures_recover() {
    let cluster = TestCluster::new();
    let transport = Arc::new(cluster.hub.connect());
    let broker = PubSubBroker::new("n", transport.clone(), BrokerConfig::for_testing());
    let (seen, handler) = collector();
    broker.subscribe("jobs", handler, ChannelKind::Exact).await;

    transport.inject_failures(2);
    broker.start_listening();
    assert!(wait_for(|| broker.stats().reconnects >= 2).await);

    let publisher = cluster.node("publisher");
    assert!(wait_for(|| transport.subscription_count() == 1).await);
    publisher.broker.publish_event("jobs", "job", json!({"id": 1})).await;
    assert!(wait_for(|| seen.lock().len() == 1).await);

    broker.stop_listening().await;
}
