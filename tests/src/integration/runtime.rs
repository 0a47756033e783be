//! Runtime lifecycle over a shared cluster.

use coordination_runtime::CoordinationRuntime;
use serde_json::json;
use shared_bus::ChannelKind;

use crate::fixtures::{collector, wait_for, TestCluster};

#[tokio::test]
async fn test_two_runtimes_exchange_messages() {
    let cluster = TestCluster::new();
    let a = CoordinationRuntime::new(cluster.node("a"));
    let b = CoordinationRuntime::new(cluster.node("b"));

    let (seen, handler) = collector();
    b.context()
        .broker
        .subscribe("lock:released:*", handler, ChannelKind::Pattern)
        .await;

    a.start();
    b.start();

    a.context()
        .broker
        .publish_event("lock:released:report", "lock_released", json!({"resource": "report"}))
        .await;
    assert!(wait_for(|| seen.lock().len() == 1).await);
    assert_eq!(seen.lock()[0].source, "a");

    a.shutdown().await;
    b.shutdown().await;
    assert!(!a.context().broker.is_listening());
    assert_eq!(b.task_count(), 0);
}
