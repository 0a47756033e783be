//! Distributed lock contention across nodes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cl_01_distributed_locks::{LockApi, LockError};

use crate::fixtures::TestCluster;

#[tokio::test]
async fn test_second_node_times_out_while_held() {
    let cluster = TestCluster::new();
    let a = cluster.node("a");
    let b = cluster.node("b");

    let held = a
        .locks
        .acquire_lock("report:daily", "a", Duration::from_secs(5), Duration::ZERO)
        .await
        .unwrap();

    let err = b
        .locks
        .acquire_lock(
            "report:daily",
            "b",
            Duration::from_secs(5),
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LockError::Timeout { .. }));

    a.locks.release_lock(&held).await.unwrap();
    let taken = b
        .locks
        .acquire_lock(
            "report:daily",
            "b",
            Duration::from_secs(5),
            Duration::from_millis(50),
        )
        .await
        .unwrap();
    assert_eq!(taken.owner, "b");
    assert_ne!(taken.token, held.token);
}

#[tokio::test]
async fn test_release_by_other_node_rejected() {
    let cluster = TestCluster::new();
    let a = cluster.node("a");
    let b = cluster.node("b");

    let held = a
        .locks
        .acquire_lock("rebalance", "a", Duration::from_secs(5), Duration::ZERO)
        .await
        .unwrap();

    let mut forged = held.clone();
    forged.token = "not-the-token".to_string();
    assert!(matches!(
        b.locks.release_lock(&forged).await,
        Err(LockError::OwnershipMismatch { .. })
    ));
    assert!(a.locks.is_locked("rebalance").await.unwrap());
    assert_eq!(b.locks.stats().ownership_mismatches, 1);
}

#[tokio::test]
async fn test_waiter_acquires_after_ttl_expiry() {
    let cluster = TestCluster::new();
    let crashed = cluster.node("crashed");
    let waiter = cluster.node("waiter");

    // Never released.
    crashed
        .locks
        .acquire_lock("ingest", "crashed", Duration::from_millis(40), Duration::ZERO)
        .await
        .unwrap();

    let lock = waiter
        .locks
        .acquire_lock(
            "ingest",
            "waiter",
            Duration::from_secs(5),
            Duration::from_millis(500),
        )
        .await
        .unwrap();
    assert_eq!(lock.owner, "waiter");
    let stats = waiter.locks.stats();
    assert!(stats.waited >= 1);
    assert_eq!(stats.contended, 0);
}

#[tokio::test]
async fn test_with_lock_serializes_critical_sections() {
    let cluster = TestCluster::new();
    let inside = Arc::new(AtomicUsize::new(0));
    let max_inside = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for i in 0..4 {
        let node = cluster.node(&format!("worker-{i}"));
        let inside = inside.clone();
        let max_inside = max_inside.clone();
        tasks.push(tokio::spawn(async move {
            let owner = node.node_id().to_string();
            node.locks
                .with_lock(
                    "settlement",
                    &owner,
                    Duration::from_secs(5),
                    Duration::from_secs(2),
                    || async {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        inside.fetch_sub(1, Ordering::SeqCst);
                    },
                )
                .await
        }));
    }

    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(max_inside.load(Ordering::SeqCst), 1);
}
