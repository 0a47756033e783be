//! Coordination benchmarks over the in-memory backends.
//!
//! ```bash
//! cargo bench -p cl-tests
//! ```

use std::time::Duration;

use cl_01_distributed_locks::LockApi;
use cl_02_message_ordering::MessageOrderingApi;
use cl_tests::fixtures::TestCluster;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use serde_json::json;
use shared_types::Envelope;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime")
}

fn bench_ordering(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("ordering");

    group.bench_function("enqueue_dequeue_complete_100", |b| {
        b.iter_batched(
            || TestCluster::new().node("bench"),
            |node| {
                rt.block_on(async {
                    for i in 0..100 {
                        let envelope = Envelope::new("bench", "tick", json!({"i": i}));
                        let message = node.ordering.prepare(envelope, format!("p{}", i % 8));
                        node.ordering.enqueue_message(message).await.expect("enqueue");
                    }
                    for _ in 0..100 {
                        let mut message =
                            node.ordering.dequeue_message().await.expect("queued");
                        node.ordering
                            .mark_message_processed(&mut message)
                            .await
                            .expect("complete");
                    }
                })
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

fn bench_locks(c: &mut Criterion) {
    let rt = runtime();
    let cluster = TestCluster::new();
    let node = cluster.node("bench");

    c.bench_function("locks/acquire_release", |b| {
        b.iter(|| {
            rt.block_on(async {
                let lock = node
                    .locks
                    .acquire_lock("bench", "bench", Duration::from_secs(5), Duration::ZERO)
                    .await
                    .expect("acquire");
                node.locks.release_lock(&lock).await.expect("release");
            })
        });
    });
}

criterion_group!(benches, bench_ordering, bench_locks);
criterion_main!(benches);
