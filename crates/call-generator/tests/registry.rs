//! Counter exactness and completion signalling under concurrency

use std::sync::Arc;
use std::time::Duration;

use callgen_core::RunRegistry;

async fn hammer(tasks: usize, per_task: u64) -> Arc<RunRegistry> {
    let registry = Arc::new(RunRegistry::with_console(std::io::sink()));
    let handles: Vec<_> = (0..tasks)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move {
                for _ in 0..per_task {
                    registry.increment_attempts();
                    registry.increment_established();
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }
    registry
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn counters_exact_with_one_incrementer() {
    let registry = hammer(1, 1000).await;
    assert_eq!(registry.attempts(), 1000);
    assert_eq!(registry.established(), 1000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn counters_exact_with_ten_incrementers() {
    let registry = hammer(10, 1000).await;
    assert_eq!(registry.attempts(), 10_000);
    assert_eq!(registry.established(), 10_000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn counters_exact_with_hundred_incrementers() {
    let registry = hammer(100, 1000).await;
    assert_eq!(registry.attempts(), 100_000);
    assert_eq!(registry.established(), 100_000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn returned_totals_are_unique() {
    let registry = Arc::new(RunRegistry::with_console(std::io::sink()));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move { (0..500).map(|_| registry.increment_attempts()).collect::<Vec<u64>>() })
        })
        .collect();

    let mut seen = Vec::new();
    for handle in handles {
        seen.extend(handle.await.unwrap());
    }
    seen.sort_unstable();
    let expected: Vec<u64> = (1..=4000).collect();
    assert_eq!(seen, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn finish_signal_wakes_waiting_driver() {
    let registry = Arc::new(RunRegistry::with_console(std::io::sink()));
    let waiter = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.wait_worker_finished().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    registry.worker_finished();
    tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("driver should wake")
        .unwrap();
}
