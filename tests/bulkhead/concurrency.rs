use futures::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::{Layer, Service, ServiceExt};
use tower_admission_bulkhead::{Bulkhead, BulkheadConfig};
use tower_admission_core::RejectionReason;

/// Concurrent calls never exceed `max_concurrent`; the overflow waits its turn.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cap_holds_under_parallel_load() {
    let bulkhead = Bulkhead::builder()
        .name("db")
        .max_concurrent(3)
        .max_waiting(50)
        .build()
        .unwrap();

    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let tasks = (0..20).map(|_| {
        let bulkhead = bulkhead.clone();
        let current = Arc::clone(&current);
        let peak = Arc::clone(&peak);
        tokio::spawn(async move {
            bulkhead
                .execute(|| async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, std::io::Error>(())
                })
                .await
        })
    });

    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 3);
    let metrics = bulkhead.metrics();
    assert_eq!(metrics.successful_requests, 20);
    assert_eq!(metrics.current_active, 0);
    assert!(metrics.peak_active <= 3);
    assert_eq!(bulkhead.available_slots(), 3);
}

/// Without a waiting line, a full bulkhead rejects at once.
#[tokio::test]
async fn no_waiting_line_rejects_immediately() {
    let bulkhead = Bulkhead::builder().max_concurrent(2).build().unwrap();

    let first = bulkhead.acquire().await.unwrap();
    let _second = bulkhead.acquire().await.unwrap();
    assert!(bulkhead.is_full());

    let err = bulkhead.acquire().await.unwrap_err();
    assert_eq!(err.reason(), RejectionReason::CapacityFull);

    first.release();
    assert!(!bulkhead.is_full());
    assert!(bulkhead.acquire().await.is_ok());
}

/// Slots taken with `try_acquire` are returned with `release`; extra releases are ignored.
#[tokio::test]
async fn manual_slots_balance() {
    let bulkhead = Bulkhead::builder().max_concurrent(1).build().unwrap();

    assert!(bulkhead.try_acquire(None).await);
    assert!(!bulkhead.try_acquire(None).await);
    assert_eq!(bulkhead.active_count(), 1);

    bulkhead.release();
    bulkhead.release();
    bulkhead.release();

    assert_eq!(bulkhead.active_count(), 0);
    assert_eq!(bulkhead.available_slots(), 1);
}

/// The layer rejects overflow with the bulkhead's reason.
#[tokio::test]
async fn layer_rejects_when_full() {
    let layer = BulkheadConfig::builder()
        .name("render")
        .max_concurrent(1)
        .build_layer()
        .unwrap();
    let bulkhead = layer.bulkhead().clone();

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let rx = Arc::new(tokio::sync::Mutex::new(Some(rx)));
    let mut service = layer.layer(tower::service_fn(move |block: bool| {
        let rx = Arc::clone(&rx);
        async move {
            if block {
                if let Some(rx) = rx.lock().await.take() {
                    let _ = rx.await;
                }
            }
            Ok::<_, std::io::Error>("done")
        }
    }));

    let blocked = tokio::spawn(service.clone().oneshot(true));
    while bulkhead.active_count() == 0 {
        tokio::task::yield_now().await;
    }

    let err = service.ready().await.unwrap().call(false).await.unwrap_err();
    assert!(err.is_rejected());
    assert_eq!(err.rejection().unwrap().pattern_name(), "render");

    tx.send(()).unwrap();
    assert_eq!(blocked.await.unwrap().unwrap(), "done");
    assert_eq!(service.oneshot(false).await.unwrap(), "done");
}
