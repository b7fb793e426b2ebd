use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower_admission_bulkhead::Bulkhead;
use tower_admission_core::RejectionReason;

/// A waiter gives up after the configured timeout.
#[tokio::test(start_paused = true)]
async fn waiter_times_out() {
    let bulkhead = Bulkhead::builder()
        .max_concurrent(1)
        .max_waiting(1)
        .timeout(Some(Duration::from_millis(200)))
        .build()
        .unwrap();
    let _held = bulkhead.acquire().await.unwrap();

    let started = tokio::time::Instant::now();
    let err = bulkhead.acquire().await.unwrap_err();

    assert_eq!(err.reason(), RejectionReason::WaitTimeout);
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(bulkhead.waiting_count(), 0);
    assert_eq!(bulkhead.metrics().rejected_requests, 1);
}

/// A per-call timeout overrides the configured one.
#[tokio::test(start_paused = true)]
async fn call_timeout_overrides_config() {
    let bulkhead = Bulkhead::builder()
        .max_concurrent(1)
        .max_waiting(1)
        .timeout(Some(Duration::from_secs(60)))
        .build()
        .unwrap();
    assert!(bulkhead.try_acquire(None).await);

    let started = tokio::time::Instant::now();
    assert!(!bulkhead.try_acquire(Some(Duration::from_millis(50))).await);
    assert!(started.elapsed() < Duration::from_secs(1));
}

/// The waiting line is bounded; arrivals past it are turned away.
#[tokio::test(start_paused = true)]
async fn waiting_line_is_bounded() {
    let bulkhead = Bulkhead::builder()
        .max_concurrent(1)
        .max_waiting(2)
        .build()
        .unwrap();
    let held = bulkhead.acquire().await.unwrap();

    let waiters: Vec<_> = (0..2)
        .map(|_| {
            let bulkhead = bulkhead.clone();
            tokio::spawn(async move { bulkhead.acquire().await.map(|permit| permit.release()) })
        })
        .collect();
    while bulkhead.waiting_count() < 2 {
        tokio::task::yield_now().await;
    }

    let err = bulkhead.acquire().await.unwrap_err();
    assert_eq!(err.reason(), RejectionReason::QueueFull);

    held.release();
    for waiter in waiters {
        waiter.await.unwrap().unwrap();
    }
    assert_eq!(bulkhead.active_count(), 0);
}

/// Waiters already queued for a slot are admitted in the order they queued.
#[tokio::test(start_paused = true)]
async fn waiters_are_served_in_order() {
    let bulkhead = Bulkhead::builder()
        .max_concurrent(1)
        .max_waiting(10)
        .build()
        .unwrap();
    let held = bulkhead.acquire().await.unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut waiters = Vec::new();
    for i in 0..4 {
        let waiter = bulkhead.clone();
        let order = Arc::clone(&order);
        waiters.push(tokio::spawn(async move {
            let permit = waiter.acquire().await.unwrap();
            order.lock().unwrap().push(i);
            permit.release();
        }));
        while bulkhead.waiting_count() <= i {
            tokio::task::yield_now().await;
        }
    }

    held.release();
    for waiter in waiters {
        waiter.await.unwrap();
    }
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
}

/// A cancelled waiter leaves the line without taking a slot.
#[tokio::test(start_paused = true)]
async fn cancelled_waiter_leaves_line() {
    let bulkhead = Bulkhead::builder()
        .max_concurrent(1)
        .max_waiting(1)
        .build()
        .unwrap();
    let held = bulkhead.acquire().await.unwrap();

    let waiter = {
        let bulkhead = bulkhead.clone();
        tokio::spawn(async move { bulkhead.acquire().await.is_ok() })
    };
    while bulkhead.waiting_count() == 0 {
        tokio::task::yield_now().await;
    }
    waiter.abort();
    let _ = waiter.await;

    assert_eq!(bulkhead.waiting_count(), 0);
    held.release();
    assert_eq!(bulkhead.active_count(), 0);
    assert_eq!(bulkhead.available_slots(), 1);
}
