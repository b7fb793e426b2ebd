use futures::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::{Layer, ServiceExt};
use tower_admission_adaptive::{AdaptiveConcurrencyLimiter, AdaptiveLimiterConfig};
use tower_admission_core::RejectionReason;

fn limiter(limit: usize) -> AdaptiveConcurrencyLimiter {
    AdaptiveConcurrencyLimiter::builder()
        .initial_limit(limit)
        .min_limit(1)
        .max_limit(limit.max(10))
        .build()
        .unwrap()
}

/// Callers past the limit are rejected immediately.
#[test]
fn rejects_at_limit() {
    let limiter = limiter(2);
    let a = limiter.try_acquire().unwrap();
    let _b = limiter.try_acquire().unwrap();

    let err = limiter.try_acquire().unwrap_err();
    assert_eq!(err.reason(), RejectionReason::LimitReached);
    assert_eq!(limiter.stats().rejected_requests, 1);

    a.success();
    assert!(limiter.try_acquire().is_ok());
}

/// A permit dropped without a report counts as a failure.
#[test]
fn dropped_permit_reports_failure() {
    let limiter = limiter(5);
    drop(limiter.try_acquire().unwrap());

    let stats = limiter.stats();
    assert_eq!(stats.active, 0);
    assert_eq!(stats.total_failures, 1);
}

/// Extra releases never drive the in-flight count negative.
#[test]
fn unbalanced_release_is_ignored() {
    let limiter = limiter(5);
    limiter.release(true);
    assert_eq!(limiter.active_count(), 0);
    assert_eq!(limiter.stats().total_successes, 0);
}

/// In-flight work stays within the limit under parallel load.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn in_flight_never_exceeds_limit() {
    let limiter = limiter(4);
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let tasks = (0..50).map(|_| {
        let limiter = limiter.clone();
        let current = Arc::clone(&current);
        let peak = Arc::clone(&peak);
        tokio::spawn(async move {
            limiter
                .execute(|| async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, std::io::Error>(())
                })
                .await
        })
    });
    let results = join_all(tasks).await;

    let admitted = results
        .into_iter()
        .map(|joined| joined.unwrap())
        .filter(Result::is_ok)
        .count();
    assert!(admitted >= 1);
    assert!(peak.load(Ordering::SeqCst) <= 4);

    let stats = limiter.stats();
    assert_eq!(stats.active, 0);
    assert_eq!(stats.total_requests, admitted as u64);
    assert_eq!(stats.total_requests + stats.rejected_requests, 50);
}

/// The layer reports service outcomes to the limiter.
#[tokio::test]
async fn layer_reports_outcomes() {
    let layer = AdaptiveLimiterConfig::builder()
        .initial_limit(5)
        .min_limit(1)
        .measurement_window(4)
        .build_layer()
        .unwrap();
    let limiter = layer.limiter().clone();

    let service = layer.layer(tower::service_fn(|fail: bool| async move {
        if fail {
            Err("backend error")
        } else {
            Ok(())
        }
    }));

    for fail in [true, true, true, false] {
        let _ = service.clone().oneshot(fail).await;
    }

    assert_eq!(limiter.limit(), 4);
    let stats = limiter.stats();
    assert_eq!(stats.total_failures, 3);
    assert_eq!(stats.total_successes, 1);
}
