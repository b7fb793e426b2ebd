use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower_admission_circuitbreaker::{CircuitBreakerConfig, CircuitState};
use tower_admission_core::RejectionReason;

async fn fail(breaker: &tower_admission_circuitbreaker::CircuitBreaker) {
    let _ = breaker.call(|| async { Err::<(), _>("boom") }).await;
}

async fn succeed(breaker: &tower_admission_circuitbreaker::CircuitBreaker) {
    let _ = breaker.call(|| async { Ok::<_, &str>(()) }).await;
}

/// The breaker opens on exactly the threshold-th consecutive failure.
#[tokio::test]
async fn opens_exactly_at_threshold() {
    let breaker = CircuitBreakerConfig::builder()
        .name("exact")
        .failure_threshold(3)
        .build()
        .unwrap();

    fail(&breaker).await;
    fail(&breaker).await;
    assert_eq!(breaker.state(), CircuitState::Closed);

    fail(&breaker).await;
    assert_eq!(breaker.state(), CircuitState::Open);
}

/// A success in closed state resets the failure streak.
#[tokio::test]
async fn success_resets_streak() {
    let breaker = CircuitBreakerConfig::builder()
        .failure_threshold(3)
        .build()
        .unwrap();

    fail(&breaker).await;
    fail(&breaker).await;
    succeed(&breaker).await;
    fail(&breaker).await;
    fail(&breaker).await;

    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.metrics().consecutive_failures, 2);
}

/// Open circuits reject without running the operation.
#[tokio::test]
async fn open_circuit_does_not_run_operation() {
    let breaker = CircuitBreakerConfig::builder()
        .name("inventory")
        .failure_threshold(1)
        .build()
        .unwrap();
    fail(&breaker).await;

    let runs = Arc::new(AtomicUsize::new(0));
    let r = Arc::clone(&runs);
    let err = breaker
        .call(|| async move {
            r.fetch_add(1, Ordering::SeqCst);
            Ok::<_, &str>(())
        })
        .await
        .unwrap_err();

    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert!(err.is_circuit_open());
    let rejection = err.rejection().unwrap();
    assert_eq!(rejection.reason(), RejectionReason::CircuitOpen);
    assert_eq!(rejection.pattern_name(), "inventory");
    assert_eq!(breaker.metrics().rejected_requests, 1);
}

/// Rejections are counted separately from recorded outcomes.
#[tokio::test]
async fn counters_stay_consistent() {
    let breaker = CircuitBreakerConfig::builder()
        .failure_threshold(2)
        .build()
        .unwrap();

    succeed(&breaker).await;
    fail(&breaker).await;
    fail(&breaker).await;
    fail(&breaker).await;
    fail(&breaker).await;

    let metrics = breaker.metrics();
    assert_eq!(metrics.total_requests, 3);
    assert_eq!(metrics.successful_requests, 1);
    assert_eq!(metrics.failed_requests, 2);
    assert_eq!(metrics.rejected_requests, 2);
    assert_eq!(
        metrics.successful_requests + metrics.failed_requests,
        metrics.total_requests
    );
}

/// Manual gating drives the same state machine.
#[tokio::test]
async fn manual_gating() {
    let breaker = CircuitBreakerConfig::builder()
        .failure_threshold(2)
        .build()
        .unwrap();

    assert!(breaker.can_execute());
    breaker.on_failure();
    breaker.on_failure();

    assert!(breaker.is_open());
    assert!(!breaker.can_execute());

    breaker.force_closed();
    assert!(breaker.can_execute());
    breaker.on_success();
    assert_eq!(breaker.metrics().consecutive_successes, 1);
}
