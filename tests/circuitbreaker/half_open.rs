use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tower_admission_circuitbreaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use tower_admission_core::RejectionReason;

fn breaker(success_threshold: usize, half_open_max_calls: usize) -> CircuitBreaker {
    CircuitBreakerConfig::builder()
        .name("half-open")
        .failure_threshold(2)
        .recovery_timeout(Duration::from_secs(5))
        .success_threshold(success_threshold)
        .half_open_max_calls(half_open_max_calls)
        .build()
        .unwrap()
}

async fn trip(breaker: &CircuitBreaker) {
    for _ in 0..2 {
        let _ = breaker.call(|| async { Err::<(), _>("down") }).await;
    }
    assert_eq!(breaker.state(), CircuitState::Open);
}

/// The circuit stays open until the recovery timeout has passed.
#[tokio::test(start_paused = true)]
async fn waits_for_recovery_timeout() {
    let breaker = breaker(1, 1);
    trip(&breaker).await;

    tokio::time::advance(Duration::from_millis(4_900)).await;
    let err = breaker
        .call(|| async { Ok::<_, &str>(()) })
        .await
        .unwrap_err();
    assert!(err.is_circuit_open());

    tokio::time::advance(Duration::from_millis(100)).await;
    let result = breaker.call(|| async { Ok::<_, &str>("probe") }).await;
    assert_eq!(result.unwrap(), "probe");
    assert_eq!(breaker.state(), CircuitState::Closed);
}

/// Consecutive probe successes close the circuit.
#[tokio::test(start_paused = true)]
async fn closes_after_success_threshold() {
    let breaker = breaker(3, 1);
    trip(&breaker).await;
    tokio::time::advance(Duration::from_secs(5)).await;

    for expected in [CircuitState::HalfOpen, CircuitState::HalfOpen, CircuitState::Closed] {
        breaker
            .call(|| async { Ok::<_, &str>(()) })
            .await
            .unwrap();
        assert_eq!(breaker.state(), expected);
    }
    assert_eq!(breaker.metrics().consecutive_failures, 0);
}

/// Any probe failure reopens the circuit and restarts the recovery wait.
#[tokio::test(start_paused = true)]
async fn probe_failure_reopens() {
    let breaker = breaker(2, 1);
    trip(&breaker).await;
    tokio::time::advance(Duration::from_secs(5)).await;

    breaker.call(|| async { Ok::<_, &str>(()) }).await.unwrap();
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    let _ = breaker.call(|| async { Err::<(), _>("still down") }).await;
    assert_eq!(breaker.state(), CircuitState::Open);

    tokio::time::advance(Duration::from_secs(4)).await;
    assert!(!breaker.can_execute());
}

/// Half-open admits at most `half_open_max_calls` concurrent probes.
#[tokio::test(start_paused = true)]
async fn probe_slots_are_bounded() {
    let breaker = Arc::new(breaker(1, 1));
    trip(&breaker).await;
    tokio::time::advance(Duration::from_secs(5)).await;

    let (release_tx, release_rx) = oneshot::channel::<()>();
    let (started_tx, started_rx) = oneshot::channel::<()>();
    let probe = {
        let breaker = Arc::clone(&breaker);
        tokio::spawn(async move {
            breaker
                .call(|| async move {
                    let _ = started_tx.send(());
                    let _ = release_rx.await;
                    Ok::<_, &str>(())
                })
                .await
        })
    };
    started_rx.await.unwrap();

    let err = breaker
        .call(|| async { Ok::<_, &str>(()) })
        .await
        .unwrap_err();
    assert_eq!(
        err.rejection().unwrap().reason(),
        RejectionReason::HalfOpenRejection
    );

    release_tx.send(()).unwrap();
    probe.await.unwrap().unwrap();
    assert_eq!(breaker.state(), CircuitState::Closed);
}

/// A cancelled probe gives its slot back.
#[tokio::test(start_paused = true)]
async fn dropped_probe_returns_slot() {
    let breaker = breaker(1, 1);
    trip(&breaker).await;
    tokio::time::advance(Duration::from_secs(5)).await;

    {
        let pending = breaker.call(|| std::future::pending::<Result<(), &str>>());
        let timed_out = tokio::time::timeout(Duration::from_millis(10), pending).await;
        assert!(timed_out.is_err());
    }

    assert_eq!(breaker.metrics().half_open_calls, 0);
    breaker.call(|| async { Ok::<_, &str>(()) }).await.unwrap();
    assert_eq!(breaker.state(), CircuitState::Closed);
}

/// Every transition is published in order.
#[tokio::test(start_paused = true)]
async fn transitions_are_published() {
    let transitions = Arc::new(Mutex::new(Vec::new()));
    let t = Arc::clone(&transitions);
    let breaker = CircuitBreakerConfig::builder()
        .failure_threshold(1)
        .recovery_timeout(Duration::from_secs(1))
        .success_threshold(1)
        .on_state_transition(move |from, to| t.lock().unwrap().push((from, to)))
        .build()
        .unwrap();

    let _ = breaker.call(|| async { Err::<(), _>("x") }).await;
    tokio::time::advance(Duration::from_secs(1)).await;
    breaker.call(|| async { Ok::<_, &str>(()) }).await.unwrap();

    assert_eq!(
        *transitions.lock().unwrap(),
        vec![
            (CircuitState::Closed, CircuitState::Open),
            (CircuitState::Open, CircuitState::HalfOpen),
            (CircuitState::HalfOpen, CircuitState::Closed),
        ]
    );
}
