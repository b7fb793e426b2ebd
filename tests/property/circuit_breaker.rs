//! Property tests for the circuit breaker.
//!
//! Invariants tested:
//! - Opens on exactly the threshold-th consecutive failure
//! - Recorded successes and failures always add up to the total
//! - Open circuits never run the operation

use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tower_admission_circuitbreaker::{CircuitBreakerConfig, CircuitState};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    /// Property: the circuit opens exactly when the failure streak reaches the threshold
    #[test]
    fn opens_exactly_at_threshold(threshold in 1usize..=20) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let breaker = CircuitBreakerConfig::builder()
                .failure_threshold(threshold)
                .recovery_timeout(Duration::from_secs(60))
                .build()
                .unwrap();

            for i in 1..=threshold {
                prop_assert_eq!(breaker.state(), CircuitState::Closed);
                let _ = breaker.call(|| async { Err::<(), _>("fail") }).await;
                prop_assert_eq!(breaker.metrics().consecutive_failures, i);
            }
            prop_assert_eq!(breaker.state(), CircuitState::Open);

            Ok(())
        })?;
    }

    /// Property: successful + failed == total, and rejections are tracked apart
    #[test]
    fn counters_are_consistent(outcomes in prop::collection::vec(any::<bool>(), 1..100)) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let runs = Arc::new(AtomicUsize::new(0));
            let breaker = CircuitBreakerConfig::builder()
                .failure_threshold(3)
                .recovery_timeout(Duration::from_secs(60))
                .build()
                .unwrap();

            for ok in &outcomes {
                let ok = *ok;
                let runs = Arc::clone(&runs);
                let _ = breaker
                    .call(|| async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        if ok { Ok(()) } else { Err("fail") }
                    })
                    .await;
            }

            let metrics = breaker.metrics();
            prop_assert_eq!(
                metrics.successful_requests + metrics.failed_requests,
                metrics.total_requests
            );
            prop_assert_eq!(metrics.total_requests, runs.load(Ordering::SeqCst) as u64);
            prop_assert_eq!(
                metrics.total_requests + metrics.rejected_requests,
                outcomes.len() as u64
            );

            Ok(())
        })?;
    }

    /// Property: once open, a burst of calls never reaches the operation
    #[test]
    fn open_circuit_never_runs_operation(burst in 1usize..=50) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let breaker = CircuitBreakerConfig::builder()
                .failure_threshold(1)
                .recovery_timeout(Duration::from_secs(60))
                .build()
                .unwrap();
            breaker.force_open();

            let runs = Arc::new(AtomicUsize::new(0));
            for _ in 0..burst {
                let runs = Arc::clone(&runs);
                let result = breaker
                    .call(|| async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, &str>(())
                    })
                    .await;
                prop_assert!(result.is_err());
            }
            prop_assert_eq!(runs.load(Ordering::SeqCst), 0);
            prop_assert_eq!(breaker.metrics().rejected_requests, burst as u64);

            Ok(())
        })?;
    }
}
