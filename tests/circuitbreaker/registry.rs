use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower_admission_circuitbreaker::{CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState};

/// Breakers with the same name are shared; different names are independent.
#[tokio::test]
async fn names_identify_breakers() {
    let registry = CircuitBreakerRegistry::with_template(
        CircuitBreakerConfig::builder()
            .failure_threshold(1)
            .recovery_timeout(Duration::from_secs(30))
            .build_config()
            .unwrap(),
    );

    let payments = registry.get_or_create("payments");
    let again = registry.get_or_create("payments");
    let search = registry.get_or_create("search");
    assert!(Arc::ptr_eq(&payments, &again));
    assert_eq!(payments.name(), "payments");
    assert_eq!(payments.config().failure_threshold(), 1);

    let _ = payments.call(|| async { Err::<(), _>("down") }).await;

    assert_eq!(registry.open_circuits(), vec!["payments".to_string()]);
    assert_eq!(search.state(), CircuitState::Closed);
    assert_eq!(registry.names(), vec!["payments", "search"]);
}

/// Metrics are reported per breaker and reset together.
#[tokio::test]
async fn all_metrics_and_reset_all() {
    let registry = CircuitBreakerRegistry::new();
    let a = registry.get_or_create("a");
    let b = registry.get_or_create("b");
    a.force_open();
    b.on_success();

    let metrics = registry.all_metrics();
    assert_eq!(metrics["a"].state, CircuitState::Open);
    assert_eq!(metrics["b"].successful_requests, 1);

    registry.reset_all();
    assert!(registry.open_circuits().is_empty());
    assert_eq!(registry.all_metrics()["b"].total_requests, 0);
}

/// Listeners in the template fire for every breaker created from it.
#[tokio::test]
async fn template_listeners_are_shared() {
    let opened = Arc::new(AtomicUsize::new(0));
    let o = Arc::clone(&opened);
    let registry = CircuitBreakerRegistry::with_template(
        CircuitBreakerConfig::builder()
            .failure_threshold(1)
            .on_state_transition(move |_, to| {
                if to == CircuitState::Open {
                    o.fetch_add(1, Ordering::SeqCst);
                }
            })
            .build_config()
            .unwrap(),
    );

    registry.get_or_create("one").on_failure();
    registry.get_or_create("two").on_failure();
    assert_eq!(opened.load(Ordering::SeqCst), 2);

    assert!(registry.remove("one").is_some());
    assert!(registry.get("one").is_none());
}
