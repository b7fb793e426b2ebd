//! Circuit breaker metrics regression tests

use super::helpers::*;
use serial_test::serial;
use tower_admission_circuitbreaker::CircuitBreakerConfig;

#[tokio::test]
#[serial]
async fn circuitbreaker_metrics_exist() {
    init_recorder();

    let breaker = CircuitBreakerConfig::builder()
        .name("metrics_cb")
        .failure_threshold(1)
        .build()
        .unwrap();

    let _ = breaker.call(|| async { Ok::<_, &str>(()) }).await;
    let _ = breaker.call(|| async { Err::<(), _>("fail") }).await;
    let _ = breaker.call(|| async { Ok::<_, &str>(()) }).await;

    assert_counter_exists("circuitbreaker_calls_total");
    assert_metric_has_label("circuitbreaker_calls_total", "circuitbreaker", "metrics_cb");
    assert_metric_has_label("circuitbreaker_calls_total", "outcome", "success");
    assert_metric_has_label("circuitbreaker_calls_total", "outcome", "failure");

    assert_counter_exists("circuitbreaker_transitions_total");
    assert_metric_has_label("circuitbreaker_transitions_total", "from", "closed");
    assert_metric_has_label("circuitbreaker_transitions_total", "to", "open");

    assert_counter_exists("circuitbreaker_rejections_total");
    assert_metric_has_label("circuitbreaker_rejections_total", "reason", "circuit_open");

    assert_gauge_exists("circuitbreaker_state");
    assert_metric_has_label("circuitbreaker_state", "circuitbreaker", "metrics_cb");
}
