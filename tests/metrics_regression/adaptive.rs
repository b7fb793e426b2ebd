//! Adaptive limiter metrics regression tests

use super::helpers::*;
use serial_test::serial;
use tower_admission_adaptive::AdaptiveConcurrencyLimiter;

#[tokio::test]
#[serial]
async fn adaptive_metrics_exist() {
    init_recorder();

    let limiter = AdaptiveConcurrencyLimiter::builder()
        .name("metrics_ad")
        .initial_limit(1)
        .min_limit(1)
        .max_limit(4)
        .measurement_window(1)
        .build()
        .unwrap();

    let permit = limiter.try_acquire().unwrap();
    assert!(limiter.try_acquire().is_err());
    permit.success();

    assert_counter_exists("adaptive_requests_total");
    assert_metric_has_label("adaptive_requests_total", "adaptive", "metrics_ad");
    assert_metric_has_label("adaptive_requests_total", "outcome", "success");

    assert_counter_exists("adaptive_rejections_total");
    assert_counter_exists("adaptive_limit_adjustments_total");
    assert_metric_has_label("adaptive_limit_adjustments_total", "direction", "increase");

    assert_gauge_exists("adaptive_concurrency_limit");
    assert_gauge_exists("adaptive_in_flight");
}
