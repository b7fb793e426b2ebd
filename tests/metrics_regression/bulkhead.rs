//! Bulkhead metrics regression tests

use super::helpers::*;
use serial_test::serial;
use tower_admission_bulkhead::Bulkhead;

#[tokio::test]
#[serial]
async fn bulkhead_metrics_exist() {
    init_recorder();

    let bulkhead = Bulkhead::builder()
        .name("metrics_bh")
        .max_concurrent(1)
        .build()
        .unwrap();

    bulkhead.execute(|| async { Ok::<_, &str>(()) }).await.unwrap();
    let _held = bulkhead.acquire().await.unwrap();
    assert!(bulkhead.acquire().await.is_err());

    assert_counter_exists("bulkhead_calls_permitted_total");
    assert_metric_has_label("bulkhead_calls_permitted_total", "bulkhead", "metrics_bh");

    assert_counter_exists("bulkhead_calls_finished_total");
    assert_metric_has_label("bulkhead_calls_finished_total", "outcome", "success");

    assert_counter_exists("bulkhead_calls_rejected_total");
    assert_metric_has_label("bulkhead_calls_rejected_total", "reason", "capacity_full");

    assert_gauge_exists("bulkhead_concurrent_calls");
    assert_histogram_exists("bulkhead_wait_duration_seconds");
}
