//! Property tests for the backpressure manager.
//!
//! Invariants tested:
//! - Pending never exceeds max_pending
//! - Activation happens when pending reaches the high water mark
//! - Deactivation happens only once pending drains to the low water mark
//! - Extra releases never drive pending below zero

use proptest::prelude::*;
use std::time::Duration;
use tokio::runtime::Builder;
use tower_admission_backpressure::BackpressureManager;

/// A sequence step: `true` acquires, `false` releases.
fn steps() -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(any::<bool>(), 1..300)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    /// Property: a model of the watermark state machine agrees with the manager
    #[test]
    fn matches_watermark_model(
        max_pending in 1usize..=50,
        high_pct in 0u32..=100,
        low_pct in 0u32..=100,
        ops in steps(),
    ) {
        let high = (max_pending as u32 * high_pct / 100) as usize;
        let low = (high as u32 * low_pct / 100) as usize;

        let rt = Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();
        rt.block_on(async {
            let manager = BackpressureManager::builder()
                .max_pending(max_pending)
                .high_water_mark(high)
                .low_water_mark(low)
                .acquire_timeout(Some(Duration::from_millis(1)))
                .build()
                .unwrap();

            let mut pending = 0usize;
            let mut active = false;
            for acquire in ops {
                if acquire {
                    let admitted = manager.acquire(None).await;
                    let expected = pending < max_pending && !active;
                    prop_assert_eq!(admitted, expected);
                    if expected {
                        pending += 1;
                        if pending >= high {
                            active = true;
                        }
                    }
                } else {
                    manager.release();
                    if pending > 0 {
                        pending -= 1;
                        if active && pending <= low {
                            active = false;
                        }
                    }
                }

                prop_assert_eq!(manager.pending_count(), pending);
                prop_assert_eq!(manager.is_backpressure_active(), active);
                prop_assert!(manager.pending_count() <= max_pending);
            }

            let stats = manager.stats();
            prop_assert_eq!(stats.pending, pending);
            prop_assert!(stats.utilization <= 100.0);

            Ok(())
        })?;
    }
}

/// The 100/80/20 scenario: the 80th item activates, later arrivals wait, and
/// draining to 20 lets them through again.
#[test]
fn watermark_scenario_100_80_20() {
    let rt = Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap();
    rt.block_on(async {
        let manager = BackpressureManager::builder()
            .max_pending(100)
            .high_water_mark(80)
            .low_water_mark(20)
            .acquire_timeout(Some(Duration::from_millis(10)))
            .build()
            .unwrap();

        for n in 1..=80 {
            assert!(manager.acquire(None).await);
            assert_eq!(manager.is_backpressure_active(), n >= 80);
        }
        assert!(!manager.acquire(None).await);

        for _ in 0..60 {
            manager.release();
        }
        assert_eq!(manager.pending_count(), 20);
        assert!(!manager.is_backpressure_active());
        assert!(manager.acquire(None).await);
    });
}
