//! Property tests for the bulkhead.
//!
//! Invariants tested:
//! - Concurrent calls never exceed max_concurrent
//! - Every call is either admitted or rejected, and every admitted slot comes back
//! - Extra releases never create capacity

use futures::future::join_all;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tower_admission_bulkhead::Bulkhead;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    /// Property: active calls never exceed the cap
    #[test]
    fn active_never_exceeds_cap(
        max_concurrent in 1usize..=8,
        max_waiting in 0usize..=16,
        calls in 1usize..=40,
    ) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let bulkhead = Bulkhead::builder()
                .max_concurrent(max_concurrent)
                .max_waiting(max_waiting)
                .build()
                .unwrap();
            let current = Arc::new(AtomicUsize::new(0));
            let peak = Arc::new(AtomicUsize::new(0));

            let tasks = (0..calls).map(|_| {
                let bulkhead = bulkhead.clone();
                let current = Arc::clone(&current);
                let peak = Arc::clone(&peak);
                tokio::spawn(async move {
                    bulkhead
                        .execute(|| async move {
                            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(1)).await;
                            current.fetch_sub(1, Ordering::SeqCst);
                            Ok::<_, std::io::Error>(())
                        })
                        .await
                        .is_ok()
                })
            });
            let admitted = join_all(tasks)
                .await
                .into_iter()
                .filter(|joined| matches!(joined, Ok(true)))
                .count();

            prop_assert!(peak.load(Ordering::SeqCst) <= max_concurrent);

            let metrics = bulkhead.metrics();
            prop_assert_eq!(metrics.successful_requests, admitted as u64);
            prop_assert_eq!(
                metrics.successful_requests + metrics.rejected_requests,
                calls as u64
            );
            prop_assert_eq!(metrics.current_active, 0);
            prop_assert_eq!(metrics.waiting, 0);
            prop_assert_eq!(bulkhead.available_slots(), max_concurrent);

            Ok(())
        })?;
    }

    /// Property: releases beyond what was acquired are ignored
    #[test]
    fn releases_are_idempotent(
        max_concurrent in 1usize..=8,
        extra_releases in 1usize..=10,
    ) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let bulkhead = Bulkhead::builder()
                .max_concurrent(max_concurrent)
                .build()
                .unwrap();

            for _ in 0..max_concurrent {
                prop_assert!(bulkhead.try_acquire(None).await);
            }
            for _ in 0..max_concurrent + extra_releases {
                bulkhead.release();
            }

            prop_assert_eq!(bulkhead.active_count(), 0);
            prop_assert_eq!(bulkhead.available_slots(), max_concurrent);
            for _ in 0..max_concurrent {
                prop_assert!(bulkhead.try_acquire(None).await);
            }
            prop_assert!(!bulkhead.try_acquire(None).await);

            Ok(())
        })?;
    }
}
