//! Property tests for the adaptive concurrency limiter.
//!
//! Invariants tested:
//! - The limit always stays within [min_limit, max_limit]
//! - A window of all successes raises the limit by exactly the increase rate
//! - In-flight requests never exceed the limit
//! - Reported outcomes add up to admitted requests

use proptest::prelude::*;
use tower_admission_adaptive::AdaptiveConcurrencyLimiter;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Property: arbitrary outcome sequences keep the limit in bounds
    #[test]
    fn limit_stays_in_bounds(
        min_limit in 1usize..=10,
        span in 0usize..=40,
        window in 1usize..=20,
        outcomes in prop::collection::vec(any::<bool>(), 0..400),
    ) {
        let max_limit = min_limit + span;
        let limiter = AdaptiveConcurrencyLimiter::builder()
            .initial_limit(min_limit)
            .min_limit(min_limit)
            .max_limit(max_limit)
            .decrease_factor(0.5)
            .measurement_window(window)
            .build()
            .unwrap();

        for success in &outcomes {
            prop_assert!(limiter.acquire());
            limiter.release(*success);
            let limit = limiter.limit();
            prop_assert!(limit >= min_limit && limit <= max_limit);
        }

        let stats = limiter.stats();
        prop_assert_eq!(stats.total_successes + stats.total_failures, stats.total_requests);
        prop_assert_eq!(stats.total_requests, outcomes.len() as u64);
    }

    /// Property: each full window of successes adds exactly `increase_rate`
    #[test]
    fn one_increase_per_healthy_window(
        initial in 1usize..=50,
        increase in 1usize..=5,
        windows in 1usize..=5,
    ) {
        let limiter = AdaptiveConcurrencyLimiter::builder()
            .initial_limit(initial)
            .min_limit(1)
            .max_limit(1_000)
            .increase_rate(increase)
            .measurement_window(10)
            .build()
            .unwrap();

        for w in 1..=windows {
            for _ in 0..9 {
                prop_assert!(limiter.acquire());
                limiter.release(true);
            }
            prop_assert_eq!(limiter.limit(), initial + (w - 1) * increase);
            prop_assert!(limiter.acquire());
            limiter.release(true);
            prop_assert_eq!(limiter.limit(), initial + w * increase);
        }
    }

    /// Property: admissions stop exactly at the limit
    #[test]
    fn in_flight_bounded_by_limit(limit in 1usize..=30, attempts in 1usize..=60) {
        let limiter = AdaptiveConcurrencyLimiter::builder()
            .initial_limit(limit)
            .min_limit(1)
            .max_limit(limit)
            .build()
            .unwrap();

        let permits: Vec<_> = (0..attempts)
            .filter_map(|_| limiter.try_acquire().ok())
            .collect();

        prop_assert_eq!(permits.len(), attempts.min(limit));
        prop_assert!(limiter.active_count() <= limiter.limit());
        prop_assert_eq!(
            limiter.stats().rejected_requests,
            attempts.saturating_sub(limit) as u64
        );

        for permit in permits {
            permit.success();
        }
        prop_assert_eq!(limiter.active_count(), 0);
    }
}
