use std::sync::{Arc, Mutex};
use tower_admission_adaptive::{AdaptiveConcurrencyLimiter, AdaptiveLimiterRegistry, AdaptiveLimiterConfig};

fn limiter(initial: usize) -> AdaptiveConcurrencyLimiter {
    AdaptiveConcurrencyLimiter::builder()
        .name("api")
        .initial_limit(initial)
        .min_limit(2)
        .max_limit(20)
        .increase_rate(1)
        .decrease_factor(0.5)
        .measurement_window(10)
        .build()
        .unwrap()
}

fn report(limiter: &AdaptiveConcurrencyLimiter, successes: usize, failures: usize) {
    for _ in 0..successes {
        assert!(limiter.acquire());
        limiter.release(true);
    }
    for _ in 0..failures {
        assert!(limiter.acquire());
        limiter.release(false);
    }
}

/// A window of successes raises the limit by the increase rate, once.
#[test]
fn healthy_window_increases_once() {
    let limiter = limiter(10);

    report(&limiter, 9, 0);
    assert_eq!(limiter.limit(), 10);

    report(&limiter, 1, 0);
    assert_eq!(limiter.limit(), 11);
    assert_eq!(limiter.stats().window_successes, 0);
    assert_eq!(limiter.stats().adjustments, 1);
}

/// A window below the failure threshold multiplies the limit down.
#[test]
fn unhealthy_window_decreases() {
    let limiter = limiter(10);
    report(&limiter, 5, 5);
    assert_eq!(limiter.limit(), 5);
}

/// Success rates in the dead band leave the limit alone.
#[test]
fn dead_band_holds() {
    let limiter = limiter(10);
    report(&limiter, 9, 1);
    assert_eq!(limiter.limit(), 10);
    assert_eq!(limiter.stats().adjustments, 0);
}

/// The limit never leaves its bounds.
#[test]
fn limit_is_clamped() {
    let limiter = limiter(19);
    for _ in 0..5 {
        report(&limiter, 10, 0);
    }
    assert_eq!(limiter.limit(), 20);

    for _ in 0..10 {
        report(&limiter, 0, 10);
    }
    assert_eq!(limiter.limit(), 2);

    let stats = limiter.stats();
    assert_eq!(stats.min_limit, 2);
    assert_eq!(stats.max_limit, 20);
    assert_eq!(
        stats.total_successes + stats.total_failures,
        stats.total_requests
    );
}

/// Only windows that move the limit are published.
#[test]
fn limit_changes_are_published() {
    let changes = Arc::new(Mutex::new(Vec::new()));
    let c = Arc::clone(&changes);
    let limiter = AdaptiveConcurrencyLimiter::builder()
        .initial_limit(4)
        .min_limit(4)
        .max_limit(5)
        .measurement_window(2)
        .on_limit_changed(move |from, to| c.lock().unwrap().push((from, to)))
        .build()
        .unwrap();

    report(&limiter, 2, 0);
    report(&limiter, 2, 0);
    report(&limiter, 0, 2);
    report(&limiter, 0, 2);

    assert_eq!(*changes.lock().unwrap(), vec![(4, 5), (5, 4)]);
}

/// Registry limiters are created from the template and keyed by name.
#[test]
fn registry_creates_from_template() {
    let registry = AdaptiveLimiterRegistry::with_template(
        AdaptiveLimiterConfig::builder()
            .initial_limit(3)
            .min_limit(1)
            .max_limit(10)
            .build_config()
            .unwrap(),
    );

    let search = registry.get_or_create("search");
    assert_eq!(search.name(), "search");
    assert_eq!(search.limit(), 3);
    assert!(Arc::ptr_eq(&search, &registry.get_or_create("search")));

    assert!(search.acquire());
    assert_eq!(registry.all_stats()["search"].active, 1);
    search.release(true);
}
