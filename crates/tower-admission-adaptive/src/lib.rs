//! Adaptive concurrency limiting with AIMD.
//!
//! An [`AdaptiveConcurrencyLimiter`] admits callers while fewer than its
//! current limit are in flight and rejects the rest. Callers report how each
//! admitted request went; every `measurement_window` reports the limiter
//! retunes itself:
//!
//! - success rate above `success_threshold`: limit grows by `increase_rate`
//! - success rate below `failure_threshold`: limit is multiplied by `decrease_factor`
//! - anything in between: limit stays put
//!
//! The limit never leaves `[min_limit, max_limit]`.
//!
//! # Example
//!
//! ```rust
//! use tower_admission_adaptive::AdaptiveLimiterConfig;
//!
//! # async fn example() {
//! let limiter = AdaptiveLimiterConfig::builder()
//!     .initial_limit(20)
//!     .min_limit(5)
//!     .max_limit(200)
//!     .measurement_window(50)
//!     .build()
//!     .unwrap();
//!
//! // Hand the operation over; Ok counts as success, Err as failure.
//! let value = limiter
//!     .execute(|| async { Ok::<_, std::io::Error>(7) })
//!     .await
//!     .unwrap();
//! assert_eq!(value, 7);
//!
//! // Or drive it manually with a permit.
//! if let Ok(permit) = limiter.try_acquire() {
//!     // ... do the work ...
//!     permit.success();
//! }
//! # }
//! ```

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tower_admission_core::aimd::{AimdController, WindowOutcome};
use tower_admission_core::{PatternType, RejectionContext, RejectionError, RejectionReason};

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

pub use config::{AdaptiveLimiterConfig, AdaptiveLimiterConfigBuilder};
pub use error::AdaptiveError;
pub use events::AdaptiveEvent;
pub use layer::{AdaptiveFuture, AdaptiveLimiterLayer, AdaptiveService};
pub use registry::AdaptiveLimiterRegistry;
pub use tower_admission_core::aimd::Adjustment;

mod config;
mod error;
mod events;
mod layer;
mod registry;

/// Statistics snapshot of an [`AdaptiveConcurrencyLimiter`].
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveStats {
    pub name: String,
    pub current_limit: usize,
    pub min_limit: usize,
    pub max_limit: usize,
    pub active: usize,
    /// Admitted requests over the limiter's lifetime.
    pub total_requests: u64,
    pub rejected_requests: u64,
    /// Successes reported in the current window.
    pub window_successes: usize,
    /// Failures reported in the current window.
    pub window_failures: usize,
    pub total_successes: u64,
    pub total_failures: u64,
    /// Windows that moved the limit.
    pub adjustments: u64,
    /// Active requests as a percentage of the current limit.
    pub utilization: f64,
}

/// AIMD-tuned concurrency limiter.
///
/// Cloning is cheap and clones share the same limit and counters.
#[derive(Clone)]
pub struct AdaptiveConcurrencyLimiter {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<LimiterState>,
    config: AdaptiveLimiterConfig,
}

struct LimiterState {
    controller: AimdController,
    active: usize,
    total_requests: u64,
    rejected: u64,
    total_successes: u64,
    total_failures: u64,
    adjustments: u64,
}

impl AdaptiveConcurrencyLimiter {
    /// Returns a builder with default settings.
    pub fn builder() -> AdaptiveLimiterConfigBuilder {
        AdaptiveLimiterConfig::builder()
    }

    /// Creates a limiter from a validated configuration.
    pub fn new(config: AdaptiveLimiterConfig) -> Self {
        let controller = AimdController::new(config.aimd.clone());
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(LimiterState {
                    controller,
                    active: 0,
                    total_requests: 0,
                    rejected: 0,
                    total_successes: 0,
                    total_failures: 0,
                    adjustments: 0,
                }),
                config,
            }),
        }
    }

    /// Returns the limiter's name.
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// Returns the limiter's configuration.
    pub fn config(&self) -> &AdaptiveLimiterConfig {
        &self.shared.config
    }

    /// Takes a slot if one is free under the current limit.
    ///
    /// On `true` the caller must report the outcome with [`release`](Self::release).
    pub fn acquire(&self) -> bool {
        self.shared.admit().is_ok()
    }

    /// Returns a slot and reports how the request went.
    ///
    /// Releases without a matching acquisition are ignored.
    pub fn release(&self, success: bool) {
        self.shared.release(success);
    }

    /// Takes a slot, returning a permit that reports the outcome.
    pub fn try_acquire(&self) -> Result<LimiterPermit, RejectionError> {
        self.shared.admit()?;
        Ok(LimiterPermit {
            shared: Arc::clone(&self.shared),
            reported: false,
        })
    }

    /// Runs `operation` in a slot, reporting `Ok` as success and `Err` as failure.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, AdaptiveError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.try_acquire().map_err(AdaptiveError::LimitReached)?;
        let result = operation().await;
        permit.report(result.is_ok());
        result.map_err(AdaptiveError::Service)
    }

    /// Returns the current limit.
    pub fn limit(&self) -> usize {
        self.shared.state.lock().controller.limit()
    }

    /// Returns the number of requests holding a slot.
    pub fn active_count(&self) -> usize {
        self.shared.state.lock().active
    }

    /// Returns a statistics snapshot.
    pub fn stats(&self) -> AdaptiveStats {
        let config = &self.shared.config;
        let state = self.shared.state.lock();
        let limit = state.controller.limit();
        AdaptiveStats {
            name: config.name.clone(),
            current_limit: limit,
            min_limit: config.aimd.min_limit,
            max_limit: config.aimd.max_limit,
            active: state.active,
            total_requests: state.total_requests,
            rejected_requests: state.rejected,
            window_successes: state.controller.window_successes(),
            window_failures: state.controller.window_failures(),
            total_successes: state.total_successes,
            total_failures: state.total_failures,
            adjustments: state.adjustments,
            utilization: state.active as f64 / limit as f64 * 100.0,
        }
    }
}

impl Shared {
    fn admit(&self) -> Result<(), RejectionError> {
        let admitted = {
            let mut state = self.state.lock();
            let limit = state.controller.limit();
            if state.active >= limit {
                state.rejected += 1;
                Err((state.active, limit))
            } else {
                state.active += 1;
                state.total_requests += 1;
                Ok(state.active)
            }
        };

        match admitted {
            Ok(_active) => {
                #[cfg(feature = "metrics")]
                gauge!("adaptive_in_flight", "adaptive" => self.config.name.clone())
                    .set(_active as f64);
                Ok(())
            }
            Err((active, limit)) => Err(self.reject(active, limit)),
        }
    }

    fn release(&self, success: bool) {
        let (_active, window) = {
            let mut state = self.state.lock();
            if state.active == 0 {
                drop(state);
                #[cfg(feature = "tracing")]
                tracing::warn!(limiter = %self.config.name, "release without a held slot ignored");
                return;
            }
            state.active -= 1;
            if success {
                state.total_successes += 1;
            } else {
                state.total_failures += 1;
            }
            let window = state.controller.record(success);
            if window.is_some_and(|w| w.changed()) {
                state.adjustments += 1;
            }
            (state.active, window)
        };

        #[cfg(feature = "metrics")]
        {
            counter!(
                "adaptive_requests_total",
                "adaptive" => self.config.name.clone(),
                "outcome" => if success { "success" } else { "failure" }
            )
            .increment(1);
            gauge!("adaptive_in_flight", "adaptive" => self.config.name.clone())
                .set(_active as f64);
        }

        if let Some(window) = window.filter(WindowOutcome::changed) {
            self.publish_limit_change(window);
        }
    }

    fn publish_limit_change(&self, window: WindowOutcome) {
        #[cfg(feature = "tracing")]
        match window.adjustment {
            tower_admission_core::aimd::Adjustment::Decrease => tracing::warn!(
                limiter = %self.config.name,
                from = window.previous_limit,
                to = window.new_limit,
                success_rate = window.success_rate,
                "concurrency limit decreased"
            ),
            _ => tracing::info!(
                limiter = %self.config.name,
                from = window.previous_limit,
                to = window.new_limit,
                success_rate = window.success_rate,
                "concurrency limit increased"
            ),
        }

        #[cfg(feature = "metrics")]
        {
            let direction = if window.new_limit > window.previous_limit {
                "increase"
            } else {
                "decrease"
            };
            counter!(
                "adaptive_limit_adjustments_total",
                "adaptive" => self.config.name.clone(),
                "direction" => direction
            )
            .increment(1);
            gauge!("adaptive_concurrency_limit", "adaptive" => self.config.name.clone())
                .set(window.new_limit as f64);
        }

        self.config
            .event_listeners
            .emit_with(|| AdaptiveEvent::LimitChanged {
                pattern_name: self.config.name.clone(),
                timestamp: std::time::Instant::now(),
                previous_limit: window.previous_limit,
                new_limit: window.new_limit,
                success_rate: window.success_rate,
                adjustment: window.adjustment,
            });
    }

    fn reject(&self, active: usize, limit: usize) -> RejectionError {
        let config = &self.config;

        #[cfg(feature = "tracing")]
        tracing::debug!(limiter = %config.name, active, limit, "concurrency limit reached");

        #[cfg(feature = "metrics")]
        counter!("adaptive_rejections_total", "adaptive" => config.name.clone()).increment(1);

        config
            .event_listeners
            .emit_with(|| AdaptiveEvent::LimitReached {
                pattern_name: config.name.clone(),
                timestamp: std::time::Instant::now(),
                active,
                limit,
            });

        let context = RejectionContext::new(
            PatternType::AdaptiveConcurrency,
            config.name.clone(),
            RejectionReason::LimitReached,
            "concurrency limit reached",
        )
        .with_metadata("active", active)
        .with_metadata("limit", limit);

        config.rejection_handler.reject(context)
    }
}

impl std::fmt::Debug for AdaptiveConcurrencyLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveConcurrencyLimiter")
            .field("name", &self.shared.config.name)
            .field("limit", &self.limit())
            .finish_non_exhaustive()
    }
}

/// An admitted request.
///
/// Report the outcome with [`success`](Self::success) or
/// [`failure`](Self::failure). Dropping the permit unreported counts as a
/// failure, so cancelled or panicking work pulls the limit down.
#[must_use = "dropping the permit reports a failure"]
pub struct LimiterPermit {
    shared: Arc<Shared>,
    reported: bool,
}

impl LimiterPermit {
    /// Reports success and returns the slot.
    pub fn success(self) {
        self.report(true);
    }

    /// Reports failure and returns the slot.
    pub fn failure(self) {
        self.report(false);
    }

    fn report(mut self, success: bool) {
        self.reported = true;
        self.shared.release(success);
    }
}

impl Drop for LimiterPermit {
    fn drop(&mut self) {
        if !self.reported {
            self.shared.release(false);
        }
    }
}

impl std::fmt::Debug for LimiterPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimiterPermit")
            .field("limiter", &self.shared.config.name)
            .finish()
    }
}
