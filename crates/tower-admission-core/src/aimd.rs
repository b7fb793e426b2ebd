//! Windowed AIMD (Additive Increase Multiplicative Decrease) controller.
//!
//! Outcomes are accumulated into a measurement window. When the window fills,
//! the success rate over that window decides one discrete adjustment:
//!
//! - **Additive increase**: rate above `success_threshold` raises the limit by
//!   `increase_by`, capped at `max_limit`.
//! - **Multiplicative decrease**: rate below `failure_threshold` multiplies the
//!   limit by `decrease_factor` (floored), never going below `min_limit`.
//! - **Dead band**: anything in between leaves the limit alone.
//!
//! The controller is a plain value. Callers that share it across tasks keep it
//! behind their own lock, which also covers the counters it owns.
//!
//! # Example
//!
//! ```rust
//! use tower_admission_core::aimd::{AimdConfig, AimdController};
//!
//! let config = AimdConfig::default()
//!     .with_initial_limit(10)
//!     .with_min_limit(1)
//!     .with_max_limit(100)
//!     .with_measurement_window(4);
//!
//! let mut controller = AimdController::new(config);
//!
//! for _ in 0..3 {
//!     assert!(controller.record(true).is_none());
//! }
//! let window = controller.record(true).unwrap();
//! assert_eq!(window.previous_limit, 10);
//! assert_eq!(window.new_limit, 11);
//! ```

use crate::error::ConfigError;

/// Configuration for an AIMD controller.
#[derive(Debug, Clone, PartialEq)]
pub struct AimdConfig {
    /// Initial limit value.
    pub initial_limit: usize,
    /// Minimum limit (floor).
    pub min_limit: usize,
    /// Maximum limit (ceiling).
    pub max_limit: usize,
    /// Amount added on a healthy window.
    pub increase_by: usize,
    /// Factor applied on an unhealthy window. Must be in `(0, 1)`.
    pub decrease_factor: f64,
    /// Number of outcomes per adjustment.
    pub measurement_window: usize,
    /// Success rate above which the limit grows.
    pub success_threshold: f64,
    /// Success rate below which the limit shrinks.
    pub failure_threshold: f64,
}

impl Default for AimdConfig {
    fn default() -> Self {
        Self {
            initial_limit: 100,
            min_limit: 10,
            max_limit: 1000,
            increase_by: 1,
            decrease_factor: 0.9,
            measurement_window: 100,
            success_threshold: 0.95,
            failure_threshold: 0.80,
        }
    }
}

impl AimdConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the initial limit.
    pub fn with_initial_limit(mut self, limit: usize) -> Self {
        self.initial_limit = limit;
        self
    }

    /// Set the minimum limit (floor).
    pub fn with_min_limit(mut self, limit: usize) -> Self {
        self.min_limit = limit;
        self
    }

    /// Set the maximum limit (ceiling).
    pub fn with_max_limit(mut self, limit: usize) -> Self {
        self.max_limit = limit;
        self
    }

    /// Set the additive increase amount.
    pub fn with_increase_by(mut self, amount: usize) -> Self {
        self.increase_by = amount;
        self
    }

    /// Set the multiplicative decrease factor.
    ///
    /// For example, 0.5 halves the limit on an unhealthy window.
    pub fn with_decrease_factor(mut self, factor: f64) -> Self {
        self.decrease_factor = factor;
        self
    }

    /// Set the number of outcomes collected before each adjustment.
    pub fn with_measurement_window(mut self, window: usize) -> Self {
        self.measurement_window = window;
        self
    }

    /// Set the success rate above which the limit increases.
    pub fn with_success_threshold(mut self, threshold: f64) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Set the success rate below which the limit decreases.
    pub fn with_failure_threshold(mut self, threshold: f64) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Checks every range constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_limit < 1 {
            return Err(ConfigError::invalid("min_limit", ">= 1", self.min_limit));
        }
        if self.max_limit < self.min_limit {
            return Err(ConfigError::invalid(
                "max_limit",
                ">= min_limit",
                self.max_limit,
            ));
        }
        if self.initial_limit < self.min_limit || self.initial_limit > self.max_limit {
            return Err(ConfigError::invalid(
                "initial_limit",
                "within [min_limit, max_limit]",
                self.initial_limit,
            ));
        }
        if self.increase_by < 1 {
            return Err(ConfigError::invalid("increase_rate", ">= 1", self.increase_by));
        }
        if !(self.decrease_factor > 0.0 && self.decrease_factor < 1.0) {
            return Err(ConfigError::invalid(
                "decrease_factor",
                "strictly between 0 and 1",
                self.decrease_factor,
            ));
        }
        if self.measurement_window < 1 {
            return Err(ConfigError::invalid(
                "measurement_window",
                ">= 1",
                self.measurement_window,
            ));
        }
        if !(0.0..=1.0).contains(&self.success_threshold) {
            return Err(ConfigError::invalid(
                "success_threshold",
                "within [0, 1]",
                self.success_threshold,
            ));
        }
        if !(0.0..=1.0).contains(&self.failure_threshold) {
            return Err(ConfigError::invalid(
                "failure_threshold",
                "within [0, 1]",
                self.failure_threshold,
            ));
        }
        if self.failure_threshold >= self.success_threshold {
            return Err(ConfigError::invalid(
                "failure_threshold",
                "less than success_threshold",
                self.failure_threshold,
            ));
        }
        Ok(())
    }

    fn starting_limit(&self) -> usize {
        self.initial_limit
            .max(self.min_limit)
            .min(self.max_limit.max(self.min_limit))
    }
}

/// What a completed window decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    /// Additive increase.
    Increase,
    /// Multiplicative decrease.
    Decrease,
    /// Success rate fell in the dead band.
    Hold,
}

/// Summary of a completed measurement window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowOutcome {
    /// Limit before the adjustment.
    pub previous_limit: usize,
    /// Limit after the adjustment.
    pub new_limit: usize,
    /// Success rate over the window.
    pub success_rate: f64,
    /// Successes in the window.
    pub successes: usize,
    /// Failures in the window.
    pub failures: usize,
    /// Decision taken.
    pub adjustment: Adjustment,
}

impl WindowOutcome {
    /// Returns true if the limit value actually moved.
    ///
    /// An `Increase` at `max_limit` or a `Decrease` at `min_limit` does not.
    pub fn changed(&self) -> bool {
        self.previous_limit != self.new_limit
    }
}

/// AIMD controller with window bookkeeping.
#[derive(Debug, Clone)]
pub struct AimdController {
    limit: usize,
    success_count: usize,
    failure_count: usize,
    config: AimdConfig,
}

impl AimdController {
    /// Create a new controller.
    ///
    /// The initial limit is clamped into `[min_limit, max_limit]`; callers
    /// that need range errors run [`AimdConfig::validate`] first.
    pub fn new(config: AimdConfig) -> Self {
        Self {
            limit: config.starting_limit(),
            success_count: 0,
            failure_count: 0,
            config,
        }
    }

    /// Get the current limit.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Successes recorded in the current window.
    pub fn window_successes(&self) -> usize {
        self.success_count
    }

    /// Failures recorded in the current window.
    pub fn window_failures(&self) -> usize {
        self.failure_count
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &AimdConfig {
        &self.config
    }

    /// Records one outcome.
    ///
    /// Returns `Some` exactly when this outcome completes a window; the window
    /// counters are cleared before returning.
    pub fn record(&mut self, success: bool) -> Option<WindowOutcome> {
        if success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }

        let total = self.success_count + self.failure_count;
        if total < self.config.measurement_window {
            return None;
        }

        let successes = self.success_count;
        let failures = self.failure_count;
        let success_rate = successes as f64 / total as f64;
        self.success_count = 0;
        self.failure_count = 0;

        let previous_limit = self.limit;
        let adjustment = self.adjust(success_rate);

        Some(WindowOutcome {
            previous_limit,
            new_limit: self.limit,
            success_rate,
            successes,
            failures,
            adjustment,
        })
    }

    /// Applies one AIMD step for `success_rate` and returns the decision.
    pub fn adjust(&mut self, success_rate: f64) -> Adjustment {
        if success_rate > self.config.success_threshold {
            self.limit = self
                .limit
                .saturating_add(self.config.increase_by)
                .min(self.config.max_limit);
            Adjustment::Increase
        } else if success_rate < self.config.failure_threshold {
            let decreased = (self.limit as f64 * self.config.decrease_factor).floor() as usize;
            self.limit = decreased.clamp(self.config.min_limit, self.config.max_limit);
            Adjustment::Decrease
        } else {
            Adjustment::Hold
        }
    }

    /// Reset the limit to its initial value and clear the window.
    pub fn reset(&mut self) {
        self.limit = self.config.starting_limit();
        self.success_count = 0;
        self.failure_count = 0;
    }
}
