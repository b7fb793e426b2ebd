use crate::events::AdaptiveEvent;
use crate::{AdaptiveConcurrencyLimiter, AdaptiveLimiterLayer};
use tower_admission_core::aimd::AimdConfig;
use tower_admission_core::{ConfigError, EventListener, EventListeners, FnListener, RejectionHandler};

#[cfg(feature = "metrics")]
use metrics::{describe_counter, describe_gauge};
#[cfg(feature = "metrics")]
use std::sync::Once;

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

/// Configuration for an [`AdaptiveConcurrencyLimiter`].
#[derive(Clone)]
pub struct AdaptiveLimiterConfig {
    pub(crate) name: String,
    pub(crate) aimd: AimdConfig,
    pub(crate) event_listeners: EventListeners<AdaptiveEvent>,
    pub(crate) rejection_handler: RejectionHandler,
}

impl AdaptiveLimiterConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> AdaptiveLimiterConfigBuilder {
        #[cfg(feature = "metrics")]
        {
            METRICS_INIT.call_once(|| {
                describe_counter!(
                    "adaptive_requests_total",
                    "Total number of completed requests, by outcome"
                );
                describe_counter!(
                    "adaptive_rejections_total",
                    "Total number of requests rejected at the concurrency limit"
                );
                describe_counter!(
                    "adaptive_limit_adjustments_total",
                    "Total number of limit changes, by direction"
                );
                describe_gauge!("adaptive_concurrency_limit", "Current concurrency limit");
                describe_gauge!("adaptive_in_flight", "Current number of in-flight requests");
            });
        }
        AdaptiveLimiterConfigBuilder::new()
    }

    /// Name used in events, logs and rejection errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The AIMD tuning parameters.
    pub fn aimd(&self) -> &AimdConfig {
        &self.aimd
    }

    pub(crate) fn renamed(&self, name: &str) -> Self {
        let mut config = self.clone();
        config.name = name.to_string();
        config
    }
}

impl Default for AdaptiveLimiterConfig {
    fn default() -> Self {
        Self {
            name: String::from("adaptive"),
            aimd: AimdConfig::default(),
            event_listeners: EventListeners::new(),
            rejection_handler: RejectionHandler::new(),
        }
    }
}

impl std::fmt::Debug for AdaptiveLimiterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveLimiterConfig")
            .field("name", &self.name)
            .field("aimd", &self.aimd)
            .finish_non_exhaustive()
    }
}

/// Builder for [`AdaptiveLimiterConfig`].
pub struct AdaptiveLimiterConfigBuilder {
    config: AdaptiveLimiterConfig,
}

impl AdaptiveLimiterConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            config: AdaptiveLimiterConfig::default(),
        }
    }

    /// Sets the limit the limiter starts with.
    ///
    /// Default: 100
    pub fn initial_limit(mut self, limit: usize) -> Self {
        self.config.aimd.initial_limit = limit;
        self
    }

    /// Sets the floor for the limit.
    ///
    /// Default: 10
    pub fn min_limit(mut self, limit: usize) -> Self {
        self.config.aimd.min_limit = limit;
        self
    }

    /// Sets the ceiling for the limit.
    ///
    /// Default: 1000
    pub fn max_limit(mut self, limit: usize) -> Self {
        self.config.aimd.max_limit = limit;
        self
    }

    /// Sets how much a healthy window raises the limit.
    ///
    /// Default: 1
    pub fn increase_rate(mut self, amount: usize) -> Self {
        self.config.aimd.increase_by = amount;
        self
    }

    /// Sets the factor an unhealthy window multiplies the limit by.
    ///
    /// Must be strictly between 0 and 1.
    ///
    /// Default: 0.9
    pub fn decrease_factor(mut self, factor: f64) -> Self {
        self.config.aimd.decrease_factor = factor;
        self
    }

    /// Sets how many reported outcomes make up one adjustment window.
    ///
    /// Default: 100
    pub fn measurement_window(mut self, window: usize) -> Self {
        self.config.aimd.measurement_window = window;
        self
    }

    /// Sets the success rate a window must exceed to raise the limit.
    ///
    /// Default: 0.95
    pub fn success_threshold(mut self, threshold: f64) -> Self {
        self.config.aimd.success_threshold = threshold;
        self
    }

    /// Sets the success rate below which a window lowers the limit.
    ///
    /// Default: 0.80
    pub fn failure_threshold(mut self, threshold: f64) -> Self {
        self.config.aimd.failure_threshold = threshold;
        self
    }

    /// Sets the name for this limiter instance.
    ///
    /// Default: `adaptive`
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Sets how rejection errors are built.
    pub fn rejection_handler(mut self, handler: RejectionHandler) -> Self {
        self.config.rejection_handler = handler;
        self
    }

    /// Registers an event listener.
    pub fn add_listener<L>(mut self, listener: L) -> Self
    where
        L: EventListener<AdaptiveEvent> + 'static,
    {
        self.config.event_listeners.add(listener);
        self
    }

    /// Registers a callback when a window moves the limit.
    ///
    /// # Callback Signature
    /// `Fn(usize, usize)` - called with the previous limit, then the new one.
    ///
    /// # Example
    /// ```rust
    /// use tower_admission_adaptive::AdaptiveLimiterConfig;
    ///
    /// let limiter = AdaptiveLimiterConfig::builder()
    ///     .on_limit_changed(|from, to| println!("limit {from} -> {to}"))
    ///     .build()
    ///     .unwrap();
    /// ```
    pub fn on_limit_changed<F>(self, f: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.add_listener(FnListener::new(move |event: &AdaptiveEvent| {
            if let AdaptiveEvent::LimitChanged {
                previous_limit,
                new_limit,
                ..
            } = event
            {
                f(*previous_limit, *new_limit);
            }
        }))
    }

    /// Registers a callback when a caller is rejected at the limit.
    ///
    /// Called with the limit in force at the time.
    pub fn on_limit_reached<F>(self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.add_listener(FnListener::new(move |event: &AdaptiveEvent| {
            if let AdaptiveEvent::LimitReached { limit, .. } = event {
                f(*limit);
            }
        }))
    }

    /// Validates and returns the configuration.
    pub fn build_config(self) -> Result<AdaptiveLimiterConfig, ConfigError> {
        self.config.aimd.validate()?;
        Ok(self.config)
    }

    /// Validates the configuration and builds a limiter.
    pub fn build(self) -> Result<AdaptiveConcurrencyLimiter, ConfigError> {
        Ok(AdaptiveConcurrencyLimiter::new(self.build_config()?))
    }

    /// Validates the configuration and builds a Tower layer around a new limiter.
    pub fn build_layer(self) -> Result<AdaptiveLimiterLayer, ConfigError> {
        Ok(AdaptiveLimiterLayer::new(self.build()?))
    }
}

impl Default for AdaptiveLimiterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
