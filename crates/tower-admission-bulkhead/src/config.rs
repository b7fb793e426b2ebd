//! Configuration for the bulkhead.

use crate::events::BulkheadEvent;
use crate::{Bulkhead, BulkheadLayer};
use std::time::Duration;
use tower_admission_core::{
    ConfigError, EventListener, EventListeners, FnListener, RejectionHandler, RejectionReason,
};

#[cfg(feature = "metrics")]
use metrics::{describe_counter, describe_gauge, describe_histogram};
#[cfg(feature = "metrics")]
use std::sync::Once;

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

/// Configuration for a [`Bulkhead`].
#[derive(Clone)]
pub struct BulkheadConfig {
    pub(crate) name: String,
    pub(crate) max_concurrent: usize,
    pub(crate) max_waiting: usize,
    pub(crate) timeout: Option<Duration>,
    pub(crate) event_listeners: EventListeners<BulkheadEvent>,
    pub(crate) rejection_handler: RejectionHandler,
}

impl BulkheadConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> BulkheadConfigBuilder {
        #[cfg(feature = "metrics")]
        {
            METRICS_INIT.call_once(|| {
                describe_counter!(
                    "bulkhead_calls_permitted_total",
                    "Total number of calls permitted through the bulkhead"
                );
                describe_counter!(
                    "bulkhead_calls_rejected_total",
                    "Total number of calls rejected by the bulkhead, by reason"
                );
                describe_counter!(
                    "bulkhead_calls_finished_total",
                    "Total number of executed calls, by outcome"
                );
                describe_gauge!(
                    "bulkhead_concurrent_calls",
                    "Current number of calls holding a slot"
                );
                describe_gauge!(
                    "bulkhead_waiting_calls",
                    "Current number of calls waiting for a slot"
                );
                describe_histogram!(
                    "bulkhead_wait_duration_seconds",
                    "Time spent waiting to acquire a slot"
                );
            });
        }
        BulkheadConfigBuilder::new()
    }

    /// Name used in events, logs and rejection errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Maximum number of calls holding a slot at once.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Maximum number of calls allowed to wait for a slot.
    pub fn max_waiting(&self) -> usize {
        self.max_waiting
    }

    /// How long a caller waits for a slot, if bounded.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) fn renamed(&self, name: &str) -> Self {
        let mut config = self.clone();
        config.name = name.to_string();
        config
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent < 1 {
            return Err(ConfigError::invalid(
                "max_concurrent",
                ">= 1",
                self.max_concurrent,
            ));
        }
        if let Some(timeout) = self.timeout {
            if timeout.is_zero() {
                return Err(ConfigError::invalid("timeout", "> 0 or unset", timeout));
            }
        }
        Ok(())
    }
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            name: String::from("bulkhead"),
            max_concurrent: 10,
            max_waiting: 0,
            timeout: None,
            event_listeners: EventListeners::new(),
            rejection_handler: RejectionHandler::new(),
        }
    }
}

impl std::fmt::Debug for BulkheadConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkheadConfig")
            .field("name", &self.name)
            .field("max_concurrent", &self.max_concurrent)
            .field("max_waiting", &self.max_waiting)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Builder for [`BulkheadConfig`].
pub struct BulkheadConfigBuilder {
    config: BulkheadConfig,
}

impl BulkheadConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            config: BulkheadConfig::default(),
        }
    }

    /// Sets the maximum number of concurrent calls.
    ///
    /// Default: 10
    pub fn max_concurrent(mut self, max: usize) -> Self {
        self.config.max_concurrent = max;
        self
    }

    /// Sets how many callers may wait for a slot once capacity is exhausted.
    ///
    /// With zero, a full bulkhead rejects immediately.
    ///
    /// Default: 0
    pub fn max_waiting(mut self, max: usize) -> Self {
        self.config.max_waiting = max;
        self
    }

    /// Sets how long a waiting caller waits for a slot.
    ///
    /// Default: None (wait indefinitely)
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Sets the name for this bulkhead instance.
    ///
    /// Default: `bulkhead`
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
        L: EventListener<BulkheadEvent> + 'static,
    {
        self.config.event_listeners.add(listener);
        self
    }

    /// Registers a callback when a slot is acquired.
    ///
    /// # Callback Signature
    /// `Fn(usize, Duration)` - called with the number of active calls
    /// (including this one) and how long the caller waited.
    pub fn on_slot_acquired<F>(self, f: F) -> Self
    where
        F: Fn(usize, Duration) + Send + Sync + 'static,
    {
        self.add_listener(FnListener::new(move |event: &BulkheadEvent| {
            if let BulkheadEvent::SlotAcquired {
                active, wait_time, ..
            } = event
            {
                f(*active, *wait_time);
            }
        }))
    }

    /// Registers a callback when a slot is released.
    ///
    /// Called with the number of calls still active.
    pub fn on_slot_released<F>(self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.add_listener(FnListener::new(move |event: &BulkheadEvent| {
            if let BulkheadEvent::SlotReleased { active, .. } = event {
                f(*active);
            }
        }))
    }

    /// Registers a callback when a call is rejected.
    ///
    /// # Example
    /// ```rust
    /// use tower_admission_bulkhead::BulkheadConfig;
    ///
    /// let bulkhead = BulkheadConfig::builder()
    ///     .max_concurrent(4)
    ///     .on_bulkhead_full(|reason| eprintln!("bulkhead rejected a call: {reason}"))
    ///     .build()
    ///     .unwrap();
    /// ```
    pub fn on_bulkhead_full<F>(self, f: F) -> Self
    where
        F: Fn(RejectionReason) + Send + Sync + 'static,
    {
        self.add_listener(FnListener::new(move |event: &BulkheadEvent| {
            if let BulkheadEvent::BulkheadFull { reason, .. } = event {
                f(*reason);
            }
        }))
    }

    /// Validates and returns the configuration.
    pub fn build_config(self) -> Result<BulkheadConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// Validates the configuration and builds a bulkhead.
    pub fn build(self) -> Result<Bulkhead, ConfigError> {
        Ok(Bulkhead::new(self.build_config()?))
    }

    /// Validates the configuration and builds a Tower layer around a new bulkhead.
    pub fn build_layer(self) -> Result<BulkheadLayer, ConfigError> {
        Ok(BulkheadLayer::new(self.build()?))
    }
}

impl Default for BulkheadConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
