use crate::events::BackpressureEvent;
use crate::{BackpressureLayer, BackpressureManager};
use std::time::Duration;
use tower_admission_core::{
    ConfigError, EventListener, EventListeners, FnListener, RejectionHandler, RejectionReason,
};

#[cfg(feature = "metrics")]
use metrics::{describe_counter, describe_gauge};
#[cfg(feature = "metrics")]
use std::sync::Once;

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

/// Configuration for a [`BackpressureManager`].
#[derive(Clone)]
pub struct BackpressureConfig {
    pub(crate) name: String,
    pub(crate) max_pending: usize,
    pub(crate) high_water_mark: usize,
    pub(crate) low_water_mark: usize,
    pub(crate) acquire_timeout: Option<Duration>,
    pub(crate) event_listeners: EventListeners<BackpressureEvent>,
    pub(crate) rejection_handler: RejectionHandler,
}

impl BackpressureConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> BackpressureConfigBuilder {
        #[cfg(feature = "metrics")]
        {
            METRICS_INIT.call_once(|| {
                describe_counter!(
                    "backpressure_admitted_total",
                    "Total number of items admitted into the pipeline"
                );
                describe_counter!(
                    "backpressure_rejected_total",
                    "Total number of items turned away, by reason"
                );
                describe_gauge!("backpressure_pending", "Current number of pending items");
                describe_gauge!(
                    "backpressure_active",
                    "Whether backpressure is being applied (1) or not (0)"
                );
            });
        }
        BackpressureConfigBuilder::new()
    }

    /// Name used in events, logs and rejection errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hard ceiling on pending items.
    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    /// Pending count at which backpressure switches on.
    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    /// Pending count at which backpressure switches off.
    pub fn low_water_mark(&self) -> usize {
        self.low_water_mark
    }

    /// Default wait for callers held back by backpressure.
    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_pending < 1 {
            return Err(ConfigError::invalid("max_pending", ">= 1", self.max_pending));
        }
        if self.high_water_mark > self.max_pending {
            return Err(ConfigError::invalid(
                "high_water_mark",
                "<= max_pending",
                self.high_water_mark,
            ));
        }
        if self.low_water_mark > self.high_water_mark {
            return Err(ConfigError::invalid(
                "low_water_mark",
                "<= high_water_mark",
                self.low_water_mark,
            ));
        }
        if let Some(timeout) = self.acquire_timeout {
            if timeout.is_zero() {
                return Err(ConfigError::invalid(
                    "acquire_timeout",
                    "> 0 or unset",
                    timeout,
                ));
            }
        }
        Ok(())
    }
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            name: String::from("backpressure"),
            max_pending: 1000,
            high_water_mark: 800,
            low_water_mark: 200,
            acquire_timeout: Some(Duration::from_secs(30)),
            event_listeners: EventListeners::new(),
            rejection_handler: RejectionHandler::new(),
        }
    }
}

impl std::fmt::Debug for BackpressureConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackpressureConfig")
            .field("name", &self.name)
            .field("max_pending", &self.max_pending)
            .field("high_water_mark", &self.high_water_mark)
            .field("low_water_mark", &self.low_water_mark)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish_non_exhaustive()
    }
}

/// Builder for [`BackpressureConfig`].
pub struct BackpressureConfigBuilder {
    config: BackpressureConfig,
}

impl BackpressureConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            config: BackpressureConfig::default(),
        }
    }

    /// Sets the hard ceiling. Callers arriving at the ceiling are rejected
    /// without waiting.
    ///
    /// Default: 1000
    pub fn max_pending(mut self, max: usize) -> Self {
        self.config.max_pending = max;
        self
    }

    /// Sets the pending count that switches backpressure on.
    ///
    /// Default: 800
    pub fn high_water_mark(mut self, mark: usize) -> Self {
        self.config.high_water_mark = mark;
        self
    }

    /// Sets the pending count that switches backpressure off again.
    ///
    /// Default: 200
    pub fn low_water_mark(mut self, mark: usize) -> Self {
        self.config.low_water_mark = mark;
        self
    }

    /// Sets how long callers wait while backpressure is active when they do
    /// not pass their own timeout. `None` waits indefinitely.
    ///
    /// Default: 30 seconds
    pub fn acquire_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.acquire_timeout = timeout;
        self
    }

    /// Sets the name for this instance.
    ///
    /// Default: `backpressure`
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
        L: EventListener<BackpressureEvent> + 'static,
    {
        self.config.event_listeners.add(listener);
        self
    }

    /// Registers a callback when backpressure switches on.
    ///
    /// Called with the pending count that crossed the high water mark.
    pub fn on_threshold_exceeded<F>(self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.add_listener(FnListener::new(move |event: &BackpressureEvent| {
            if let BackpressureEvent::ThresholdExceeded { pending, .. } = event {
                f(*pending);
            }
        }))
    }

    /// Registers a callback when backpressure switches off.
    ///
    /// Called with the pending count that reached the low water mark.
    pub fn on_load_level_changed<F>(self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.add_listener(FnListener::new(move |event: &BackpressureEvent| {
            if let BackpressureEvent::LoadLevelChanged { pending, .. } = event {
                f(*pending);
            }
        }))
    }

    /// Registers a callback when a caller is rejected.
    pub fn on_call_rejected<F>(self, f: F) -> Self
    where
        F: Fn(RejectionReason) + Send + Sync + 'static,
    {
        self.add_listener(FnListener::new(move |event: &BackpressureEvent| {
            if let BackpressureEvent::CallRejected { reason, .. } = event {
                f(*reason);
            }
        }))
    }

    /// Validates and returns the configuration.
    pub fn build_config(self) -> Result<BackpressureConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// Validates the configuration and builds a manager.
    pub fn build(self) -> Result<BackpressureManager, ConfigError> {
        Ok(BackpressureManager::new(self.build_config()?))
    }

    /// Validates the configuration and builds a Tower layer around a new manager.
    pub fn build_layer(self) -> Result<BackpressureLayer, ConfigError> {
        Ok(BackpressureLayer::new(self.build()?))
    }
}

impl Default for BackpressureConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
