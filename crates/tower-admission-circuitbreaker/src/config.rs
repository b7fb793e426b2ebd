use crate::classifier::{DefaultClassifier, FnClassifier};
use crate::events::CircuitBreakerEvent;
use crate::{CircuitBreaker, CircuitBreakerLayer, CircuitState};
use std::sync::Arc;
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

/// Configuration for a circuit breaker.
///
/// Only obtainable through [`CircuitBreakerConfigBuilder`], so every instance
/// has passed validation.
#[derive(Clone)]
pub struct CircuitBreakerConfig<C = DefaultClassifier> {
    pub(crate) name: String,
    pub(crate) failure_threshold: usize,
    pub(crate) recovery_timeout: Duration,
    pub(crate) success_threshold: usize,
    pub(crate) timeout: Option<Duration>,
    pub(crate) half_open_max_calls: usize,
    pub(crate) classifier: C,
    pub(crate) event_listeners: EventListeners<CircuitBreakerEvent>,
    pub(crate) rejection_handler: RejectionHandler,
}

impl CircuitBreakerConfig<DefaultClassifier> {
    /// Creates a new configuration builder.
    pub fn builder() -> CircuitBreakerConfigBuilder<DefaultClassifier> {
        #[cfg(feature = "metrics")]
        {
            METRICS_INIT.call_once(|| {
                describe_counter!(
                    "circuitbreaker_calls_total",
                    "Total number of calls recorded by the circuit breaker, by outcome"
                );
                describe_counter!(
                    "circuitbreaker_rejections_total",
                    "Total number of calls rejected by the circuit breaker, by reason"
                );
                describe_counter!(
                    "circuitbreaker_transitions_total",
                    "Total number of circuit breaker state transitions"
                );
                describe_gauge!(
                    "circuitbreaker_state",
                    "Current circuit breaker state (0 = closed, 1 = open, 2 = half-open)"
                );
            });
        }
        CircuitBreakerConfigBuilder::new()
    }
}

impl Default for CircuitBreakerConfig<DefaultClassifier> {
    fn default() -> Self {
        Self {
            name: String::from("default"),
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 2,
            timeout: None,
            half_open_max_calls: 1,
            classifier: DefaultClassifier,
            event_listeners: EventListeners::new(),
            rejection_handler: RejectionHandler::new(),
        }
    }
}

impl<C> CircuitBreakerConfig<C> {
    /// Name used in events, logs and rejection errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Consecutive failures that open the circuit.
    pub fn failure_threshold(&self) -> usize {
        self.failure_threshold
    }

    /// How long the circuit stays open before probing.
    pub fn recovery_timeout(&self) -> Duration {
        self.recovery_timeout
    }

    /// Consecutive half-open successes that close the circuit.
    pub fn success_threshold(&self) -> usize {
        self.success_threshold
    }

    /// Per-call operation timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Concurrent probes allowed while half-open.
    pub fn half_open_max_calls(&self) -> usize {
        self.half_open_max_calls
    }

    pub(crate) fn renamed(&self, name: &str) -> Self
    where
        C: Clone,
    {
        let mut config = self.clone();
        config.name = name.to_string();
        config
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold < 1 {
            return Err(ConfigError::invalid(
                "failure_threshold",
                ">= 1",
                self.failure_threshold,
            ));
        }
        if self.recovery_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "recovery_timeout",
                "> 0",
                self.recovery_timeout,
            ));
        }
        if self.success_threshold < 1 {
            return Err(ConfigError::invalid(
                "success_threshold",
                ">= 1",
                self.success_threshold,
            ));
        }
        if let Some(timeout) = self.timeout {
            if timeout.is_zero() {
                return Err(ConfigError::invalid("timeout", "> 0 or unset", timeout));
            }
        }
        if self.half_open_max_calls < 1 {
            return Err(ConfigError::invalid(
                "half_open_max_calls",
                ">= 1",
                self.half_open_max_calls,
            ));
        }
        Ok(())
    }
}

/// Builder for configuring and constructing a circuit breaker.
pub struct CircuitBreakerConfigBuilder<C = DefaultClassifier> {
    config: CircuitBreakerConfig<C>,
}

impl CircuitBreakerConfigBuilder<DefaultClassifier> {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            config: CircuitBreakerConfig::default(),
        }
    }
}

impl Default for CircuitBreakerConfigBuilder<DefaultClassifier> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> CircuitBreakerConfigBuilder<C> {
    /// Give this breaker a human-readable name for observability.
    ///
    /// Default: `default`
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Sets the number of consecutive failures that opens the circuit.
    ///
    /// Default: 5
    pub fn failure_threshold(mut self, n: usize) -> Self {
        self.config.failure_threshold = n;
        self
    }

    /// Sets how long the circuit stays open, measured from the last failure.
    ///
    /// Default: 60 seconds
    pub fn recovery_timeout(mut self, duration: Duration) -> Self {
        self.config.recovery_timeout = duration;
        self
    }

    /// Sets the number of consecutive half-open successes that closes the circuit.
    ///
    /// Default: 2
    pub fn success_threshold(mut self, n: usize) -> Self {
        self.config.success_threshold = n;
        self
    }

    /// Sets a timeout applied to every operation run through `call`.
    ///
    /// A timed-out operation is recorded as a failure.
    /// Default: none
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.config.timeout = Some(duration);
        self
    }

    /// Sets the number of concurrent probe calls allowed while half-open.
    ///
    /// Default: 1
    pub fn half_open_max_calls(mut self, n: usize) -> Self {
        self.config.half_open_max_calls = n;
        self
    }

    /// Sets the classifier that decides which errors count as failures.
    ///
    /// Default: every error is a failure
    pub fn failure_classifier<C2>(self, classifier: C2) -> CircuitBreakerConfigBuilder<C2> {
        let CircuitBreakerConfig {
            name,
            failure_threshold,
            recovery_timeout,
            success_threshold,
            timeout,
            half_open_max_calls,
            classifier: _,
            event_listeners,
            rejection_handler,
        } = self.config;

        CircuitBreakerConfigBuilder {
            config: CircuitBreakerConfig {
                name,
                failure_threshold,
                recovery_timeout,
                success_threshold,
                timeout,
                half_open_max_calls,
                classifier,
                event_listeners,
                rejection_handler,
            },
        }
    }

    /// Counts only errors for which `predicate` returns `true`.
    ///
    /// # Example
    /// ```rust
    /// use tower_admission_circuitbreaker::CircuitBreakerConfig;
    /// use std::io::ErrorKind;
    ///
    /// let breaker = CircuitBreakerConfig::builder()
    ///     .failure_predicate(|e: &std::io::Error| e.kind() != ErrorKind::NotFound)
    ///     .build()
    ///     .unwrap();
    /// ```
    pub fn failure_predicate<F>(self, predicate: F) -> CircuitBreakerConfigBuilder<FnClassifier<F>> {
        self.failure_classifier(FnClassifier::new(predicate))
    }

    /// Sets how rejection errors are built.
    ///
    /// Default: generic [`RejectionError`](tower_admission_core::RejectionError)s
    pub fn rejection_handler(mut self, handler: RejectionHandler) -> Self {
        self.config.rejection_handler = handler;
        self
    }

    /// Registers an event listener.
    pub fn add_listener<L>(mut self, listener: L) -> Self
    where
        L: EventListener<CircuitBreakerEvent> + 'static,
    {
        self.config.event_listeners.add(listener);
        self
    }

    /// Registers a callback when the circuit breaker transitions between states.
    ///
    /// # Callback Signature
    /// `Fn(CircuitState, CircuitState)` - called with the state the circuit is
    /// transitioning **from**, then the state it is transitioning **to**.
    ///
    /// # Example
    /// ```rust
    /// use tower_admission_circuitbreaker::{CircuitBreakerConfig, CircuitState};
    ///
    /// let breaker = CircuitBreakerConfig::builder()
    ///     .on_state_transition(|from, to| {
    ///         if to == CircuitState::Open {
    ///             eprintln!("circuit opened (was {from})");
    ///         }
    ///     })
    ///     .build()
    ///     .unwrap();
    /// ```
    pub fn on_state_transition<F>(self, f: F) -> Self
    where
        F: Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.add_listener(FnListener::new(move |event: &CircuitBreakerEvent| {
            if let CircuitBreakerEvent::StateTransition {
                from_state,
                to_state,
                ..
            } = event
            {
                f(*from_state, *to_state);
            }
        }))
    }

    /// Registers a callback when a success is recorded.
    ///
    /// Called with the state the circuit was in when the success was recorded.
    pub fn on_success<F>(self, f: F) -> Self
    where
        F: Fn(CircuitState) + Send + Sync + 'static,
    {
        self.add_listener(FnListener::new(move |event: &CircuitBreakerEvent| {
            if let CircuitBreakerEvent::SuccessRecorded { state, .. } = event {
                f(*state);
            }
        }))
    }

    /// Registers a callback when a failure is recorded.
    ///
    /// Called with the state the circuit was in when the failure was recorded.
    pub fn on_failure<F>(self, f: F) -> Self
    where
        F: Fn(CircuitState) + Send + Sync + 'static,
    {
        self.add_listener(FnListener::new(move |event: &CircuitBreakerEvent| {
            if let CircuitBreakerEvent::FailureRecorded { state, .. } = event {
                f(*state);
            }
        }))
    }

    /// Registers a callback when a call is rejected.
    pub fn on_call_rejected<F>(self, f: F) -> Self
    where
        F: Fn(RejectionReason) + Send + Sync + 'static,
    {
        self.add_listener(FnListener::new(move |event: &CircuitBreakerEvent| {
            if let CircuitBreakerEvent::CallRejected { reason, .. } = event {
                f(*reason);
            }
        }))
    }

    /// Registers a callback when the breaker is reset.
    pub fn on_reset<F>(self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.add_listener(FnListener::new(move |event: &CircuitBreakerEvent| {
            if matches!(event, CircuitBreakerEvent::CircuitReset { .. }) {
                f();
            }
        }))
    }

    /// Validates and returns the configuration.
    pub fn build_config(self) -> Result<CircuitBreakerConfig<C>, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// Validates the configuration and builds a circuit breaker.
    pub fn build(self) -> Result<CircuitBreaker<C>, ConfigError> {
        Ok(CircuitBreaker::new(self.build_config()?))
    }

    /// Validates the configuration and builds a Tower layer around a new breaker.
    pub fn build_layer(self) -> Result<CircuitBreakerLayer<C>, ConfigError> {
        Ok(CircuitBreakerLayer::new(Arc::new(self.build()?)))
    }
}
