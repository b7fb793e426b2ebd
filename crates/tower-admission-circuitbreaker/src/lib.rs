//! Consecutive-failure circuit breaker.
//!
//! A circuit breaker stops calling a dependency that keeps failing, then
//! cautiously probes it until it recovers.
//!
//! ## States
//! - **Closed**: normal operation, every call runs. `failure_threshold`
//!   consecutive failures open the circuit.
//! - **Open**: calls are rejected immediately until `recovery_timeout` has
//!   passed since the last failure.
//! - **Half-Open**: at most `half_open_max_calls` probes run concurrently.
//!   Any probe failure reopens the circuit; `success_threshold` consecutive
//!   successes close it.
//!
//! ## Usage
//!
//! ```rust
//! use tower_admission_circuitbreaker::{CircuitBreakerConfig, CircuitState};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let breaker = CircuitBreakerConfig::builder()
//!     .name("inventory")
//!     .failure_threshold(3)
//!     .recovery_timeout(Duration::from_secs(30))
//!     .timeout(Duration::from_secs(2))
//!     .build()
//!     .unwrap();
//!
//! let result = breaker
//!     .call(|| async { Ok::<_, std::io::Error>("stock: 12") })
//!     .await;
//!
//! assert_eq!(result.unwrap(), "stock: 12");
//! assert_eq!(breaker.state(), CircuitState::Closed);
//! # }
//! ```
//!
//! ## Manual Gating
//!
//! Callers that cannot hand the operation over can drive the breaker
//! themselves with [`CircuitBreaker::can_execute`], [`CircuitBreaker::on_success`]
//! and [`CircuitBreaker::on_failure`].
//!
//! ## Tower
//!
//! [`CircuitBreakerLayer`] wraps any `Service` so each request goes through
//! [`CircuitBreaker::call`].

use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tower_admission_core::{PatternType, RejectionContext, RejectionError, RejectionReason};

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

pub use circuit::{CircuitMetrics, CircuitState};
pub use classifier::{DefaultClassifier, FailureClassifier, FnClassifier};
pub use config::{CircuitBreakerConfig, CircuitBreakerConfigBuilder};
pub use error::CircuitBreakerError;
pub use events::CircuitBreakerEvent;
pub use layer::{CircuitBreakerLayer, CircuitBreakerService};
pub use registry::CircuitBreakerRegistry;

mod circuit;
pub mod classifier;
mod config;
mod error;
mod events;
mod layer;
mod registry;

use circuit::{Admission, Circuit, Recorded, Transition};

/// A circuit breaker guarding calls to one dependency.
///
/// All state lives behind a single mutex that is never held across an
/// `.await`. Events and rejection callbacks run after it is released.
pub struct CircuitBreaker<C = DefaultClassifier> {
    circuit: Mutex<Circuit>,
    state_atomic: Arc<AtomicU8>,
    config: CircuitBreakerConfig<C>,
}

impl CircuitBreaker<DefaultClassifier> {
    /// Returns a builder with default settings.
    pub fn builder() -> CircuitBreakerConfigBuilder<DefaultClassifier> {
        CircuitBreakerConfig::builder()
    }
}

impl<C> CircuitBreaker<C> {
    /// Creates a breaker from a validated configuration.
    pub fn new(config: CircuitBreakerConfig<C>) -> Self {
        let state_atomic = Arc::new(AtomicU8::new(CircuitState::Closed as u8));
        Self {
            circuit: Mutex::new(Circuit::new(Arc::clone(&state_atomic))),
            state_atomic,
            config,
        }
    }

    /// Returns the breaker's name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Returns the breaker's configuration.
    pub fn config(&self) -> &CircuitBreakerConfig<C> {
        &self.config
    }

    /// Returns the current state without taking the lock.
    ///
    /// An open circuit whose recovery timeout has passed still reports `Open`
    /// until the next admission check flips it.
    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.state_atomic.load(Ordering::Acquire))
    }

    /// Returns whether the circuit is currently open.
    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Decides whether a call may proceed right now.
    ///
    /// Closed always allows. Open allows only by flipping to half-open once the
    /// recovery timeout has elapsed. Half-open allows while probe slots remain.
    /// The whole decision, including the flip, happens under the lock.
    pub fn can_execute(&self) -> bool {
        let (allowed, transition) = {
            let mut circuit = self.circuit.lock();
            circuit.can_execute(&self.config, Instant::now())
        };
        if let Some(transition) = transition {
            self.publish_transition(transition);
        }
        allowed
    }

    /// Records a successful call.
    pub fn on_success(&self) {
        let recorded = {
            let mut circuit = self.circuit.lock();
            circuit.record_success(&self.config, Instant::now())
        };
        self.publish_outcome(true, recorded);
    }

    /// Records a failed call.
    pub fn on_failure(&self) {
        let recorded = {
            let mut circuit = self.circuit.lock();
            circuit.record_failure(&self.config, Instant::now())
        };
        self.publish_outcome(false, recorded);
    }

    /// Returns the circuit to closed and clears all counters.
    pub fn reset(&self) {
        let (previous_state, transition) = {
            let mut circuit = self.circuit.lock();
            circuit.reset(Instant::now())
        };

        #[cfg(feature = "tracing")]
        tracing::info!(breaker = %self.config.name, previous = %previous_state, "circuit breaker reset");

        if let Some(transition) = transition {
            self.publish_transition(transition);
        }
        self.config
            .event_listeners
            .emit_with(|| CircuitBreakerEvent::CircuitReset {
                pattern_name: self.config.name.clone(),
                timestamp: std::time::Instant::now(),
                previous_state,
            });
    }

    /// Forces the circuit into the open state.
    pub fn force_open(&self) {
        let transition = self.circuit.lock().force(CircuitState::Open, Instant::now());
        if let Some(transition) = transition {
            self.publish_transition(transition);
        }
    }

    /// Forces the circuit into the closed state.
    pub fn force_closed(&self) {
        let transition = self
            .circuit
            .lock()
            .force(CircuitState::Closed, Instant::now());
        if let Some(transition) = transition {
            self.publish_transition(transition);
        }
    }

    /// Returns a consistent snapshot of the breaker's counters.
    pub fn metrics(&self) -> CircuitMetrics {
        self.circuit
            .lock()
            .metrics(&self.config.name, Instant::now())
    }

    /// Runs `operation` through the breaker.
    ///
    /// Rejects fast when the circuit does not admit the call. Otherwise the
    /// operation runs (under the configured timeout, if any) and its outcome is
    /// recorded: `Ok` as a success, errors accepted by the classifier and
    /// timeouts as failures. Other errors are returned without being counted.
    ///
    /// A half-open probe slot is held for the duration of the operation and
    /// is returned even if the returned future is dropped mid-flight.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: FailureClassifier<E>,
    {
        let permit = self.admit().map_err(CircuitBreakerError::Rejected)?;

        let result = match self.config.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, operation()).await {
                Ok(result) => result,
                Err(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(breaker = %self.config.name, ?timeout, "operation timed out");

                    permit.complete(Some(false));
                    return Err(CircuitBreakerError::OperationTimeout {
                        name: self.config.name.clone(),
                        timeout,
                    });
                }
            },
            None => operation().await,
        };

        match result {
            Ok(value) => {
                permit.complete(Some(true));
                Ok(value)
            }
            Err(err) => {
                if self.config.classifier.is_failure(&err) {
                    permit.complete(Some(false));
                } else {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(breaker = %self.config.name, "error not classified as failure");

                    permit.complete(None);
                }
                Err(CircuitBreakerError::Inner(err))
            }
        }
    }

    /// Admits a call, reserving a probe slot when half-open.
    fn admit(&self) -> Result<CallPermit<'_, C>, RejectionError> {
        let (admission, transition, state, consecutive_failures) = {
            let mut circuit = self.circuit.lock();
            let (admission, transition) = circuit.try_admit(&self.config, Instant::now());
            (
                admission,
                transition,
                circuit.state(),
                circuit.consecutive_failures(),
            )
        };

        if let Some(transition) = transition {
            self.publish_transition(transition);
        }

        match admission {
            Admission::Granted { probe } => Ok(CallPermit {
                breaker: self,
                probe,
                completed: false,
            }),
            Admission::Rejected {
                reason,
                retry_after,
            } => Err(self.reject(reason, state, consecutive_failures, retry_after)),
        }
    }

    fn reject(
        &self,
        reason: RejectionReason,
        state: CircuitState,
        consecutive_failures: usize,
        retry_after: Option<Duration>,
    ) -> RejectionError {
        #[cfg(feature = "tracing")]
        tracing::debug!(breaker = %self.config.name, %state, %reason, "circuit breaker rejected call");

        #[cfg(feature = "metrics")]
        counter!(
            "circuitbreaker_rejections_total",
            "circuitbreaker" => self.config.name.clone(),
            "reason" => reason.as_str()
        )
        .increment(1);

        self.config
            .event_listeners
            .emit_with(|| CircuitBreakerEvent::CallRejected {
                pattern_name: self.config.name.clone(),
                timestamp: std::time::Instant::now(),
                state,
                reason,
            });

        let message = match reason {
            RejectionReason::HalfOpenRejection => "circuit is half-open and all probe slots are taken",
            _ => "circuit is open",
        };
        let mut context = RejectionContext::new(
            PatternType::CircuitBreaker,
            self.config.name.clone(),
            reason,
            message,
        )
        .with_metadata("state", state)
        .with_metadata("consecutive_failures", consecutive_failures)
        .with_metadata("failure_threshold", self.config.failure_threshold);
        if let Some(retry_after) = retry_after {
            context = context.with_metadata("retry_after_ms", retry_after.as_millis());
        }

        self.config.rejection_handler.reject(context)
    }

    /// Returns a probe slot and records an outcome under a single lock.
    fn complete(&self, probe: Option<u64>, outcome: Option<bool>) {
        let recorded = {
            let mut circuit = self.circuit.lock();
            if let Some(episode) = probe {
                circuit.release_probe(episode);
            }
            match outcome {
                Some(true) => Some((true, circuit.record_success(&self.config, Instant::now()))),
                Some(false) => Some((false, circuit.record_failure(&self.config, Instant::now()))),
                None => None,
            }
        };

        if let Some((success, recorded)) = recorded {
            self.publish_outcome(success, recorded);
        }
    }

    fn publish_outcome(&self, success: bool, recorded: Recorded) {
        #[cfg(feature = "metrics")]
        counter!(
            "circuitbreaker_calls_total",
            "circuitbreaker" => self.config.name.clone(),
            "outcome" => if success { "success" } else { "failure" }
        )
        .increment(1);

        self.config.event_listeners.emit_with(|| {
            let pattern_name = self.config.name.clone();
            let timestamp = std::time::Instant::now();
            if success {
                CircuitBreakerEvent::SuccessRecorded {
                    pattern_name,
                    timestamp,
                    state: recorded.state,
                }
            } else {
                CircuitBreakerEvent::FailureRecorded {
                    pattern_name,
                    timestamp,
                    state: recorded.state,
                    consecutive_failures: recorded.consecutive_failures,
                }
            }
        });

        if let Some(transition) = recorded.transition {
            self.publish_transition(transition);
        }
    }

    fn publish_transition(&self, transition: Transition) {
        #[cfg(feature = "tracing")]
        match transition.to {
            CircuitState::Open => tracing::warn!(
                breaker = %self.config.name,
                from = %transition.from,
                "circuit opened"
            ),
            _ => tracing::info!(
                breaker = %self.config.name,
                from = %transition.from,
                to = %transition.to,
                "circuit state transition"
            ),
        }

        #[cfg(feature = "metrics")]
        {
            counter!(
                "circuitbreaker_transitions_total",
                "circuitbreaker" => self.config.name.clone(),
                "from" => transition.from.as_str(),
                "to" => transition.to.as_str()
            )
            .increment(1);
            gauge!("circuitbreaker_state", "circuitbreaker" => self.config.name.clone())
                .set(transition.to as u8 as f64);
        }

        self.config
            .event_listeners
            .emit_with(|| CircuitBreakerEvent::StateTransition {
                pattern_name: self.config.name.clone(),
                timestamp: std::time::Instant::now(),
                from_state: transition.from,
                to_state: transition.to,
            });
    }
}

impl<C> std::fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.config.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// An admitted call. Dropping it without completing returns any probe slot.
struct CallPermit<'a, C> {
    breaker: &'a CircuitBreaker<C>,
    probe: Option<u64>,
    completed: bool,
}

impl<C> CallPermit<'_, C> {
    fn complete(mut self, outcome: Option<bool>) {
        self.completed = true;
        self.breaker.complete(self.probe, outcome);
    }
}

impl<C> Drop for CallPermit<'_, C> {
    fn drop(&mut self) {
        if !self.completed {
            if let Some(episode) = self.probe {
                self.breaker.circuit.lock().release_probe(episode);
            }
        }
    }
}
