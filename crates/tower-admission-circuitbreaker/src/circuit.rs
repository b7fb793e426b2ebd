use crate::config::CircuitBreakerConfig;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tower_admission_core::RejectionReason;

/// Represents the state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CircuitState {
    /// The circuit is closed and calls are allowed.
    Closed = 0,
    /// The circuit is open and calls are rejected.
    Open = 1,
    /// The circuit is half-open and a limited number of probe calls are allowed.
    HalfOpen = 2,
}

impl CircuitState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    /// Returns a stable, lowercase label for this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of circuit breaker metrics for observability.
///
/// All fields are read under the breaker's lock, so they are mutually
/// consistent: `successful_requests + failed_requests == total_requests`.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitMetrics {
    /// Name of the breaker.
    pub name: String,
    /// Current state.
    pub state: CircuitState,
    /// Calls whose outcome was recorded.
    pub total_requests: u64,
    /// Calls recorded as successes.
    pub successful_requests: u64,
    /// Calls recorded as failures.
    pub failed_requests: u64,
    /// Calls refused without running.
    pub rejected_requests: u64,
    /// `failed_requests / total_requests`, or 0.0 before any call.
    pub failure_rate: f64,
    /// `successful_requests / total_requests`, or 0.0 before any call.
    pub success_rate: f64,
    /// Current failure streak.
    pub consecutive_failures: usize,
    /// Current success streak.
    pub consecutive_successes: usize,
    /// Probe calls currently in flight.
    pub half_open_calls: usize,
    /// Time since the most recent recorded failure.
    pub time_since_last_failure: Option<Duration>,
    /// Time since the last state transition.
    pub time_since_state_change: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Transition {
    pub(crate) from: CircuitState,
    pub(crate) to: CircuitState,
}

/// Result of an admission attempt made under the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    /// Admitted. `probe` holds the half-open episode the probe slot belongs to.
    Granted { probe: Option<u64> },
    Rejected {
        reason: RejectionReason,
        retry_after: Option<Duration>,
    },
}

/// What recording an outcome did, reported back for event emission.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Recorded {
    pub(crate) state: CircuitState,
    pub(crate) consecutive_failures: usize,
    pub(crate) transition: Option<Transition>,
}

pub(crate) struct Circuit {
    state: CircuitState,
    state_atomic: Arc<AtomicU8>,
    consecutive_failures: usize,
    consecutive_successes: usize,
    last_failure_time: Option<Instant>,
    last_state_change: Instant,
    half_open_calls: usize,
    // Bumped on every transition so stale probe releases are ignored
    episode: u64,
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    rejected_requests: u64,
}

impl Circuit {
    pub(crate) fn new(state_atomic: Arc<AtomicU8>) -> Self {
        state_atomic.store(CircuitState::Closed as u8, Ordering::Release);
        Self {
            state: CircuitState::Closed,
            state_atomic,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_failure_time: None,
            last_state_change: Instant::now(),
            half_open_calls: 0,
            episode: 0,
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            rejected_requests: 0,
        }
    }

    pub(crate) fn state(&self) -> CircuitState {
        self.state
    }

    pub(crate) fn consecutive_failures(&self) -> usize {
        self.consecutive_failures
    }

    /// The instant the open period is measured from.
    ///
    /// Failures recorded while already open push it forward, and a forced
    /// open with an older failure on record counts from the transition.
    fn open_since(&self) -> Instant {
        match self.last_failure_time {
            Some(failed_at) if failed_at > self.last_state_change => failed_at,
            _ => self.last_state_change,
        }
    }

    fn remaining_open(&self, config: &CircuitBreakerConfig<impl Sized>, now: Instant) -> Duration {
        config
            .recovery_timeout
            .saturating_sub(now.saturating_duration_since(self.open_since()))
    }

    /// Flips OPEN to HALF_OPEN once the recovery timeout has elapsed.
    fn poll_recovery(
        &mut self,
        config: &CircuitBreakerConfig<impl Sized>,
        now: Instant,
    ) -> Option<Transition> {
        if self.state == CircuitState::Open && self.remaining_open(config, now).is_zero() {
            self.transition_to(CircuitState::HalfOpen, now)
        } else {
            None
        }
    }

    /// Decides whether a call may proceed, without reserving a probe slot.
    pub(crate) fn can_execute(
        &mut self,
        config: &CircuitBreakerConfig<impl Sized>,
        now: Instant,
    ) -> (bool, Option<Transition>) {
        let transition = self.poll_recovery(config, now);
        let allowed = match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => self.half_open_calls < config.half_open_max_calls,
        };
        (allowed, transition)
    }

    /// Decides whether a call may proceed and reserves a probe slot when half-open.
    pub(crate) fn try_admit(
        &mut self,
        config: &CircuitBreakerConfig<impl Sized>,
        now: Instant,
    ) -> (Admission, Option<Transition>) {
        let transition = self.poll_recovery(config, now);
        let admission = match self.state {
            CircuitState::Closed => Admission::Granted { probe: None },
            CircuitState::Open => {
                self.rejected_requests += 1;
                Admission::Rejected {
                    reason: RejectionReason::CircuitOpen,
                    retry_after: Some(self.remaining_open(config, now)),
                }
            }
            CircuitState::HalfOpen => {
                if self.half_open_calls < config.half_open_max_calls {
                    self.half_open_calls += 1;
                    Admission::Granted {
                        probe: Some(self.episode),
                    }
                } else {
                    self.rejected_requests += 1;
                    Admission::Rejected {
                        reason: RejectionReason::HalfOpenRejection,
                        retry_after: None,
                    }
                }
            }
        };
        (admission, transition)
    }

    /// Returns a probe slot taken in `episode`, if that episode is still current.
    pub(crate) fn release_probe(&mut self, episode: u64) {
        if self.state == CircuitState::HalfOpen && self.episode == episode {
            self.half_open_calls = self.half_open_calls.saturating_sub(1);
        }
    }

    pub(crate) fn record_success(
        &mut self,
        config: &CircuitBreakerConfig<impl Sized>,
        now: Instant,
    ) -> Recorded {
        let state = self.state;
        self.total_requests += 1;
        self.successful_requests += 1;
        self.consecutive_failures = 0;
        self.consecutive_successes += 1;

        let transition = if self.state == CircuitState::HalfOpen
            && self.consecutive_successes >= config.success_threshold
        {
            self.transition_to(CircuitState::Closed, now)
        } else {
            None
        };

        Recorded {
            state,
            consecutive_failures: 0,
            transition,
        }
    }

    pub(crate) fn record_failure(
        &mut self,
        config: &CircuitBreakerConfig<impl Sized>,
        now: Instant,
    ) -> Recorded {
        let state = self.state;
        self.total_requests += 1;
        self.failed_requests += 1;
        self.consecutive_successes = 0;
        self.consecutive_failures += 1;
        self.last_failure_time = Some(now);
        let consecutive_failures = self.consecutive_failures;

        let transition = match self.state {
            CircuitState::Closed if self.consecutive_failures >= config.failure_threshold => {
                self.transition_to(CircuitState::Open, now)
            }
            CircuitState::HalfOpen => self.transition_to(CircuitState::Open, now),
            _ => None,
        };

        Recorded {
            state,
            consecutive_failures,
            transition,
        }
    }

    pub(crate) fn force(&mut self, state: CircuitState, now: Instant) -> Option<Transition> {
        self.transition_to(state, now)
    }

    /// Returns to CLOSED and clears every counter.
    pub(crate) fn reset(&mut self, now: Instant) -> (CircuitState, Option<Transition>) {
        let previous = self.state;
        let transition = self.transition_to(CircuitState::Closed, now);
        self.consecutive_failures = 0;
        self.consecutive_successes = 0;
        self.last_failure_time = None;
        self.total_requests = 0;
        self.successful_requests = 0;
        self.failed_requests = 0;
        self.rejected_requests = 0;
        (previous, transition)
    }

    pub(crate) fn metrics(&self, name: &str, now: Instant) -> CircuitMetrics {
        let (failure_rate, success_rate) = if self.total_requests > 0 {
            (
                self.failed_requests as f64 / self.total_requests as f64,
                self.successful_requests as f64 / self.total_requests as f64,
            )
        } else {
            (0.0, 0.0)
        };

        CircuitMetrics {
            name: name.to_string(),
            state: self.state,
            total_requests: self.total_requests,
            successful_requests: self.successful_requests,
            failed_requests: self.failed_requests,
            rejected_requests: self.rejected_requests,
            failure_rate,
            success_rate,
            consecutive_failures: self.consecutive_failures,
            consecutive_successes: self.consecutive_successes,
            half_open_calls: self.half_open_calls,
            time_since_last_failure: self
                .last_failure_time
                .map(|t| now.saturating_duration_since(t)),
            time_since_state_change: now.saturating_duration_since(self.last_state_change),
        }
    }

    fn transition_to(&mut self, state: CircuitState, now: Instant) -> Option<Transition> {
        if self.state == state {
            return None;
        }

        let from = self.state;
        self.state = state;
        self.state_atomic.store(state as u8, Ordering::Release);
        self.last_state_change = now;
        self.half_open_calls = 0;
        self.episode = self.episode.wrapping_add(1);

        match state {
            CircuitState::HalfOpen => self.consecutive_successes = 0,
            CircuitState::Closed => self.consecutive_failures = 0,
            CircuitState::Open => {}
        }

        Some(Transition { from, to: state })
    }
}
