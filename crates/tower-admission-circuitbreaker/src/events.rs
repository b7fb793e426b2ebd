use crate::CircuitState;
use std::time::Instant;
use tower_admission_core::{Metadata, PatternType, RejectionReason, ResilienceEvent};

/// Events emitted by a circuit breaker.
#[derive(Debug, Clone)]
pub enum CircuitBreakerEvent {
    /// The circuit moved between states.
    StateTransition {
        pattern_name: String,
        timestamp: Instant,
        from_state: CircuitState,
        to_state: CircuitState,
    },
    /// A call was counted as a success.
    SuccessRecorded {
        pattern_name: String,
        timestamp: Instant,
        state: CircuitState,
    },
    /// A call was counted as a failure.
    FailureRecorded {
        pattern_name: String,
        timestamp: Instant,
        state: CircuitState,
        consecutive_failures: usize,
    },
    /// A call was refused without running.
    CallRejected {
        pattern_name: String,
        timestamp: Instant,
        state: CircuitState,
        reason: RejectionReason,
    },
    /// The breaker was manually reset.
    CircuitReset {
        pattern_name: String,
        timestamp: Instant,
        previous_state: CircuitState,
    },
}

impl ResilienceEvent for CircuitBreakerEvent {
    fn pattern_type(&self) -> PatternType {
        PatternType::CircuitBreaker
    }

    fn event_type(&self) -> &'static str {
        match self {
            CircuitBreakerEvent::StateTransition { .. } => "state_transition",
            CircuitBreakerEvent::SuccessRecorded { .. } => "success_recorded",
            CircuitBreakerEvent::FailureRecorded { .. } => "failure_recorded",
            CircuitBreakerEvent::CallRejected { .. } => "call_rejected",
            CircuitBreakerEvent::CircuitReset { .. } => "circuit_reset",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CircuitBreakerEvent::StateTransition { timestamp, .. }
            | CircuitBreakerEvent::SuccessRecorded { timestamp, .. }
            | CircuitBreakerEvent::FailureRecorded { timestamp, .. }
            | CircuitBreakerEvent::CallRejected { timestamp, .. }
            | CircuitBreakerEvent::CircuitReset { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            CircuitBreakerEvent::StateTransition { pattern_name, .. }
            | CircuitBreakerEvent::SuccessRecorded { pattern_name, .. }
            | CircuitBreakerEvent::FailureRecorded { pattern_name, .. }
            | CircuitBreakerEvent::CallRejected { pattern_name, .. }
            | CircuitBreakerEvent::CircuitReset { pattern_name, .. } => pattern_name,
        }
    }

    fn metadata(&self) -> Metadata {
        match self {
            CircuitBreakerEvent::StateTransition {
                from_state,
                to_state,
                ..
            } => vec![
                ("from_state", from_state.as_str().to_string()),
                ("to_state", to_state.as_str().to_string()),
            ],
            CircuitBreakerEvent::SuccessRecorded { state, .. } => {
                vec![("state", state.as_str().to_string())]
            }
            CircuitBreakerEvent::FailureRecorded {
                state,
                consecutive_failures,
                ..
            } => vec![
                ("state", state.as_str().to_string()),
                ("consecutive_failures", consecutive_failures.to_string()),
            ],
            CircuitBreakerEvent::CallRejected { state, reason, .. } => vec![
                ("state", state.as_str().to_string()),
                ("reason", reason.as_str().to_string()),
            ],
            CircuitBreakerEvent::CircuitReset { previous_state, .. } => {
                vec![("previous_state", previous_state.as_str().to_string())]
            }
        }
    }
}
