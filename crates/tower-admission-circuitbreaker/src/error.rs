use std::time::Duration;
use thiserror::Error;
use tower_admission_core::{AdmissionError, RejectionError, RejectionReason};

/// Errors returned by [`CircuitBreaker::call`](crate::CircuitBreaker::call).
#[derive(Debug, Error)]
pub enum CircuitBreakerError<E> {
    /// The breaker refused the call (open, or half-open with no probe slot).
    #[error(transparent)]
    Rejected(RejectionError),

    /// The operation exceeded the configured timeout; counted as a failure.
    #[error("operation in circuit breaker '{name}' timed out after {timeout:?}")]
    OperationTimeout {
        /// Breaker name.
        name: String,
        /// Configured timeout.
        timeout: Duration,
    },

    /// An error returned by the operation.
    #[error("inner service error: {0}")]
    Inner(E),
}

impl<E> CircuitBreakerError<E> {
    /// Returns true if the call was rejected because the circuit is not closed.
    pub fn is_circuit_open(&self) -> bool {
        matches!(
            self,
            CircuitBreakerError::Rejected(r)
                if matches!(r.reason(), RejectionReason::CircuitOpen | RejectionReason::HalfOpenRejection)
        )
    }

    /// Returns true if the operation timed out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, CircuitBreakerError::OperationTimeout { .. })
    }

    /// Returns the rejection, if the breaker refused the call.
    pub fn rejection(&self) -> Option<&RejectionError> {
        match self {
            CircuitBreakerError::Rejected(r) => Some(r),
            _ => None,
        }
    }

    /// Returns the inner error if present.
    pub fn into_inner(self) -> Option<E> {
        match self {
            CircuitBreakerError::Inner(e) => Some(e),
            _ => None,
        }
    }
}

impl<E> From<CircuitBreakerError<E>> for AdmissionError<E> {
    fn from(err: CircuitBreakerError<E>) -> Self {
        match err {
            CircuitBreakerError::Rejected(r) => AdmissionError::Rejected(r),
            CircuitBreakerError::OperationTimeout { name, timeout } => {
                AdmissionError::OperationTimeout { name, timeout }
            }
            CircuitBreakerError::Inner(e) => AdmissionError::Application(e),
        }
    }
}
