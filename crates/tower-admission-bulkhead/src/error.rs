//! Error types for the bulkhead.

use tower_admission_core::{AdmissionError, RejectionError, RejectionReason};

/// Errors returned by [`Bulkhead::execute`](crate::Bulkhead::execute) and the bulkhead service.
#[derive(Debug, thiserror::Error)]
pub enum BulkheadError<E> {
    /// The bulkhead refused the call.
    #[error(transparent)]
    Rejected(RejectionError),

    /// An error returned by the operation.
    #[error("inner service error: {0}")]
    Inner(E),
}

impl<E> BulkheadError<E> {
    /// Returns true if the bulkhead refused the call.
    pub fn is_rejected(&self) -> bool {
        matches!(self, BulkheadError::Rejected(_))
    }

    /// Returns true if the caller gave up waiting for a slot.
    pub fn is_timeout(&self) -> bool {
        matches!(self, BulkheadError::Rejected(r) if r.reason() == RejectionReason::WaitTimeout)
    }

    /// Returns the rejection, if the bulkhead refused the call.
    pub fn rejection(&self) -> Option<&RejectionError> {
        match self {
            BulkheadError::Rejected(r) => Some(r),
            BulkheadError::Inner(_) => None,
        }
    }

    /// Returns the inner error if present.
    pub fn into_inner(self) -> Option<E> {
        match self {
            BulkheadError::Inner(e) => Some(e),
            BulkheadError::Rejected(_) => None,
        }
    }
}

impl<E> From<BulkheadError<E>> for AdmissionError<E> {
    fn from(err: BulkheadError<E>) -> Self {
        match err {
            BulkheadError::Rejected(r) => AdmissionError::Rejected(r),
            BulkheadError::Inner(e) => AdmissionError::Application(e),
        }
    }
}
