use tower_admission_core::{AdmissionError, RejectionError, RejectionReason};

/// Errors returned by [`BackpressureManager::execute`](crate::BackpressureManager::execute).
#[derive(Debug, thiserror::Error)]
pub enum BackpressureError<E> {
    /// The manager refused the call.
    #[error(transparent)]
    Rejected(RejectionError),

    /// An error returned by the operation.
    #[error("inner service error: {0}")]
    Inner(E),
}

impl<E> BackpressureError<E> {
    /// Returns true if the hard ceiling turned the call away.
    pub fn is_overloaded(&self) -> bool {
        matches!(self, BackpressureError::Rejected(r) if r.reason() == RejectionReason::SystemOverloaded)
    }

    /// Returns true if the caller gave up waiting for backpressure to clear.
    pub fn is_timeout(&self) -> bool {
        matches!(self, BackpressureError::Rejected(r) if r.reason() == RejectionReason::AcquireTimeout)
    }

    /// Returns the rejection, if the manager refused the call.
    pub fn rejection(&self) -> Option<&RejectionError> {
        match self {
            BackpressureError::Rejected(r) => Some(r),
            BackpressureError::Inner(_) => None,
        }
    }

    /// Returns the inner error if present.
    pub fn into_inner(self) -> Option<E> {
        match self {
            BackpressureError::Inner(e) => Some(e),
            BackpressureError::Rejected(_) => None,
        }
    }
}

impl<E> From<BackpressureError<E>> for AdmissionError<E> {
    fn from(err: BackpressureError<E>) -> Self {
        match err {
            BackpressureError::Rejected(r) => AdmissionError::Rejected(r),
            BackpressureError::Inner(e) => AdmissionError::Application(e),
        }
    }
}
