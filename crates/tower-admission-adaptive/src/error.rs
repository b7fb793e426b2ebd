use tower_admission_core::{AdmissionError, RejectionError};

/// Error type for the adaptive limiter.
#[derive(Debug, thiserror::Error)]
pub enum AdaptiveError<E> {
    /// The concurrency limit was reached.
    #[error(transparent)]
    LimitReached(RejectionError),
    /// The service returned an error.
    #[error("service error: {0}")]
    Service(E),
}

impl<E> AdaptiveError<E> {
    /// Returns true if the limiter refused the call.
    pub fn is_limit_reached(&self) -> bool {
        matches!(self, AdaptiveError::LimitReached(_))
    }

    /// Returns the rejection, if the limiter refused the call.
    pub fn rejection(&self) -> Option<&RejectionError> {
        match self {
            AdaptiveError::LimitReached(r) => Some(r),
            AdaptiveError::Service(_) => None,
        }
    }

    /// Returns the service error if present.
    pub fn into_inner(self) -> Option<E> {
        match self {
            AdaptiveError::Service(e) => Some(e),
            AdaptiveError::LimitReached(_) => None,
        }
    }
}

impl<E> From<AdaptiveError<E>> for AdmissionError<E> {
    fn from(err: AdaptiveError<E>) -> Self {
        match err {
            AdaptiveError::LimitReached(r) => AdmissionError::Rejected(r),
            AdaptiveError::Service(e) => AdmissionError::Application(e),
        }
    }
}
