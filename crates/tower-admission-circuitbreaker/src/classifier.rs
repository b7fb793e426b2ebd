//! Failure classification for circuit breaker decisions.
//!
//! Only errors the classifier accepts are counted against the breaker. Every
//! other error is handed back to the caller untouched and leaves the failure
//! streak alone.

use std::sync::Arc;

/// Decides whether an operation error counts as a breaker failure.
pub trait FailureClassifier<E>: Send + Sync {
    /// Returns `true` if `error` should be recorded as a failure.
    fn is_failure(&self, error: &E) -> bool;
}

/// Counts every error as a failure.
///
/// # Example
///
/// ```rust
/// use tower_admission_circuitbreaker::classifier::{DefaultClassifier, FailureClassifier};
///
/// assert!(FailureClassifier::<std::io::Error>::is_failure(
///     &DefaultClassifier,
///     &std::io::Error::other("fail")
/// ));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl<E> FailureClassifier<E> for DefaultClassifier {
    fn is_failure(&self, _error: &E) -> bool {
        true
    }
}

/// A failure classifier backed by a predicate.
///
/// # Example
///
/// ```rust
/// use tower_admission_circuitbreaker::classifier::{FailureClassifier, FnClassifier};
/// use std::io::{Error, ErrorKind};
///
/// // Invalid input is the caller's fault, not the dependency's
/// let classifier = FnClassifier::new(|e: &Error| e.kind() != ErrorKind::InvalidInput);
///
/// assert!(classifier.is_failure(&Error::new(ErrorKind::TimedOut, "timeout")));
/// assert!(!classifier.is_failure(&Error::new(ErrorKind::InvalidInput, "bad")));
/// ```
#[derive(Clone)]
pub struct FnClassifier<F> {
    f: Arc<F>,
}

impl<F> FnClassifier<F> {
    /// Creates a new `FnClassifier` from the given predicate.
    pub fn new(f: F) -> Self {
        Self { f: Arc::new(f) }
    }
}

impl<F, E> FailureClassifier<E> for FnClassifier<F>
where
    F: Fn(&E) -> bool + Send + Sync,
{
    fn is_failure(&self, error: &E) -> bool {
        (self.f)(error)
    }
}

impl<F> std::fmt::Debug for FnClassifier<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnClassifier")
            .field("f", &"<closure>")
            .finish()
    }
}
