//! Rejection and configuration errors shared by every primitive.
//!
//! Every rejection path (circuit open, bulkhead full, backpressure overload,
//! limiter at capacity) goes through a [`RejectionHandler`], which lets the
//! caller decide what error value is raised:
//!
//! 1. the optional callback sees the full [`RejectionContext`] first,
//! 2. a configured transformer builds the error from the context, or
//! 3. a configured custom error type is constructed from the context, or
//! 4. the original cause (if any) is surfaced, otherwise a generic error.
//!
//! ```rust
//! use tower_admission_core::{PatternType, RejectionContext, RejectionHandler, RejectionReason};
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("service busy: {0}")]
//! struct Busy(String);
//!
//! impl From<RejectionContext> for Busy {
//!     fn from(ctx: RejectionContext) -> Self {
//!         Busy(ctx.pattern_name)
//!     }
//! }
//!
//! let handler = RejectionHandler::new().with_error_type::<Busy>();
//! let ctx = RejectionContext::new(
//!     PatternType::Bulkhead,
//!     "db",
//!     RejectionReason::CapacityFull,
//!     "bulkhead at capacity",
//! );
//!
//! let err = handler.reject(ctx);
//! assert_eq!(err.reason(), RejectionReason::CapacityFull);
//! assert!(err.downcast_ref::<Busy>().is_some());
//! assert_eq!(err.to_string(), "service busy: db");
//! ```

use crate::events::{Metadata, PatternType};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Type-erased error used by transformers and custom error types.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shared, cloneable cause attached to a rejection (e.g. a wait timeout).
pub type SharedCause = Arc<dyn std::error::Error + Send + Sync>;

/// Error returned when a configuration builder is given invalid values.
///
/// Construction always fails eagerly; an invalid configuration never produces
/// a usable instance.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid configuration: {field} must be {constraint} (got {value})")]
pub struct ConfigError {
    field: &'static str,
    constraint: &'static str,
    value: String,
}

impl ConfigError {
    /// Creates an error for `field`, which violated `constraint`.
    pub fn invalid(field: &'static str, constraint: &'static str, value: impl fmt::Debug) -> Self {
        Self {
            field,
            constraint,
            value: format!("{:?}", value),
        }
    }

    /// Returns the name of the offending field.
    pub fn field(&self) -> &'static str {
        self.field
    }
}

/// Why a primitive refused to admit a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectionReason {
    /// Circuit breaker is open.
    CircuitOpen,
    /// Circuit breaker is half-open and all probe slots are taken.
    HalfOpenRejection,
    /// Bulkhead is at capacity and has no waiting line.
    CapacityFull,
    /// Bulkhead waiting line is full.
    QueueFull,
    /// Timed out waiting for a bulkhead slot.
    WaitTimeout,
    /// Backpressure gate is at its hard ceiling.
    SystemOverloaded,
    /// Timed out waiting for backpressure to subside.
    AcquireTimeout,
    /// Adaptive limiter is at its current limit.
    LimitReached,
}

impl RejectionReason {
    /// Returns a stable, lowercase label for this reason.
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::CircuitOpen => "circuit_open",
            RejectionReason::HalfOpenRejection => "half_open_rejection",
            RejectionReason::CapacityFull => "capacity_full",
            RejectionReason::QueueFull => "queue_full",
            RejectionReason::WaitTimeout => "wait_timeout",
            RejectionReason::SystemOverloaded => "system_overloaded",
            RejectionReason::AcquireTimeout => "acquire_timeout",
            RejectionReason::LimitReached => "limit_reached",
        }
    }

    /// Returns true for reasons caused by a wait running out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            RejectionReason::WaitTimeout | RejectionReason::AcquireTimeout
        )
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything known about a rejection at the moment it happened.
#[derive(Clone)]
pub struct RejectionContext {
    /// Primitive family that rejected the call.
    pub pattern_type: PatternType,
    /// Name of the rejecting instance.
    pub pattern_name: String,
    /// Reason code.
    pub reason: RejectionReason,
    /// Human readable message.
    pub message: String,
    /// Free-form details (capacity, counts, durations).
    pub metadata: Metadata,
    /// Underlying cause, if the rejection wraps one.
    pub cause: Option<SharedCause>,
}

impl RejectionContext {
    /// Creates a context with no metadata and no cause.
    pub fn new(
        pattern_type: PatternType,
        pattern_name: impl Into<String>,
        reason: RejectionReason,
        message: impl Into<String>,
    ) -> Self {
        Self {
            pattern_type,
            pattern_name: pattern_name.into(),
            reason,
            message: message.into(),
            metadata: Vec::new(),
            cause: None,
        }
    }

    /// Attaches a metadata entry.
    pub fn with_metadata(mut self, key: &'static str, value: impl ToString) -> Self {
        self.metadata.push((key, value.to_string()));
        self
    }

    /// Attaches the underlying cause.
    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(Arc::from(cause.into()));
        self
    }

    /// Looks up a metadata value by key.
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Debug for RejectionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RejectionContext")
            .field("pattern_type", &self.pattern_type)
            .field("pattern_name", &self.pattern_name)
            .field("reason", &self.reason)
            .field("message", &self.message)
            .field("metadata", &self.metadata)
            .field("cause", &self.cause.as_ref().map(|c| c.to_string()))
            .finish()
    }
}

/// The error raised on every rejection path.
///
/// Always carries the [`RejectionContext`]. When the owning instance has a
/// transformer or custom error type configured, the produced error is held
/// inside and is what `Display` and `source()` report.
pub struct RejectionError {
    context: RejectionContext,
    error: Option<BoxError>,
}

impl RejectionError {
    /// Creates a generic rejection error from its context.
    pub fn new(context: RejectionContext) -> Self {
        Self {
            context,
            error: None,
        }
    }

    /// Returns the rejection context.
    pub fn context(&self) -> &RejectionContext {
        &self.context
    }

    /// Returns the reason code.
    pub fn reason(&self) -> RejectionReason {
        self.context.reason
    }

    /// Returns the name of the instance that rejected the call.
    pub fn pattern_name(&self) -> &str {
        &self.context.pattern_name
    }

    /// Returns the error produced by a transformer or custom error type.
    pub fn custom_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.error.as_deref()
    }

    /// Downcasts the produced custom error to a concrete type.
    pub fn downcast_ref<T>(&self) -> Option<&T>
    where
        T: std::error::Error + 'static,
    {
        self.error.as_ref().and_then(|e| e.downcast_ref::<T>())
    }

    /// Consumes the rejection, returning the produced custom error if any.
    pub fn into_custom_error(self) -> Option<BoxError> {
        self.error
    }
}

impl fmt::Debug for RejectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RejectionError")
            .field("context", &self.context)
            .field("error", &self.error)
            .finish()
    }
}

impl fmt::Display for RejectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(error) = &self.error {
            return fmt::Display::fmt(error, f);
        }
        match &self.context.cause {
            Some(cause) => write!(
                f,
                "{} '{}' rejected call ({}): {}: {}",
                self.context.pattern_type,
                self.context.pattern_name,
                self.context.reason,
                self.context.message,
                cause
            ),
            None => write!(
                f,
                "{} '{}' rejected call ({}): {}",
                self.context.pattern_type,
                self.context.pattern_name,
                self.context.reason,
                self.context.message
            ),
        }
    }
}

impl std::error::Error for RejectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        if let Some(error) = &self.error {
            return Some(&**error as &(dyn std::error::Error + 'static));
        }
        self.context
            .cause
            .as_deref()
            .map(|c| c as &(dyn std::error::Error + 'static))
    }
}

type Transformer = Arc<dyn Fn(&RejectionContext) -> BoxError + Send + Sync>;
type Callback = Arc<dyn Fn(&RejectionContext) + Send + Sync>;

/// Decides what error value is raised when a primitive rejects a call.
#[derive(Clone, Default)]
pub struct RejectionHandler {
    transformer: Option<Transformer>,
    error_type: Option<Transformer>,
    callback: Option<Callback>,
}

impl RejectionHandler {
    /// Creates a handler that raises generic [`RejectionError`]s.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the raised error from the context with a closure.
    ///
    /// Takes precedence over [`with_error_type`](Self::with_error_type).
    pub fn with_transformer<F, E>(mut self, f: F) -> Self
    where
        F: Fn(&RejectionContext) -> E + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        self.transformer = Some(Arc::new(move |ctx: &RejectionContext| -> BoxError {
            f(ctx).into()
        }));
        self
    }

    /// Raises `T`, constructed from the rejection context.
    pub fn with_error_type<T>(mut self) -> Self
    where
        T: From<RejectionContext> + std::error::Error + Send + Sync + 'static,
    {
        self.error_type = Some(Arc::new(|ctx: &RejectionContext| -> BoxError {
            Box::new(T::from(ctx.clone()))
        }));
        self
    }

    /// Invokes `f` with the full context before the error is raised.
    ///
    /// A panic inside the callback is caught and discarded.
    pub fn with_callback<F>(mut self, f: F) -> Self
    where
        F: Fn(&RejectionContext) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(f));
        self
    }

    /// Returns true if a transformer or custom error type is configured.
    pub fn is_customized(&self) -> bool {
        self.transformer.is_some() || self.error_type.is_some()
    }

    /// Runs the callback and builds the error to raise for `context`.
    pub fn reject(&self, context: RejectionContext) -> RejectionError {
        if let Some(callback) = &self.callback {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback(&context);
            }));
            if outcome.is_err() {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    pattern = %context.pattern_type,
                    name = %context.pattern_name,
                    reason = %context.reason,
                    "rejection callback panicked"
                );
            }
        }

        let error = match (&self.transformer, &self.error_type) {
            (Some(transform), _) => Some(transform(&context)),
            (None, Some(construct)) => Some(construct(&context)),
            (None, None) => None,
        };

        RejectionError { context, error }
    }
}

impl fmt::Debug for RejectionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RejectionHandler")
            .field("transformer", &self.transformer.is_some())
            .field("error_type", &self.error_type.is_some())
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// A common error type for callers composing several admission gates.
///
/// Each primitive crate provides a `From` conversion from its own error type,
/// so `?` works across a stack of gates without hand-written conversions.
#[derive(Debug)]
pub enum AdmissionError<E> {
    /// A gate refused to admit the call.
    Rejected(RejectionError),

    /// The protected operation exceeded its timeout.
    OperationTimeout {
        /// Name of the instance that applied the timeout.
        name: String,
        /// The configured timeout.
        timeout: Duration,
    },

    /// The protected operation itself returned an error.
    Application(E),
}

impl<E> fmt::Display for AdmissionError<E>
where
    E: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionError::Rejected(r) => write!(f, "{}", r),
            AdmissionError::OperationTimeout { name, timeout } => {
                write!(f, "operation in '{}' timed out after {:?}", name, timeout)
            }
            AdmissionError::Application(e) => write!(f, "application error: {}", e),
        }
    }
}

impl<E> std::error::Error for AdmissionError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AdmissionError::Rejected(r) => Some(r),
            AdmissionError::OperationTimeout { .. } => None,
            AdmissionError::Application(e) => Some(e),
        }
    }
}

impl<E> From<RejectionError> for AdmissionError<E> {
    fn from(err: RejectionError) -> Self {
        AdmissionError::Rejected(err)
    }
}

impl<E> AdmissionError<E> {
    /// Returns `true` if a gate rejected the call.
    pub fn is_rejected(&self) -> bool {
        matches!(self, AdmissionError::Rejected(_))
    }

    /// Returns `true` for operation timeouts and timed-out waits.
    pub fn is_timeout(&self) -> bool {
        match self {
            AdmissionError::Rejected(r) => r.reason().is_timeout(),
            AdmissionError::OperationTimeout { .. } => true,
            AdmissionError::Application(_) => false,
        }
    }

    /// Returns `true` if this is an application error.
    pub fn is_application(&self) -> bool {
        matches!(self, AdmissionError::Application(_))
    }

    /// Returns the rejection reason, if a gate rejected the call.
    pub fn rejection_reason(&self) -> Option<RejectionReason> {
        match self {
            AdmissionError::Rejected(r) => Some(r.reason()),
            _ => None,
        }
    }

    /// Extracts the application error, if this is an `Application` variant.
    pub fn application_error(self) -> Option<E> {
        match self {
            AdmissionError::Application(e) => Some(e),
            _ => None,
        }
    }

    /// Maps the application error using a function.
    pub fn map_application<F, T>(self, f: F) -> AdmissionError<T>
    where
        F: FnOnce(E) -> T,
    {
        match self {
            AdmissionError::Rejected(r) => AdmissionError::Rejected(r),
            AdmissionError::OperationTimeout { name, timeout } => {
                AdmissionError::OperationTimeout { name, timeout }
            }
            AdmissionError::Application(e) => AdmissionError::Application(f(e)),
        }
    }
}
