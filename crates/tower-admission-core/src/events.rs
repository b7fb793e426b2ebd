//! Event system for admission-control primitives.
//!
//! Every primitive owns an [`EventListeners`] collection and emits its own
//! event enum through it. Emission is best-effort: listeners run after the
//! primitive has released its lock, and a panicking listener is caught so it
//! can neither corrupt primitive state nor unwind into the caller.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// The primitive family an event originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternType {
    /// Circuit breaker events.
    CircuitBreaker,
    /// Bulkhead events.
    Bulkhead,
    /// Backpressure gate events.
    Backpressure,
    /// Adaptive concurrency limiter events.
    AdaptiveConcurrency,
}

impl PatternType {
    /// Returns a stable, lowercase label for logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternType::CircuitBreaker => "circuit_breaker",
            PatternType::Bulkhead => "bulkhead",
            PatternType::Backpressure => "backpressure",
            PatternType::AdaptiveConcurrency => "adaptive_concurrency",
        }
    }
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key/value pairs attached to events and rejection contexts.
pub type Metadata = Vec<(&'static str, String)>;

/// Trait for events emitted by admission-control primitives.
pub trait ResilienceEvent: Send + Sync + fmt::Debug {
    /// Returns the primitive family that emitted this event.
    fn pattern_type(&self) -> PatternType;

    /// Returns the type of event (e.g., "state_transition", "slot_acquired").
    fn event_type(&self) -> &'static str;

    /// Returns when this event occurred.
    fn timestamp(&self) -> Instant;

    /// Returns the name of the instance that emitted this event.
    fn pattern_name(&self) -> &str;

    /// Returns event-specific details as key/value pairs.
    fn metadata(&self) -> Metadata {
        Vec::new()
    }
}

/// Trait for listening to events.
pub trait EventListener<E: ResilienceEvent>: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &E);
}

/// Type alias for boxed event listeners.
pub type BoxedEventListener<E> = Arc<dyn EventListener<E>>;

/// A collection of event listeners.
#[derive(Clone)]
pub struct EventListeners<E: ResilienceEvent> {
    listeners: Vec<BoxedEventListener<E>>,
}

impl<E: ResilienceEvent> EventListeners<E> {
    /// Creates a new empty event listener collection.
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    /// Adds a listener to the collection.
    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Emits an event to all registered listeners.
    ///
    /// If a listener panics, the panic is caught and the remaining listeners
    /// are still called.
    pub fn emit(&self, event: &E) {
        for listener in &self.listeners {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event);
            }));

            if outcome.is_err() {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    pattern = %event.pattern_type(),
                    name = event.pattern_name(),
                    event = event.event_type(),
                    "event listener panicked"
                );
            }
        }
    }

    /// Builds and emits an event only when at least one listener is registered.
    ///
    /// Primitives use this on hot paths so that a bare instance never pays
    /// for allocating the event's name or metadata.
    pub fn emit_with<F>(&self, build: F)
    where
        F: FnOnce() -> E,
    {
        if !self.is_empty() {
            self.emit(&build());
        }
    }

    /// Returns true if there are no listeners.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Returns the number of listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}

impl<E: ResilienceEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ResilienceEvent> fmt::Debug for EventListeners<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListeners")
            .field("len", &self.listeners.len())
            .finish()
    }
}

/// A simple function-based event listener.
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _phantom: std::marker::PhantomData<fn(&E)>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    /// Creates a new function-based listener.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: ResilienceEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}
