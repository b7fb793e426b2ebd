use crate::{CircuitBreaker, CircuitBreakerConfig, CircuitMetrics, CircuitState, DefaultClassifier};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;
use tower_admission_core::Registry;

/// Shares named circuit breakers across an application.
///
/// Breakers created on demand copy the registry's template configuration
/// (thresholds, classifier, listeners, rejection handler) under their own name.
///
/// ```rust
/// use tower_admission_circuitbreaker::CircuitBreakerRegistry;
/// use std::sync::Arc;
///
/// let registry = CircuitBreakerRegistry::new();
/// let a = registry.get_or_create("payments");
/// let b = registry.get_or_create("payments");
/// assert!(Arc::ptr_eq(&a, &b));
/// assert_eq!(a.name(), "payments");
/// ```
pub struct CircuitBreakerRegistry<C = DefaultClassifier> {
    breakers: Registry<CircuitBreaker<C>>,
    template: CircuitBreakerConfig<C>,
}

impl CircuitBreakerRegistry<DefaultClassifier> {
    /// Creates a registry whose breakers use default settings.
    pub fn new() -> Self {
        Self::with_template(CircuitBreakerConfig::default())
    }
}

impl Default for CircuitBreakerRegistry<DefaultClassifier> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clone> CircuitBreakerRegistry<C> {
    /// Creates a registry whose breakers copy `template`.
    pub fn with_template(template: CircuitBreakerConfig<C>) -> Self {
        Self {
            breakers: Registry::new(),
            template,
        }
    }

    /// Returns the breaker named `name`, creating it from the template if needed.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker<C>> {
        let created = self
            .breakers
            .get_or_try_insert_with(name, || {
                Ok::<_, Infallible>(CircuitBreaker::new(self.template.renamed(name)))
            });
        match created {
            Ok(breaker) => breaker,
            Err(never) => match never {},
        }
    }

    /// Registers a breaker built elsewhere under its own name.
    ///
    /// Replaces any breaker already registered under that name.
    pub fn register(&self, breaker: CircuitBreaker<C>) -> Arc<CircuitBreaker<C>> {
        let breaker = Arc::new(breaker);
        self.breakers
            .insert(breaker.name().to_string(), Arc::clone(&breaker));
        breaker
    }

    /// Returns the breaker named `name`, if registered.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker<C>>> {
        self.breakers.get(name)
    }

    /// Removes the breaker named `name`.
    pub fn remove(&self, name: &str) -> Option<Arc<CircuitBreaker<C>>> {
        self.breakers.remove(name)
    }

    /// Returns the names of all registered breakers, sorted.
    pub fn names(&self) -> Vec<String> {
        self.breakers.names()
    }

    /// Returns a metrics snapshot for every registered breaker.
    pub fn all_metrics(&self) -> BTreeMap<String, CircuitMetrics> {
        self.breakers
            .entries()
            .into_iter()
            .map(|(name, breaker)| (name, breaker.metrics()))
            .collect()
    }

    /// Returns the names of breakers currently in the open state.
    pub fn open_circuits(&self) -> Vec<String> {
        self.breakers
            .entries()
            .into_iter()
            .filter(|(_, breaker)| breaker.state() == CircuitState::Open)
            .map(|(name, _)| name)
            .collect()
    }

    /// Resets every registered breaker.
    pub fn reset_all(&self) {
        for (_, breaker) in self.breakers.entries() {
            breaker.reset();
        }
    }
}

impl<C> std::fmt::Debug for CircuitBreakerRegistry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("breakers", &self.breakers)
            .finish_non_exhaustive()
    }
}
