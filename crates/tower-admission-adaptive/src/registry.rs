use crate::{AdaptiveConcurrencyLimiter, AdaptiveLimiterConfig, AdaptiveStats};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::convert::Infallible;
use tower_admission_core::Registry;

/// Shares named adaptive limiters across an application.
///
/// ```rust
/// use tower_admission_adaptive::{AdaptiveLimiterConfig, AdaptiveLimiterRegistry};
///
/// let template = AdaptiveLimiterConfig::builder()
///     .initial_limit(50)
///     .build_config()
///     .unwrap();
/// let registry = AdaptiveLimiterRegistry::with_template(template);
///
/// let search = registry.get_or_create("search");
/// assert_eq!(search.limit(), 50);
/// assert_eq!(search.name(), "search");
/// ```
#[derive(Debug)]
pub struct AdaptiveLimiterRegistry {
    limiters: Registry<AdaptiveConcurrencyLimiter>,
    template: AdaptiveLimiterConfig,
}

impl AdaptiveLimiterRegistry {
    /// Creates a registry whose limiters use default settings.
    pub fn new() -> Self {
        Self::with_template(AdaptiveLimiterConfig::default())
    }

    /// Creates a registry whose limiters copy `template`.
    pub fn with_template(template: AdaptiveLimiterConfig) -> Self {
        Self {
            limiters: Registry::new(),
            template,
        }
    }

    /// Returns the limiter named `name`, creating it from the template if needed.
    pub fn get_or_create(&self, name: &str) -> Arc<AdaptiveConcurrencyLimiter> {
        let created = self.limiters.get_or_try_insert_with(name, || {
            Ok::<_, Infallible>(AdaptiveConcurrencyLimiter::new(self.template.renamed(name)))
        });
        match created {
            Ok(limiter) => limiter,
            Err(never) => match never {},
        }
    }

    /// Registers a limiter built elsewhere under its own name, replacing any existing one.
    pub fn register(&self, limiter: AdaptiveConcurrencyLimiter) -> Arc<AdaptiveConcurrencyLimiter> {
        let limiter = Arc::new(limiter);
        self.limiters
            .insert(limiter.name().to_string(), Arc::clone(&limiter));
        limiter
    }

    /// Returns the limiter named `name`, if registered.
    pub fn get(&self, name: &str) -> Option<Arc<AdaptiveConcurrencyLimiter>> {
        self.limiters.get(name)
    }

    /// Removes the limiter named `name`.
    pub fn remove(&self, name: &str) -> Option<Arc<AdaptiveConcurrencyLimiter>> {
        self.limiters.remove(name)
    }

    /// Returns the names of all registered limiters, sorted.
    pub fn names(&self) -> Vec<String> {
        self.limiters.names()
    }

    /// Returns a statistics snapshot for every registered limiter.
    pub fn all_stats(&self) -> BTreeMap<String, AdaptiveStats> {
        self.limiters
            .entries()
            .into_iter()
            .map(|(name, limiter)| (name, limiter.stats()))
            .collect()
    }
}

impl Default for AdaptiveLimiterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
