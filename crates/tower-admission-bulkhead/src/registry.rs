use crate::{Bulkhead, BulkheadConfig, BulkheadMetrics};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;
use tower_admission_core::Registry;

/// Shares named bulkheads across an application.
///
/// Bulkheads created on demand copy the registry's template configuration
/// under their own name.
///
/// ```rust
/// use tower_admission_bulkhead::{BulkheadConfig, BulkheadRegistry};
///
/// let template = BulkheadConfig::builder().max_concurrent(4).build_config().unwrap();
/// let registry = BulkheadRegistry::with_template(template);
///
/// let reports = registry.get_or_create("reports");
/// assert_eq!(reports.config().max_concurrent(), 4);
/// assert_eq!(registry.names(), vec!["reports".to_string()]);
/// ```
#[derive(Debug)]
pub struct BulkheadRegistry {
    bulkheads: Registry<Bulkhead>,
    template: BulkheadConfig,
}

impl BulkheadRegistry {
    /// Creates a registry whose bulkheads use default settings.
    pub fn new() -> Self {
        Self::with_template(BulkheadConfig::default())
    }

    /// Creates a registry whose bulkheads copy `template`.
    pub fn with_template(template: BulkheadConfig) -> Self {
        Self {
            bulkheads: Registry::new(),
            template,
        }
    }

    /// Returns the bulkhead named `name`, creating it from the template if needed.
    pub fn get_or_create(&self, name: &str) -> Arc<Bulkhead> {
        let created = self.bulkheads.get_or_try_insert_with(name, || {
            Ok::<_, Infallible>(Bulkhead::new(self.template.renamed(name)))
        });
        match created {
            Ok(bulkhead) => bulkhead,
            Err(never) => match never {},
        }
    }

    /// Registers a bulkhead built elsewhere under its own name, replacing any existing one.
    pub fn register(&self, bulkhead: Bulkhead) -> Arc<Bulkhead> {
        let bulkhead = Arc::new(bulkhead);
        self.bulkheads
            .insert(bulkhead.name().to_string(), Arc::clone(&bulkhead));
        bulkhead
    }

    /// Returns the bulkhead named `name`, if registered.
    pub fn get(&self, name: &str) -> Option<Arc<Bulkhead>> {
        self.bulkheads.get(name)
    }

    /// Removes the bulkhead named `name`.
    pub fn remove(&self, name: &str) -> Option<Arc<Bulkhead>> {
        self.bulkheads.remove(name)
    }

    /// Returns the names of all registered bulkheads, sorted.
    pub fn names(&self) -> Vec<String> {
        self.bulkheads.names()
    }

    /// Returns a metrics snapshot for every registered bulkhead.
    pub fn all_metrics(&self) -> BTreeMap<String, BulkheadMetrics> {
        self.bulkheads
            .entries()
            .into_iter()
            .map(|(name, bulkhead)| (name, bulkhead.metrics()))
            .collect()
    }

    /// Resets the counters of every registered bulkhead.
    pub fn reset_all_metrics(&self) {
        for (_, bulkhead) in self.bulkheads.entries() {
            bulkhead.reset_metrics();
        }
    }
}

impl Default for BulkheadRegistry {
    fn default() -> Self {
        Self::new()
    }
}
