//! Named-instance registry.
//!
//! Applications that want to share one breaker, bulkhead or limiter per
//! downstream dependency create a registry and pass it around explicitly.
//! There is no process-wide global.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

const DEFAULT_REGISTRY_CAPACITY: usize = 16;

/// Map of names to shared instances.
pub struct Registry<T> {
    entries: RwLock<HashMap<String, Arc<T>>>,
}

impl<T> Registry<T> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::with_capacity(DEFAULT_REGISTRY_CAPACITY)),
        }
    }

    /// Returns the instance registered under `name`, if any.
    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        self.entries.read().get(name).cloned()
    }

    /// Returns the instance under `name`, creating it with `create` if absent.
    ///
    /// `create` runs at most once per name, even under concurrent callers.
    pub fn get_or_try_insert_with<F, E>(&self, name: &str, create: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        // Fast path: read lock
        if let Some(existing) = self.entries.read().get(name) {
            return Ok(Arc::clone(existing));
        }

        // Slow path: write lock, re-check before creating
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(name) {
            return Ok(Arc::clone(existing));
        }
        let created = Arc::new(create()?);
        entries.insert(name.to_string(), Arc::clone(&created));
        Ok(created)
    }

    /// Registers `instance` under `name`, replacing and returning any previous entry.
    pub fn insert(&self, name: impl Into<String>, instance: Arc<T>) -> Option<Arc<T>> {
        self.entries.write().insert(name.into(), instance)
    }

    /// Removes and returns the instance under `name`.
    pub fn remove(&self, name: &str) -> Option<Arc<T>> {
        self.entries.write().remove(name)
    }

    /// Returns all registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns a sorted snapshot of every entry.
    ///
    /// The registry lock is released before the caller touches the instances.
    pub fn entries(&self) -> Vec<(String, Arc<T>)> {
        let mut entries: Vec<(String, Arc<T>)> = self
            .entries
            .read()
            .iter()
            .map(|(name, instance)| (name.clone(), Arc::clone(instance)))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Number of registered instances.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("names", &self.names())
            .finish()
    }
}
