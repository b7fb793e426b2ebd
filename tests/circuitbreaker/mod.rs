//! Circuit breaker tests.
//!
//! Test organization:
//! - thresholds.rs: consecutive-failure opening and streak resets
//! - half_open.rs: recovery timing, probe slots and closing
//! - layer.rs: Tower integration, classifiers and timeouts
//! - registry.rs: named breakers created from a template

mod half_open;
mod registry;
mod thresholds;
