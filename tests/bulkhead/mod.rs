//! Bulkhead tests.
//!
//! Test organization:
//! - concurrency.rs: the concurrency cap under parallel load
//! - waiting.rs: bounded waiting line, timeouts and cancellation
//! - metrics.rs: counters, registry snapshots and resets

mod concurrency;
mod waiting;
