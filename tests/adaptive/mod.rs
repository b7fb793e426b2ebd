//! Adaptive concurrency limiter tests.
//!
//! Test organization:
//! - aimd.rs: window-driven increases and decreases
//! - concurrency.rs: in-flight bounds, permits and the Tower layer

mod aimd;
mod concurrency;
