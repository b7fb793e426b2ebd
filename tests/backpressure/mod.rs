//! Backpressure tests.
//!
//! Test organization:
//! - watermarks.rs: activation at the high mark, hysteresis down to the low mark
//! - waiting.rs: held-back callers, timeouts and the Tower layer
