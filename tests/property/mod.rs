//! Property-based tests for tower-admission gates.
//!
//! Run with: cargo test --test property_tests
//!
//! These tests use proptest to generate random inputs and verify that
//! invariants hold across all gates.

pub mod adaptive;
pub mod backpressure;
pub mod bulkhead;
pub mod circuit_breaker;
