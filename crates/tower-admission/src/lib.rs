//! Admission-control primitives for async Rust and Tower services.
//!
//! `tower-admission` bundles four gates that decide whether work may start,
//! each usable directly or as a Tower layer:
//!
//! - **Circuit Breaker** (`circuitbreaker` feature): stops calling a dependency
//!   after consecutive failures and probes it until it recovers
//! - **Bulkhead** (`bulkhead` feature): caps concurrent calls, with an optional
//!   bounded waiting line
//! - **Backpressure** (`backpressure` feature): high/low watermark gate that
//!   holds callers back while a pipeline drains
//! - **Adaptive** (`adaptive` feature): concurrency limit retuned by AIMD from
//!   reported successes and failures
//!
//! Every gate reports rejections as a [`RejectionError`](core::RejectionError)
//! built through a configurable [`RejectionHandler`](core::RejectionHandler),
//! and publishes events through [`EventListeners`](core::EventListeners).
//! [`AdmissionError`](core::AdmissionError) lets a stack of several gates share
//! one error type.
//!
//! # Usage
//!
//! ```toml
//! [dependencies]
//! tower-admission = { version = "0.9", features = ["circuitbreaker", "bulkhead"] }
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! # #[cfg(all(feature = "circuitbreaker", feature = "bulkhead"))]
//! # {
//! use tower::ServiceBuilder;
//! use tower_admission::{bulkhead::BulkheadConfig, circuitbreaker::CircuitBreakerConfig};
//!
//! # async fn example() {
//! # let my_service = tower::service_fn(|_req: ()| async { Ok::<_, std::io::Error>(()) });
//! let bulkhead_layer = BulkheadConfig::builder()
//!     .max_concurrent(10)
//!     .build_layer()
//!     .unwrap();
//!
//! let breaker_layer = CircuitBreakerConfig::builder()
//!     .failure_threshold(5)
//!     .build_layer()
//!     .unwrap();
//!
//! let _service = ServiceBuilder::new()
//!     .layer(breaker_layer)
//!     .layer(bulkhead_layer)
//!     .service(my_service);
//! # }
//! # }
//! ```

// Re-export core (always available)
pub use tower_admission_core as core;

// Re-export primitives based on features
#[cfg(feature = "adaptive")]
pub use tower_admission_adaptive as adaptive;

#[cfg(feature = "backpressure")]
pub use tower_admission_backpressure as backpressure;

#[cfg(feature = "bulkhead")]
pub use tower_admission_bulkhead as bulkhead;

#[cfg(feature = "circuitbreaker")]
pub use tower_admission_circuitbreaker as circuitbreaker;

pub use tower_admission_core::{AdmissionError, ConfigError, RejectionError, RejectionReason};
