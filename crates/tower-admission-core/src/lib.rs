//! Core infrastructure for tower-admission.
//!
//! This crate provides shared functionality used by every admission-control
//! primitive:
//! - Event system for observability
//! - Rejection error construction (reason codes, transformers, callbacks)
//! - Windowed AIMD controller
//! - Registry for sharing named instances

pub mod aimd;
pub mod error;
pub mod events;
pub mod registry;

pub use aimd::{AimdConfig, AimdController};
pub use error::{
    AdmissionError, BoxError, ConfigError, RejectionContext, RejectionError, RejectionHandler,
    RejectionReason,
};
pub use events::{EventListener, EventListeners, FnListener, Metadata, PatternType, ResilienceEvent};
pub use registry::Registry;
