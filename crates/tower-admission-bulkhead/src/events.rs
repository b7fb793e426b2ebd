//! Events emitted by the bulkhead.

use std::time::{Duration, Instant};
use tower_admission_core::{Metadata, PatternType, RejectionReason, ResilienceEvent};

/// Events emitted by a [`Bulkhead`](crate::Bulkhead).
#[derive(Debug, Clone)]
pub enum BulkheadEvent {
    /// A caller obtained a slot.
    SlotAcquired {
        pattern_name: String,
        timestamp: Instant,
        active: usize,
        /// How long the caller waited; zero on the fast path.
        wait_time: Duration,
    },
    /// A slot was returned.
    SlotReleased {
        pattern_name: String,
        timestamp: Instant,
        active: usize,
    },
    /// A caller was rejected (capacity full, waiting line full, or wait timeout).
    BulkheadFull {
        pattern_name: String,
        timestamp: Instant,
        reason: RejectionReason,
        active: usize,
        waiting: usize,
        max_concurrent: usize,
        max_waiting: usize,
    },
}

impl ResilienceEvent for BulkheadEvent {
    fn pattern_type(&self) -> PatternType {
        PatternType::Bulkhead
    }

    fn event_type(&self) -> &'static str {
        match self {
            BulkheadEvent::SlotAcquired { .. } => "slot_acquired",
            BulkheadEvent::SlotReleased { .. } => "slot_released",
            BulkheadEvent::BulkheadFull { .. } => "bulkhead_full",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            BulkheadEvent::SlotAcquired { timestamp, .. }
            | BulkheadEvent::SlotReleased { timestamp, .. }
            | BulkheadEvent::BulkheadFull { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            BulkheadEvent::SlotAcquired { pattern_name, .. }
            | BulkheadEvent::SlotReleased { pattern_name, .. }
            | BulkheadEvent::BulkheadFull { pattern_name, .. } => pattern_name,
        }
    }

    fn metadata(&self) -> Metadata {
        match self {
            BulkheadEvent::SlotAcquired {
                active, wait_time, ..
            } => vec![
                ("active", active.to_string()),
                ("wait_time_ms", wait_time.as_millis().to_string()),
            ],
            BulkheadEvent::SlotReleased { active, .. } => vec![("active", active.to_string())],
            BulkheadEvent::BulkheadFull {
                reason,
                active,
                waiting,
                max_concurrent,
                max_waiting,
                ..
            } => vec![
                ("reason", reason.as_str().to_string()),
                ("active", active.to_string()),
                ("waiting", waiting.to_string()),
                ("max_concurrent", max_concurrent.to_string()),
                ("max_waiting", max_waiting.to_string()),
            ],
        }
    }
}
