//! Events emitted by the backpressure manager.

use std::time::Instant;
use tower_admission_core::{Metadata, PatternType, RejectionReason, ResilienceEvent};

/// Events emitted by a [`BackpressureManager`](crate::BackpressureManager).
#[derive(Debug, Clone)]
pub enum BackpressureEvent {
    /// Pending work reached the high water mark and backpressure switched on.
    ThresholdExceeded {
        pattern_name: String,
        timestamp: Instant,
        pending: usize,
        high_water_mark: usize,
        max_pending: usize,
    },
    /// Pending work drained to the low water mark and backpressure switched off.
    LoadLevelChanged {
        pattern_name: String,
        timestamp: Instant,
        pending: usize,
        low_water_mark: usize,
        max_pending: usize,
    },
    /// A caller was turned away.
    CallRejected {
        pattern_name: String,
        timestamp: Instant,
        reason: RejectionReason,
        pending: usize,
    },
}

impl ResilienceEvent for BackpressureEvent {
    fn pattern_type(&self) -> PatternType {
        PatternType::Backpressure
    }

    fn event_type(&self) -> &'static str {
        match self {
            BackpressureEvent::ThresholdExceeded { .. } => "threshold_exceeded",
            BackpressureEvent::LoadLevelChanged { .. } => "load_level_change",
            BackpressureEvent::CallRejected { .. } => "call_rejected",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            BackpressureEvent::ThresholdExceeded { timestamp, .. }
            | BackpressureEvent::LoadLevelChanged { timestamp, .. }
            | BackpressureEvent::CallRejected { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            BackpressureEvent::ThresholdExceeded { pattern_name, .. }
            | BackpressureEvent::LoadLevelChanged { pattern_name, .. }
            | BackpressureEvent::CallRejected { pattern_name, .. } => pattern_name,
        }
    }

    fn metadata(&self) -> Metadata {
        match self {
            BackpressureEvent::ThresholdExceeded {
                pending,
                high_water_mark,
                max_pending,
                ..
            } => vec![
                ("load_level", "high".to_string()),
                ("pending", pending.to_string()),
                ("high_water_mark", high_water_mark.to_string()),
                ("max_pending", max_pending.to_string()),
            ],
            BackpressureEvent::LoadLevelChanged {
                pending,
                low_water_mark,
                max_pending,
                ..
            } => vec![
                ("load_level", "normal".to_string()),
                ("pending", pending.to_string()),
                ("low_water_mark", low_water_mark.to_string()),
                ("max_pending", max_pending.to_string()),
            ],
            BackpressureEvent::CallRejected {
                reason, pending, ..
            } => vec![
                ("reason", reason.as_str().to_string()),
                ("pending", pending.to_string()),
            ],
        }
    }
}
