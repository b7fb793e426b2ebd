//! Events emitted by the adaptive limiter.

use std::time::Instant;
use tower_admission_core::aimd::Adjustment;
use tower_admission_core::{Metadata, PatternType, ResilienceEvent};

/// Events emitted by an [`AdaptiveConcurrencyLimiter`](crate::AdaptiveConcurrencyLimiter).
#[derive(Debug, Clone)]
pub enum AdaptiveEvent {
    /// A measurement window moved the limit.
    ///
    /// Windows that leave the limit where it was emit nothing.
    LimitChanged {
        pattern_name: String,
        timestamp: Instant,
        previous_limit: usize,
        new_limit: usize,
        success_rate: f64,
        adjustment: Adjustment,
    },
    /// A caller arrived while every slot under the current limit was taken.
    LimitReached {
        pattern_name: String,
        timestamp: Instant,
        active: usize,
        limit: usize,
    },
}

impl ResilienceEvent for AdaptiveEvent {
    fn pattern_type(&self) -> PatternType {
        PatternType::AdaptiveConcurrency
    }

    fn event_type(&self) -> &'static str {
        match self {
            AdaptiveEvent::LimitChanged { .. } => "load_level_change",
            AdaptiveEvent::LimitReached { .. } => "threshold_exceeded",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            AdaptiveEvent::LimitChanged { timestamp, .. }
            | AdaptiveEvent::LimitReached { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            AdaptiveEvent::LimitChanged { pattern_name, .. }
            | AdaptiveEvent::LimitReached { pattern_name, .. } => pattern_name,
        }
    }

    fn metadata(&self) -> Metadata {
        match self {
            AdaptiveEvent::LimitChanged {
                previous_limit,
                new_limit,
                success_rate,
                adjustment,
                ..
            } => {
                let direction = match adjustment {
                    Adjustment::Increase => "increased",
                    Adjustment::Decrease => "decreased",
                    Adjustment::Hold => "held",
                };
                vec![
                    (
                        "load_level",
                        format!("{direction}:{previous_limit}->{new_limit}"),
                    ),
                    ("success_rate", format!("{success_rate:.4}")),
                ]
            }
            AdaptiveEvent::LimitReached { active, limit, .. } => vec![
                ("active", active.to_string()),
                ("limit", limit.to_string()),
            ],
        }
    }
}
