//! Watermark backpressure for async pipelines.
//!
//! A [`BackpressureManager`] counts pending work items against three limits:
//!
//! - below the **high water mark** every caller is admitted immediately;
//! - once an admission brings the count to the high water mark, backpressure
//!   switches on and new callers wait (up to a timeout) until it switches off;
//! - backpressure only switches off when releases bring the count down to the
//!   **low water mark**, so the gate does not flap around a single threshold;
//! - at **max pending** callers are rejected outright, without waiting.
//!
//! ```rust
//! use tower_admission_backpressure::BackpressureConfig;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let backpressure = BackpressureConfig::builder()
//!     .max_pending(1000)
//!     .high_water_mark(800)
//!     .low_water_mark(200)
//!     .build()
//!     .unwrap();
//!
//! if backpressure.acquire(Some(Duration::from_secs(5))).await {
//!     // process one item
//!     backpressure.release();
//! }
//!
//! // Or let the manager release for you:
//! let processed = backpressure
//!     .execute(None, || async { Ok::<_, std::io::Error>(42) })
//!     .await
//!     .unwrap();
//! assert_eq!(processed, 42);
//! # }
//! ```
//!
//! Waiters are woken together when backpressure switches off and each
//! re-checks capacity, so admission order under contention is not FIFO.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tower_admission_core::{
    BoxError, PatternType, RejectionContext, RejectionError, RejectionReason,
};

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

pub use config::{BackpressureConfig, BackpressureConfigBuilder};
pub use error::BackpressureError;
pub use events::BackpressureEvent;
pub use layer::{BackpressureLayer, BackpressureService};

mod config;
mod error;
mod events;
mod layer;

/// Statistics snapshot of a [`BackpressureManager`].
#[derive(Debug, Clone, PartialEq)]
pub struct BackpressureStats {
    pub name: String,
    pub pending: usize,
    pub max_pending: usize,
    pub high_water_mark: usize,
    pub low_water_mark: usize,
    pub backpressure_active: bool,
    pub total_admitted: u64,
    pub total_rejected: u64,
    /// Pending items as a percentage of `max_pending`.
    pub utilization: f64,
}

/// Watermark-based admission gate.
///
/// Cloning is cheap and clones share the same pending count.
#[derive(Clone)]
pub struct BackpressureManager {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<PressureState>,
    /// Mirrors `PressureState::active`; waiters watch for it to turn false.
    resume: watch::Sender<bool>,
    config: BackpressureConfig,
}

#[derive(Debug, Default)]
struct PressureState {
    pending: usize,
    active: bool,
    total_admitted: u64,
    total_rejected: u64,
}

enum Step {
    Admitted { pending: usize, activated: bool },
    Overloaded { pending: usize },
    Wait,
}

impl BackpressureManager {
    /// Returns a builder with default settings.
    pub fn builder() -> BackpressureConfigBuilder {
        BackpressureConfig::builder()
    }

    /// Creates a manager from a validated configuration.
    pub fn new(config: BackpressureConfig) -> Self {
        let (resume, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(PressureState::default()),
                resume,
                config,
            }),
        }
    }

    /// Returns the manager's name.
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// Returns the manager's configuration.
    pub fn config(&self) -> &BackpressureConfig {
        &self.shared.config
    }

    /// Admits one item, waiting while backpressure is active.
    ///
    /// `timeout` bounds the wait; `None` uses the configured acquire timeout.
    /// Returns `false` if the hard ceiling is reached or the wait times out.
    /// On `true` the caller must call [`release`](Self::release) once done.
    pub async fn acquire(&self, timeout: Option<Duration>) -> bool {
        self.admit(timeout).await.is_ok()
    }

    /// Like [`acquire`](Self::acquire), but returns a permit that releases on drop.
    pub async fn acquire_permit(
        &self,
        timeout: Option<Duration>,
    ) -> Result<BackpressurePermit, RejectionError> {
        self.admit(timeout).await?;
        Ok(BackpressurePermit {
            shared: Arc::clone(&self.shared),
            released: false,
        })
    }

    /// Returns one pending slot. Extra releases are ignored.
    pub fn release(&self) {
        self.shared.release();
    }

    /// Runs `operation` as one pending item, releasing it on every exit path.
    pub async fn execute<F, Fut, T, E>(
        &self,
        timeout: Option<Duration>,
        operation: F,
    ) -> Result<T, BackpressureError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self
            .acquire_permit(timeout)
            .await
            .map_err(BackpressureError::Rejected)?;
        let result = operation().await;
        drop(permit);
        result.map_err(BackpressureError::Inner)
    }

    /// Returns true if the hard ceiling has been reached.
    pub fn is_overloaded(&self) -> bool {
        self.shared.state.lock().pending >= self.shared.config.max_pending
    }

    /// Returns true if pending work is at or above the high water mark.
    pub fn should_apply_backpressure(&self) -> bool {
        self.shared.state.lock().pending >= self.shared.config.high_water_mark
    }

    /// Returns true while callers are being held back.
    pub fn is_backpressure_active(&self) -> bool {
        self.shared.state.lock().active
    }

    /// Returns the number of pending items.
    pub fn pending_count(&self) -> usize {
        self.shared.state.lock().pending
    }

    /// Returns a statistics snapshot.
    pub fn stats(&self) -> BackpressureStats {
        let config = &self.shared.config;
        let state = self.shared.state.lock();
        BackpressureStats {
            name: config.name.clone(),
            pending: state.pending,
            max_pending: config.max_pending,
            high_water_mark: config.high_water_mark,
            low_water_mark: config.low_water_mark,
            backpressure_active: state.active,
            total_admitted: state.total_admitted,
            total_rejected: state.total_rejected,
            utilization: state.pending as f64 / config.max_pending as f64 * 100.0,
        }
    }

    async fn admit(&self, timeout: Option<Duration>) -> Result<(), RejectionError> {
        let shared = &*self.shared;
        let deadline = timeout
            .or(shared.config.acquire_timeout)
            .map(|limit| Instant::now() + limit);
        let mut resume = shared.resume.subscribe();

        loop {
            let step = {
                let mut state = shared.state.lock();
                if state.pending >= shared.config.max_pending {
                    state.total_rejected += 1;
                    Step::Overloaded {
                        pending: state.pending,
                    }
                } else if !state.active {
                    state.pending += 1;
                    state.total_admitted += 1;
                    let activated = state.pending >= shared.config.high_water_mark;
                    if activated {
                        state.active = true;
                        shared.resume.send_replace(true);
                    }
                    Step::Admitted {
                        pending: state.pending,
                        activated,
                    }
                } else {
                    Step::Wait
                }
            };

            match step {
                Step::Admitted { pending, activated } => {
                    shared.publish_admitted(pending, activated);
                    return Ok(());
                }
                Step::Overloaded { pending } => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        backpressure = %shared.config.name,
                        pending,
                        max_pending = shared.config.max_pending,
                        "max pending reached"
                    );
                    return Err(shared.reject(RejectionReason::SystemOverloaded, pending, None));
                }
                Step::Wait => {}
            }

            let cleared = resume.wait_for(|active| !*active);
            let woken: Result<(), BoxError> = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, cleared).await {
                    Ok(woken) => woken.map(|_| ()).map_err(|closed| closed.into()),
                    Err(elapsed) => Err(elapsed.into()),
                },
                None => cleared.await.map(|_| ()).map_err(|closed| closed.into()),
            };

            if let Err(cause) = woken {
                let pending = {
                    let mut state = shared.state.lock();
                    state.total_rejected += 1;
                    state.pending
                };

                #[cfg(feature = "tracing")]
                tracing::warn!(backpressure = %shared.config.name, pending, "timed out waiting for capacity");

                return Err(shared.reject(RejectionReason::AcquireTimeout, pending, Some(cause)));
            }
            // Woken: re-check under the lock, the count may have moved again.
        }
    }
}

impl Shared {
    fn release(&self) {
        let (pending, deactivated) = {
            let mut state = self.state.lock();
            if state.pending == 0 {
                drop(state);
                #[cfg(feature = "tracing")]
                tracing::warn!(backpressure = %self.config.name, "release with nothing pending ignored");
                return;
            }
            state.pending -= 1;
            let deactivated = state.active && state.pending <= self.config.low_water_mark;
            if deactivated {
                state.active = false;
                self.resume.send_replace(false);
            }
            (state.pending, deactivated)
        };

        #[cfg(feature = "metrics")]
        gauge!("backpressure_pending", "backpressure" => self.config.name.clone())
            .set(pending as f64);

        if deactivated {
            #[cfg(feature = "tracing")]
            tracing::info!(
                backpressure = %self.config.name,
                pending,
                low_water_mark = self.config.low_water_mark,
                "backpressure inactive"
            );

            #[cfg(feature = "metrics")]
            gauge!("backpressure_active", "backpressure" => self.config.name.clone()).set(0.0);

            self.config
                .event_listeners
                .emit_with(|| BackpressureEvent::LoadLevelChanged {
                    pattern_name: self.config.name.clone(),
                    timestamp: std::time::Instant::now(),
                    pending,
                    low_water_mark: self.config.low_water_mark,
                    max_pending: self.config.max_pending,
                });
        }
    }

    fn publish_admitted(&self, pending: usize, activated: bool) {
        #[cfg(feature = "metrics")]
        {
            counter!("backpressure_admitted_total", "backpressure" => self.config.name.clone())
                .increment(1);
            gauge!("backpressure_pending", "backpressure" => self.config.name.clone())
                .set(pending as f64);
        }

        if activated {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                backpressure = %self.config.name,
                pending,
                high_water_mark = self.config.high_water_mark,
                "backpressure active"
            );

            #[cfg(feature = "metrics")]
            gauge!("backpressure_active", "backpressure" => self.config.name.clone()).set(1.0);

            self.config
                .event_listeners
                .emit_with(|| BackpressureEvent::ThresholdExceeded {
                    pattern_name: self.config.name.clone(),
                    timestamp: std::time::Instant::now(),
                    pending,
                    high_water_mark: self.config.high_water_mark,
                    max_pending: self.config.max_pending,
                });
        }
    }

    fn reject(
        &self,
        reason: RejectionReason,
        pending: usize,
        cause: Option<BoxError>,
    ) -> RejectionError {
        let config = &self.config;

        #[cfg(feature = "metrics")]
        counter!(
            "backpressure_rejected_total",
            "backpressure" => config.name.clone(),
            "reason" => reason.as_str()
        )
        .increment(1);

        config
            .event_listeners
            .emit_with(|| BackpressureEvent::CallRejected {
                pattern_name: config.name.clone(),
                timestamp: std::time::Instant::now(),
                reason,
                pending,
            });

        let message = match reason {
            RejectionReason::AcquireTimeout => "timed out waiting for backpressure to clear",
            _ => "system overloaded",
        };
        let mut context = RejectionContext::new(
            PatternType::Backpressure,
            config.name.clone(),
            reason,
            message,
        )
        .with_metadata("pending", pending)
        .with_metadata("max_pending", config.max_pending)
        .with_metadata("high_water_mark", config.high_water_mark);
        if let Some(cause) = cause {
            context = context.with_cause(cause);
        }

        config.rejection_handler.reject(context)
    }
}

impl std::fmt::Debug for BackpressureManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackpressureManager")
            .field("name", &self.shared.config.name)
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

/// One admitted item, released when dropped.
#[must_use = "the item is released as soon as the permit is dropped"]
pub struct BackpressurePermit {
    shared: Arc<Shared>,
    released: bool,
}

impl BackpressurePermit {
    /// Releases the item now.
    pub fn release(mut self) {
        self.released = true;
        self.shared.release();
    }
}

impl Drop for BackpressurePermit {
    fn drop(&mut self) {
        if !self.released {
            self.shared.release();
        }
    }
}

impl std::fmt::Debug for BackpressurePermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackpressurePermit")
            .field("manager", &self.shared.config.name)
            .finish()
    }
}
