//! Bulkhead admission control.
//!
//! A bulkhead caps how many calls may use a resource at once. Once every slot
//! is taken, up to `max_waiting` further callers queue for a slot (optionally
//! bounded by `timeout`); anyone beyond that is rejected immediately.
//!
//! # Basic Example
//!
//! ```rust
//! use tower_admission_bulkhead::BulkheadConfig;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let bulkhead = BulkheadConfig::builder()
//!     .name("db-pool")
//!     .max_concurrent(10)
//!     .max_waiting(20)
//!     .timeout(Some(Duration::from_secs(2)))
//!     .build()
//!     .unwrap();
//!
//! let rows = bulkhead
//!     .execute(|| async { Ok::<_, std::io::Error>(vec![1, 2, 3]) })
//!     .await
//!     .unwrap();
//! assert_eq!(rows.len(), 3);
//! # }
//! ```
//!
//! # Permits
//!
//! [`Bulkhead::acquire`] hands out a [`BulkheadPermit`] that returns its slot
//! when dropped, so a slot is never leaked by an early return, a panic or a
//! cancelled future. [`Bulkhead::try_acquire`] and [`Bulkhead::release`] are
//! the manual equivalent for callers that track slots themselves.
//!
//! # Error Handling
//!
//! Rejections carry a [`RejectionReason`]: `CapacityFull` when every slot is
//! taken and no waiting is allowed, `QueueFull` when the waiting line is full,
//! and `WaitTimeout` when a waiting caller gives up.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tower_admission_core::{PatternType, RejectionContext, RejectionError, RejectionReason};

#[cfg(feature = "metrics")]
use metrics::{counter, gauge, histogram};

pub use config::{BulkheadConfig, BulkheadConfigBuilder};
pub use error::BulkheadError;
pub use events::BulkheadEvent;
pub use layer::{BulkheadLayer, BulkheadService};
pub use registry::BulkheadRegistry;
pub use state::BulkheadMetrics;

mod config;
mod error;
mod events;
mod layer;
mod registry;
mod state;

use state::BulkheadState;

/// A bulkhead limiting concurrent access to one resource.
///
/// Cloning is cheap and clones share the same slots.
#[derive(Clone)]
pub struct Bulkhead {
    shared: Arc<Shared>,
}

struct Shared {
    semaphore: Semaphore,
    state: Mutex<BulkheadState>,
    config: BulkheadConfig,
}

enum Entry {
    Acquired { active: usize },
    Rejected(Rejection),
    Queued,
}

struct Rejection {
    reason: RejectionReason,
    active: usize,
    waiting: usize,
}

impl Bulkhead {
    /// Returns a builder with default settings.
    pub fn builder() -> BulkheadConfigBuilder {
        BulkheadConfig::builder()
    }

    /// Creates a bulkhead from a validated configuration.
    pub fn new(config: BulkheadConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                semaphore: Semaphore::new(config.max_concurrent),
                state: Mutex::new(BulkheadState::default()),
                config,
            }),
        }
    }

    /// Returns the bulkhead's name.
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// Returns the bulkhead's configuration.
    pub fn config(&self) -> &BulkheadConfig {
        &self.shared.config
    }

    /// Waits for a slot using the configured timeout.
    pub async fn acquire(&self) -> Result<BulkheadPermit, RejectionError> {
        self.acquire_slot(self.shared.config.timeout).await?;
        Ok(BulkheadPermit {
            shared: Arc::clone(&self.shared),
            released: false,
        })
    }

    /// Takes a slot without handing out a permit.
    ///
    /// `timeout` overrides the configured wait timeout when set. On `true`
    /// the caller owns a slot and must return it with [`release`](Self::release).
    pub async fn try_acquire(&self, timeout: Option<Duration>) -> bool {
        self.acquire_slot(timeout.or(self.shared.config.timeout))
            .await
            .is_ok()
    }

    /// Returns a slot taken with [`try_acquire`](Self::try_acquire).
    ///
    /// Releasing when no slot is held is ignored.
    pub fn release(&self) {
        self.shared.release_slot();
    }

    /// Runs `operation` inside a slot.
    ///
    /// The slot is returned on every exit path, including cancellation of the
    /// returned future. `Ok` and `Err` results are counted as successful and
    /// failed requests.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, BulkheadError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.acquire().await.map_err(BulkheadError::Rejected)?;
        let result = operation().await;
        self.shared.record_outcome(result.is_ok());
        drop(permit);
        result.map_err(BulkheadError::Inner)
    }

    /// Returns true if every slot is taken.
    pub fn is_full(&self) -> bool {
        self.shared.semaphore.available_permits() == 0
    }

    /// Returns the number of free slots.
    pub fn available_slots(&self) -> usize {
        self.shared.semaphore.available_permits()
    }

    /// Returns the number of calls holding a slot.
    pub fn active_count(&self) -> usize {
        self.shared.state.lock().active
    }

    /// Returns the number of calls waiting for a slot.
    pub fn waiting_count(&self) -> usize {
        self.shared.state.lock().waiting
    }

    /// Returns a metrics snapshot.
    pub fn metrics(&self) -> BulkheadMetrics {
        let config = &self.shared.config;
        self.shared
            .state
            .lock()
            .snapshot(&config.name, config.max_concurrent, config.max_waiting)
    }

    /// Clears request counters and wait times, keeping live occupancy and the peak.
    pub fn reset_metrics(&self) {
        self.shared.state.lock().reset_counters();
    }

    async fn acquire_slot(&self, timeout: Option<Duration>) -> Result<(), RejectionError> {
        let shared = &*self.shared;

        let entry = {
            let mut state = shared.state.lock();
            if let Ok(permit) = shared.semaphore.try_acquire() {
                permit.forget();
                Entry::Acquired {
                    active: state.admit(Duration::ZERO),
                }
            } else if state.waiting >= shared.config.max_waiting {
                state.reject();
                let reason = if shared.config.max_waiting == 0 {
                    RejectionReason::CapacityFull
                } else {
                    RejectionReason::QueueFull
                };
                Entry::Rejected(Rejection {
                    reason,
                    active: state.active,
                    waiting: state.waiting,
                })
            } else {
                state.waiting += 1;
                Entry::Queued
            }
        };

        match entry {
            Entry::Acquired { active } => {
                shared.publish_acquired(active, Duration::ZERO);
                return Ok(());
            }
            Entry::Rejected(rejection) => return Err(shared.reject(rejection, None)),
            Entry::Queued => {}
        }

        #[cfg(feature = "metrics")]
        gauge!("bulkhead_waiting_calls", "bulkhead" => shared.config.name.clone()).increment(1.0);

        let mut queued = WaitingGuard {
            shared,
            armed: true,
        };
        let started = Instant::now();

        // FIFO only from here on: a slot freed before this task reaches the
        // semaphore queue can go to a fast-path caller.
        let acquired = match timeout {
            Some(limit) => tokio::time::timeout(limit, shared.semaphore.acquire()).await,
            None => Ok(shared.semaphore.acquire().await),
        };

        match acquired {
            Ok(Ok(permit)) => {
                permit.forget();
                let waited = started.elapsed();
                let active = {
                    let mut state = shared.state.lock();
                    queued.disarm(&mut state);
                    state.admit(waited)
                };
                shared.publish_acquired(active, waited);
                Ok(())
            }
            Ok(Err(closed)) => {
                let rejection = shared.reject_waiter(&mut queued, RejectionReason::CapacityFull);
                Err(shared.reject(rejection, Some(closed.into())))
            }
            Err(elapsed) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(bulkhead = %shared.config.name, ?timeout, "timed out waiting for a slot");

                let rejection = shared.reject_waiter(&mut queued, RejectionReason::WaitTimeout);
                Err(shared.reject(rejection, Some(elapsed.into())))
            }
        }
    }
}

impl Shared {
    fn release_slot(&self) {
        let active = {
            let mut state = self.state.lock();
            if state.active == 0 {
                drop(state);
                #[cfg(feature = "tracing")]
                tracing::warn!(bulkhead = %self.config.name, "release without a held slot ignored");
                return;
            }
            state.active -= 1;
            self.semaphore.add_permits(1);
            state.active
        };

        #[cfg(feature = "metrics")]
        gauge!("bulkhead_concurrent_calls", "bulkhead" => self.config.name.clone())
            .set(active as f64);

        self.config
            .event_listeners
            .emit_with(|| BulkheadEvent::SlotReleased {
                pattern_name: self.config.name.clone(),
                timestamp: std::time::Instant::now(),
                active,
            });
    }

    fn record_outcome(&self, success: bool) {
        self.state.lock().record_outcome(success);

        #[cfg(feature = "metrics")]
        counter!(
            "bulkhead_calls_finished_total",
            "bulkhead" => self.config.name.clone(),
            "outcome" => if success { "success" } else { "failure" }
        )
        .increment(1);
    }

    fn reject_waiter(&self, queued: &mut WaitingGuard<'_>, reason: RejectionReason) -> Rejection {
        let mut state = self.state.lock();
        queued.disarm(&mut state);
        state.reject();
        Rejection {
            reason,
            active: state.active,
            waiting: state.waiting,
        }
    }

    fn publish_acquired(&self, active: usize, wait_time: Duration) {
        #[cfg(feature = "tracing")]
        tracing::trace!(bulkhead = %self.config.name, active, ?wait_time, "slot acquired");

        #[cfg(feature = "metrics")]
        {
            counter!("bulkhead_calls_permitted_total", "bulkhead" => self.config.name.clone())
                .increment(1);
            gauge!("bulkhead_concurrent_calls", "bulkhead" => self.config.name.clone())
                .set(active as f64);
            histogram!("bulkhead_wait_duration_seconds", "bulkhead" => self.config.name.clone())
                .record(wait_time.as_secs_f64());
        }

        self.config
            .event_listeners
            .emit_with(|| BulkheadEvent::SlotAcquired {
                pattern_name: self.config.name.clone(),
                timestamp: std::time::Instant::now(),
                active,
                wait_time,
            });
    }

    fn reject(
        &self,
        rejection: Rejection,
        cause: Option<tower_admission_core::BoxError>,
    ) -> RejectionError {
        let Rejection {
            reason,
            active,
            waiting,
        } = rejection;
        let config = &self.config;

        #[cfg(feature = "tracing")]
        tracing::debug!(bulkhead = %config.name, %reason, active, waiting, "bulkhead rejected call");

        #[cfg(feature = "metrics")]
        counter!(
            "bulkhead_calls_rejected_total",
            "bulkhead" => config.name.clone(),
            "reason" => reason.as_str()
        )
        .increment(1);

        config
            .event_listeners
            .emit_with(|| BulkheadEvent::BulkheadFull {
                pattern_name: config.name.clone(),
                timestamp: std::time::Instant::now(),
                reason,
                active,
                waiting,
                max_concurrent: config.max_concurrent,
                max_waiting: config.max_waiting,
            });

        let message = match reason {
            RejectionReason::WaitTimeout => "timed out waiting for a slot",
            RejectionReason::QueueFull => "all slots are taken and the waiting line is full",
            _ => "all slots are taken",
        };
        let mut context =
            RejectionContext::new(PatternType::Bulkhead, config.name.clone(), reason, message)
                .with_metadata("active", active)
                .with_metadata("waiting", waiting)
                .with_metadata("max_concurrent", config.max_concurrent)
                .with_metadata("max_waiting", config.max_waiting);
        if let Some(cause) = cause {
            context = context.with_cause(cause);
        }

        config.rejection_handler.reject(context)
    }
}

impl std::fmt::Debug for Bulkhead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bulkhead")
            .field("name", &self.shared.config.name)
            .field("max_concurrent", &self.shared.config.max_concurrent)
            .field("available_slots", &self.available_slots())
            .finish_non_exhaustive()
    }
}

/// Leaves the waiting line when a waiter is dropped mid-wait.
struct WaitingGuard<'a> {
    shared: &'a Shared,
    armed: bool,
}

impl WaitingGuard<'_> {
    fn disarm(&mut self, state: &mut BulkheadState) {
        if self.armed {
            self.armed = false;
            state.waiting = state.waiting.saturating_sub(1);

            #[cfg(feature = "metrics")]
            gauge!("bulkhead_waiting_calls", "bulkhead" => self.shared.config.name.clone())
                .decrement(1.0);
        }
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let shared = self.shared;
            let mut state = shared.state.lock();
            self.disarm(&mut state);
        }
    }
}

/// A held bulkhead slot, returned when dropped.
#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct BulkheadPermit {
    shared: Arc<Shared>,
    released: bool,
}

impl BulkheadPermit {
    /// Returns the slot now.
    pub fn release(mut self) {
        self.released = true;
        self.shared.release_slot();
    }
}

impl Drop for BulkheadPermit {
    fn drop(&mut self) {
        if !self.released {
            self.shared.release_slot();
        }
    }
}

impl std::fmt::Debug for BulkheadPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkheadPermit")
            .field("bulkhead", &self.shared.config.name)
            .finish()
    }
}
