use std::time::Duration;

/// Point-in-time view of a bulkhead's counters.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkheadMetrics {
    pub name: String,
    pub max_concurrent: usize,
    pub max_waiting: usize,
    /// Admitted plus rejected acquisitions.
    pub total_requests: u64,
    /// Executed operations that returned `Ok`.
    pub successful_requests: u64,
    /// Executed operations that returned `Err`.
    pub failed_requests: u64,
    pub rejected_requests: u64,
    pub current_active: usize,
    pub peak_active: usize,
    pub waiting: usize,
    pub total_wait_time: Duration,
    /// Mean wait over admitted acquisitions.
    pub average_wait_time: Duration,
    /// `rejected_requests / total_requests`, zero before the first request.
    pub rejection_rate: f64,
    /// `current_active / max_concurrent`.
    pub utilization: f64,
}

/// Mutable bulkhead state. Guarded by the bulkhead's mutex.
#[derive(Debug, Default)]
pub(crate) struct BulkheadState {
    pub(crate) active: usize,
    pub(crate) waiting: usize,
    peak_active: usize,
    total_requests: u64,
    admitted: u64,
    successful: u64,
    failed: u64,
    rejected: u64,
    total_wait: Duration,
}

impl BulkheadState {
    /// Records an admission. Returns the new active count.
    pub(crate) fn admit(&mut self, waited: Duration) -> usize {
        self.active += 1;
        self.peak_active = self.peak_active.max(self.active);
        self.total_requests += 1;
        self.admitted += 1;
        self.total_wait += waited;
        self.active
    }

    pub(crate) fn reject(&mut self) {
        self.total_requests += 1;
        self.rejected += 1;
    }

    pub(crate) fn record_outcome(&mut self, success: bool) {
        if success {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
    }

    /// Clears the counters. Live occupancy and the peak survive.
    pub(crate) fn reset_counters(&mut self) {
        *self = BulkheadState {
            active: self.active,
            waiting: self.waiting,
            peak_active: self.peak_active,
            ..BulkheadState::default()
        };
    }

    pub(crate) fn snapshot(
        &self,
        name: &str,
        max_concurrent: usize,
        max_waiting: usize,
    ) -> BulkheadMetrics {
        let average_wait_time = if self.admitted == 0 {
            Duration::ZERO
        } else {
            self.total_wait.div_f64(self.admitted as f64)
        };
        let rejection_rate = if self.total_requests == 0 {
            0.0
        } else {
            self.rejected as f64 / self.total_requests as f64
        };

        BulkheadMetrics {
            name: name.to_string(),
            max_concurrent,
            max_waiting,
            total_requests: self.total_requests,
            successful_requests: self.successful,
            failed_requests: self.failed,
            rejected_requests: self.rejected,
            current_active: self.active,
            peak_active: self.peak_active,
            waiting: self.waiting,
            total_wait_time: self.total_wait,
            average_wait_time,
            rejection_rate,
            utilization: self.active as f64 / max_concurrent as f64,
        }
    }
}
