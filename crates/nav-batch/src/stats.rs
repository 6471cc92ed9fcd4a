use serde::{Deserialize, Serialize};

/// Monotonic counters describing scheduler activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// `request_path` calls with a valid agent id
    pub submitted: u64,
    /// Requests that entered the pending queue
    pub queued: u64,
    pub throttled: u64,
    /// Rejected because the agent already had a young request in flight
    pub busy: u64,
    /// Queued while an older request of the same agent was still in flight
    pub superseded: u64,
    pub dispatched_batches: u64,
    pub dispatched_requests: u64,
    /// Slot results read back from harvested batches
    pub solved: u64,
    /// Callbacks invoked, successful or not
    pub delivered: u64,
    /// Callbacks invoked with an empty path
    pub failed: u64,
    /// Results discarded because a newer request superseded them
    pub stale: u64,
    pub dropped_overload: u64,
    pub idle_evicted: u64,
    pub obstacle_updates: u64,
    /// Batches whose worker job never reported back
    pub lost_batches: u64,
}

impl SchedulerStats {
    pub fn summary(&self) -> String {
        format!(
            "Queued: {}, Delivered: {} ({} failed), Stale: {}, Throttled: {}, Busy: {}, Dropped: {}, Batches: {}",
            self.queued,
            self.delivered,
            self.failed,
            self.stale,
            self.throttled,
            self.busy,
            self.dropped_overload,
            self.dispatched_batches
        )
    }
}
