use serde::{Deserialize, Serialize};

/// Snapshot of job records per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub pending: usize,
    pub claimed: usize,
    pub fired: usize,
    pub cancelled: usize,
    pub failed: usize,
}

impl JobCounts {
    pub fn active(&self) -> usize {
        self.pending + self.claimed
    }

    pub fn total(&self) -> usize {
        self.pending + self.claimed + self.fired + self.cancelled + self.failed
    }
}
