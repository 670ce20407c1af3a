//! Reminder job state machine.

use serde::{Deserialize, Serialize};

/// Job status.
///
/// State transitions:
/// - Pending -> Claimed -> Fired
/// - Pending -> Claimed -> Pending (publish failed, retries left)
/// - Pending -> Claimed -> Failed (retries exhausted, or task/user gone)
/// - Pending | Claimed -> Cancelled (task deleted, completed, due date cleared or changed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    /// Waiting for its fire time.
    Pending,

    /// Taken out of the pollable set by a poll cycle; dispatch in flight.
    Claimed,

    /// Notification published.
    Fired,

    /// Superseded or withdrawn by the scheduler.
    Cancelled,

    /// Gave up (retries exhausted or referenced data missing).
    Failed,
}

impl JobStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Fired | JobStatus::Cancelled | JobStatus::Failed
        )
    }

    /// Does this job still count as the task's reminder?
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Claimed)
    }
}
