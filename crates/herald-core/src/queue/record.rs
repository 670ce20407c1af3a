//! Reminder job record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::JobStatus;
use crate::domain::{JobId, TaskId, UserId};
use crate::ports::NewReminder;

/// A scheduled future notification for one task.
///
/// All state transitions happen through the methods below; the store decides
/// which ones are allowed from the current status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderJob {
    pub job_id: JobId,
    pub task_id: TaskId,
    pub user_id: UserId,

    /// Due date the job was computed from.
    pub due_date: DateTime<Utc>,

    /// `due_date - lead time`.
    pub fire_at: DateTime<Utc>,

    pub status: JobStatus,

    /// Dispatch attempts that failed so far.
    pub attempts: u32,

    pub last_error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReminderJob {
    pub fn new(job_id: JobId, reminder: NewReminder, now: DateTime<Utc>) -> Self {
        Self {
            job_id,
            task_id: reminder.task_id,
            user_id: reminder.user_id,
            due_date: reminder.due_date,
            fire_at: reminder.fire_at,
            status: JobStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending && self.fire_at <= now
    }

    pub fn claim(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Claimed;
        self.updated_at = now;
    }

    pub fn mark_fired(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Fired;
        self.updated_at = now;
    }

    pub fn mark_failed(&mut self, reason: String, now: DateTime<Utc>) {
        self.status = JobStatus::Failed;
        self.last_error = Some(reason);
        self.updated_at = now;
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Cancelled;
        self.updated_at = now;
    }

    /// Back to Pending with the same fire time; the next poll picks it up again.
    pub fn requeue(&mut self, attempts: u32, now: DateTime<Utc>) {
        self.status = JobStatus::Pending;
        self.attempts = attempts;
        self.updated_at = now;
    }
}
