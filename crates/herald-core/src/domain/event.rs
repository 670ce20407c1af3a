//! NotificationEvent - worker が publish し、bridge が接続に配る通知
//!
//! 永続化されない。識別子を持たないので、再配送はクライアント側で冪等に表示される前提。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{TaskId, UserId};
use super::task::Task;
use crate::error::HeraldError;

/// Wire shape: `{"userId": int, "taskId": int, "title": string, "dueDate": ISO-8601}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub user_id: UserId,
    pub task_id: TaskId,
    pub title: String,
    pub due_date: DateTime<Utc>,
}

impl NotificationEvent {
    /// Build the reminder for `task`.
    ///
    /// `scheduled_due` is the due date the reminder was computed from; it is
    /// used when the task's due date was cleared after the reminder was claimed.
    pub fn for_task(task: &Task, scheduled_due: DateTime<Utc>) -> Self {
        Self {
            user_id: task.user_id,
            task_id: task.id,
            title: task.title.clone(),
            due_date: task.due_date.unwrap_or(scheduled_due),
        }
    }

    pub fn to_payload(&self) -> Result<String, HeraldError> {
        serde_json::to_string(self).map_err(|e| HeraldError::MalformedPayload(e.to_string()))
    }

    pub fn from_payload(payload: &str) -> Result<Self, HeraldError> {
        serde_json::from_str(payload).map_err(|e| HeraldError::MalformedPayload(e.to_string()))
    }
}
