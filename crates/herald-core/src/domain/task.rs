//! Task / User - ストレージが所有するレコードの読み取りビュー
//!
//! herald はこれらを書き換えない。reminder の要否判定と通知ペイロードの
//! 組み立てのためにだけ読む。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{TaskId, UserId};

/// Task snapshot as committed by the request-handling layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub user_id: UserId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed: bool,
}

impl Task {
    pub fn new(id: TaskId, user_id: UserId, title: impl Into<String>) -> Self {
        Self {
            id,
            user_id,
            title: title.into(),
            description: String::new(),
            due_date: None,
            completed: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_due_date(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn completed(mut self) -> Self {
        self.completed = true;
        self
    }
}

/// Owner of tasks. Only existence matters to the worker; the rest is for logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: String,
}

impl User {
    pub fn new(id: UserId, email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            name: name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn task_deserializes_from_storage_json() {
        let json = serde_json::json!({
            "id": 3,
            "userId": 9,
            "title": "write report",
            "description": "q3",
            "dueDate": "2024-01-01T12:00:00Z",
            "completed": false,
        });
        let task: Task = serde_json::from_value(json).unwrap();
        assert_eq!(task.id, TaskId::new(3));
        assert_eq!(task.user_id, UserId::new(9));
        assert_eq!(
            task.due_date,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn missing_optional_fields_default() {
        let json = serde_json::json!({ "id": 1, "userId": 1, "title": "t" });
        let task: Task = serde_json::from_value(json).unwrap();
        assert!(task.due_date.is_none());
        assert!(!task.completed);
        assert!(task.description.is_empty());
    }
}
