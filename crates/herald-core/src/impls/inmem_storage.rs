//! InMemoryTaskStorage - 開発用・テスト用のタスクストレージ
//!
//! 本番ではリクエスト処理層の DB がこの役割を持つ。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{Task, TaskId, User, UserId};
use crate::error::HeraldError;
use crate::ports::TaskStore;

#[derive(Default)]
pub struct InMemoryTaskStorage {
    tasks: RwLock<HashMap<TaskId, Task>>,
    users: RwLock<HashMap<UserId, User>>,
}

impl InMemoryTaskStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_user(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }

    pub async fn put_task(&self, task: Task) {
        self.tasks.write().await.insert(task.id, task);
    }

    pub async fn remove_task(&self, id: TaskId) -> Option<Task> {
        self.tasks.write().await.remove(&id)
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStorage {
    async fn get_task_by_id(&self, id: TaskId) -> Result<Option<Task>, HeraldError> {
        Ok(self.tasks.read().await.get(&id).cloned())
    }

    async fn get_user_by_id(&self, id: UserId) -> Result<Option<User>, HeraldError> {
        Ok(self.users.read().await.get(&id).cloned())
    }
}
