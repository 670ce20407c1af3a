//! TaskStore port - タスク／ユーザーの正本（外部ストレージ）
//!
//! herald は読むだけ。書き込みはリクエスト処理層の責務で、
//! コミット後に Scheduler へ通知される。

use async_trait::async_trait;

use crate::domain::{Task, TaskId, User, UserId};
use crate::error::HeraldError;

/// TaskStore は task / user を id で引く
///
/// - 見つからない場合は `Ok(None)`
/// - ストレージ障害は `HeraldError::StorageUnavailable`
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn get_task_by_id(&self, id: TaskId) -> Result<Option<Task>, HeraldError>;

    async fn get_user_by_id(&self, id: UserId) -> Result<Option<User>, HeraldError>;
}
