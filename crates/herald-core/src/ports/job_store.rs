//! JobStore port - Delayed Job Store の契約
//!
//! ReminderJob の正本。Scheduler（リクエスト処理側）と Dispatcher（poll 側）が
//! 並行に呼ぶので、実装は 1 つの task に対する操作を直列化しなければならない。
//!
//! # 必須のデータ構造
//! - task_id → 有効な job_id の索引（変更のたびに全件走査しない）
//! - fire_at 順の待ち行列（claim_due が期限到来分だけを見る）

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{JobId, TaskId, UserId};
use crate::error::HeraldError;
use crate::observability::JobCounts;
use crate::queue::ReminderJob;

/// insert に渡す新規 reminder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReminder {
    pub task_id: TaskId,
    pub user_id: UserId,
    pub due_date: DateTime<Utc>,
    pub fire_at: DateTime<Utc>,
}

/// JobStore は ReminderJob の保存・取得・状態遷移を担う
///
/// # 不変条件
/// - 1 つの task_id に対して有効（Pending / Claimed）な job は高々 1 つ
/// - claim 済みの job は再度 claim されない（reschedule で Pending に戻るまで）
/// - Cancelled の job は mark_fired / reschedule で生き返らない
///
/// # 失敗
/// - 永続化層の障害は `HeraldError::StoreUnavailable`
#[async_trait]
pub trait JobStore: Send + Sync {
    /// 新しい Pending job を登録する。同じ task に有効な job があれば先に Cancelled にする。
    async fn insert(&self, reminder: NewReminder) -> Result<JobId, HeraldError>;

    /// task の有効な job を Cancelled にする。戻り値はキャンセル件数（0 か 1）。
    async fn cancel_by_task_id(&self, task_id: TaskId) -> Result<usize, HeraldError>;

    /// `status = Pending` かつ `fire_at <= now` の job をすべて Claimed にして返す。
    async fn claim_due(&self, now: DateTime<Utc>) -> Result<Vec<ReminderJob>, HeraldError>;

    /// Claimed → Fired。適用されたら true。
    async fn mark_fired(&self, job_id: JobId) -> Result<bool, HeraldError>;

    /// Pending / Claimed → Failed。適用されたら true。
    async fn mark_failed(&self, job_id: JobId, reason: String) -> Result<bool, HeraldError>;

    /// Claimed → Pending（fire_at は据え置き）。attempts を記録する。適用されたら true。
    async fn reschedule(&self, job_id: JobId, attempts: u32) -> Result<bool, HeraldError>;

    /// `claimed_before` より前に claim されたまま結果が記録されていない job を Pending に戻す。
    /// dispatch 中に worker が結果を書けなかった job を取りこぼさないための回収。
    async fn requeue_stale_claims(&self, claimed_before: DateTime<Utc>) -> Result<usize, HeraldError>;

    async fn get(&self, job_id: JobId) -> Result<Option<ReminderJob>, HeraldError>;

    /// 索引経由で task の有効な job を引く。
    async fn active_job_for_task(&self, task_id: TaskId) -> Result<Option<ReminderJob>, HeraldError>;

    /// Pending の job を fire_at 昇順で返す（status 表示用）。
    async fn pending_jobs(&self) -> Result<Vec<ReminderJob>, HeraldError>;

    async fn counts_by_status(&self) -> Result<JobCounts, HeraldError>;

    /// `updated_at < older_than` の終端状態レコードを削除する。戻り値は削除件数。
    async fn purge_terminal(&self, older_than: DateTime<Utc>) -> Result<usize, HeraldError>;
}
