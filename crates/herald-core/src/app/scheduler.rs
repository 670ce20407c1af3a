//! Scheduler - タスクの変更を JobStore に反映する
//!
//! リクエスト処理層はタスクのコミット後に `on_task_upserted` / `on_task_deleted` を呼ぶ。
//! どちらも失敗を返さない（reconcile はベストエフォート、結果はログと戻り値で分かる）。
//!
//! # 直列化
//! 同じ task に対する reconcile は task_id でストライプしたロックで直列化する。
//! JobStore 側の操作は個々にアトミックだが、「有効な job を見て、差し替える」の
//! 2 ステップが別の変更と交互に走らないようにするため。
//!
//! # StoreUnavailable
//! JobStore が一時的に使えないとき、その task に対する最新の意図（Upsert / Delete）を
//! backlog に残す。次にその task が変更されたら新しい意図で上書きされ、
//! そうでなければ worker の tick ごとに `flush_deferred` で再試行される。

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::domain::{JobId, Task, TaskId};
use crate::error::HeraldError;
use crate::ports::{Clock, JobStore, NewReminder};

const LOCK_STRIPES: usize = 64;

/// 1 回の reconcile の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// 新しい job を登録した（既存の job があれば差し替えた）
    Scheduled { job_id: JobId, fire_at: DateTime<Utc> },

    /// 既存の job がそのまま有効
    Unchanged { job_id: JobId },

    /// reminder は不要。キャンセルした件数（0 か 1）
    Cancelled { count: usize },

    /// JobStore が使えないので backlog に積んだ
    Deferred,
}

#[derive(Debug, Clone)]
enum DeferredOp {
    Upsert(Task),
    Delete,
}

pub struct Scheduler {
    store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
    lead_time: Duration,
    stripes: Vec<Mutex<()>>,
    deferred: Mutex<HashMap<TaskId, DeferredOp>>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn JobStore>, clock: Arc<dyn Clock>, lead_time: Duration) -> Self {
        Self {
            store,
            clock,
            lead_time,
            stripes: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
            deferred: Mutex::new(HashMap::new()),
        }
    }

    /// `due_date - lead_time`。表現できる時刻の範囲外なら None。
    pub fn fire_at_for(&self, due_date: DateTime<Utc>) -> Option<DateTime<Utc>> {
        due_date.checked_sub_signed(self.lead_time)
    }

    /// task に reminder が必要ならその発火時刻。
    ///
    /// 期限なし・完了済み・発火時刻が過去（now ちょうどを含む）・発火時刻が計算できないなら None。
    pub fn desired_fire_at(&self, task: &Task, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if task.completed {
            return None;
        }
        let fire_at = self.fire_at_for(task.due_date?)?;
        (fire_at > now).then_some(fire_at)
    }

    fn stripe(&self, task_id: TaskId) -> &Mutex<()> {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        task_id.hash(&mut hasher);
        &self.stripes[(hasher.finish() as usize) % self.stripes.len()]
    }

    /// task の作成・更新・部分更新のコミット後に呼ぶ。
    pub async fn on_task_upserted(&self, task: &Task) -> Reconciliation {
        let _guard = self.stripe(task.id).lock().await;
        self.deferred.lock().await.remove(&task.id);

        match self.reconcile_upsert(task).await {
            Ok(outcome) => outcome,
            Err(err) => self.defer(task.id, DeferredOp::Upsert(task.clone()), err).await,
        }
    }

    /// task の削除のコミット後に呼ぶ。
    pub async fn on_task_deleted(&self, task_id: TaskId) -> Reconciliation {
        let _guard = self.stripe(task_id).lock().await;
        self.deferred.lock().await.remove(&task_id);

        match self.reconcile_delete(task_id).await {
            Ok(outcome) => outcome,
            Err(err) => self.defer(task_id, DeferredOp::Delete, err).await,
        }
    }

    async fn reconcile_upsert(&self, task: &Task) -> Result<Reconciliation, HeraldError> {
        let now = self.clock.now();
        let (Some(fire_at), Some(due_date)) = (self.desired_fire_at(task, now), task.due_date)
        else {
            let count = self.store.cancel_by_task_id(task.id).await?;
            if count > 0 {
                tracing::info!(task_id = %task.id, "reminder cancelled: no longer needed");
            }
            return Ok(Reconciliation::Cancelled { count });
        };

        if let Some(active) = self.store.active_job_for_task(task.id).await?
            && active.fire_at == fire_at
            && active.user_id == task.user_id
        {
            return Ok(Reconciliation::Unchanged {
                job_id: active.job_id,
            });
        }

        let job_id = self
            .store
            .insert(NewReminder {
                task_id: task.id,
                user_id: task.user_id,
                due_date,
                fire_at,
            })
            .await?;
        tracing::info!(
            task_id = %task.id,
            job_id = %job_id,
            user_id = %task.user_id,
            fire_at = %fire_at,
            "reminder scheduled"
        );
        Ok(Reconciliation::Scheduled { job_id, fire_at })
    }

    async fn reconcile_delete(&self, task_id: TaskId) -> Result<Reconciliation, HeraldError> {
        let count = self.store.cancel_by_task_id(task_id).await?;
        if count > 0 {
            tracing::info!(task_id = %task_id, "reminder cancelled: task deleted");
        }
        Ok(Reconciliation::Cancelled { count })
    }

    async fn defer(&self, task_id: TaskId, op: DeferredOp, err: HeraldError) -> Reconciliation {
        tracing::warn!(task_id = %task_id, error = %err, "reminder reconciliation deferred");
        self.deferred.lock().await.insert(task_id, op);
        Reconciliation::Deferred
    }

    /// backlog の reconcile を再試行する。戻り値は今回片付いた件数。
    pub async fn flush_deferred(&self) -> usize {
        let task_ids: Vec<TaskId> = self.deferred.lock().await.keys().copied().collect();
        let mut flushed = 0;
        for task_id in task_ids {
            let _guard = self.stripe(task_id).lock().await;
            // A newer mutation may have settled it while we waited for the lock.
            let Some(op) = self.deferred.lock().await.get(&task_id).cloned() else {
                continue;
            };
            let result = match &op {
                DeferredOp::Upsert(task) => self.reconcile_upsert(task).await,
                DeferredOp::Delete => self.reconcile_delete(task_id).await,
            };
            match result {
                Ok(outcome) => {
                    self.deferred.lock().await.remove(&task_id);
                    tracing::info!(task_id = %task_id, ?outcome, "deferred reconciliation applied");
                    flushed += 1;
                }
                Err(err) => {
                    tracing::warn!(task_id = %task_id, error = %err, "deferred reconciliation still failing");
                }
            }
        }
        flushed
    }

    pub async fn deferred_count(&self) -> usize {
        self.deferred.lock().await.len()
    }
}
