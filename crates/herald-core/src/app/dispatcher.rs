//! Dispatcher - 期限が来た reminder を publish する
//!
//! # フロー（1 poll）
//! 1. JobStore::claim_due(now) で期限到来分を Claimed にして受け取る
//! 2. job ごとに TaskStore から task と owner を読む
//! 3. NotificationEvent を組み立てて Publisher に流す
//! 4. 結果を JobStore に記録（Fired / Pending に戻す / Failed）
//!
//! job ごとの失敗はその job の中で完結させ、同じバッチの他の job には影響させない。

use std::sync::Arc;

use crate::domain::NotificationEvent;
use crate::error::HeraldError;
use crate::ports::{Clock, JobStore, Publisher, TaskStore};
use crate::queue::{ReminderJob, RetryDecision, RetryPolicy};

/// 1 job の dispatch 結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Fired,

    /// publish に失敗、次の poll で再試行
    Retried { attempts: u32 },

    /// 諦めた（リトライ上限、または task / user が存在しない）
    Failed { reason: String },

    /// dispatch 中に scheduler にキャンセルされた。publish 済みでも Fired にはしない
    Superseded,

    /// 結果を書く前に claim が期限切れになり reaper に Pending に戻された。次の poll で再配送される
    Reclaimed,

    /// 結果を JobStore に書けなかった。claim は reaper が回収する
    Unrecorded,
}

/// 1 poll の集計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub claimed: usize,
    pub fired: usize,
    pub retried: usize,
    pub failed: usize,
    pub superseded: usize,
    pub reclaimed: usize,
    pub unrecorded: usize,
}

impl PollSummary {
    fn record(&mut self, outcome: &DispatchOutcome) {
        match outcome {
            DispatchOutcome::Fired => self.fired += 1,
            DispatchOutcome::Retried { .. } => self.retried += 1,
            DispatchOutcome::Failed { .. } => self.failed += 1,
            DispatchOutcome::Superseded => self.superseded += 1,
            DispatchOutcome::Reclaimed => self.reclaimed += 1,
            DispatchOutcome::Unrecorded => self.unrecorded += 1,
        }
    }
}

pub struct Dispatcher {
    store: Arc<dyn JobStore>,
    tasks: Arc<dyn TaskStore>,
    publisher: Arc<dyn Publisher>,
    clock: Arc<dyn Clock>,
    retry_policy: RetryPolicy,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn JobStore>,
        tasks: Arc<dyn TaskStore>,
        publisher: Arc<dyn Publisher>,
        clock: Arc<dyn Clock>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            tasks,
            publisher,
            clock,
            retry_policy,
        }
    }

    /// 期限到来分を claim して全部 dispatch する。
    ///
    /// Err になるのは claim 自体が失敗したときだけ（その場合は何も claim されていない）。
    pub async fn poll_once(&self) -> Result<PollSummary, HeraldError> {
        let now = self.clock.now();
        let jobs = self.store.claim_due(now).await?;

        let mut summary = PollSummary {
            claimed: jobs.len(),
            ..PollSummary::default()
        };
        for job in &jobs {
            let outcome = self.dispatch(job).await;
            summary.record(&outcome);
        }

        if summary.claimed > 0 {
            tracing::info!(
                claimed = summary.claimed,
                fired = summary.fired,
                retried = summary.retried,
                failed = summary.failed,
                unrecorded = summary.unrecorded,
                "poll finished"
            );
        } else {
            tracing::debug!("poll found no due reminders");
        }
        Ok(summary)
    }

    /// claim 済みの job を 1 つ処理する。
    pub async fn dispatch(&self, job: &ReminderJob) -> DispatchOutcome {
        let event = match self.build_event(job).await {
            Ok(event) => event,
            Err(err) if err.is_transient() => return self.after_failure(job, err).await,
            Err(err) => return self.give_up(job, err).await,
        };

        match self.publisher.publish(event.user_id, &event).await {
            Ok(()) => self.after_publish(job).await,
            Err(err) if err.is_transient() => self.after_failure(job, err).await,
            Err(err) => self.give_up(job, err).await,
        }
    }

    async fn build_event(&self, job: &ReminderJob) -> Result<NotificationEvent, HeraldError> {
        let task = self
            .tasks
            .get_task_by_id(job.task_id)
            .await?
            .ok_or(HeraldError::TaskNotFound(job.task_id))?;
        // owner が消えていたら配る先がない
        self.tasks
            .get_user_by_id(task.user_id)
            .await?
            .ok_or(HeraldError::UserNotFound(task.user_id))?;
        Ok(NotificationEvent::for_task(&task, job.due_date))
    }

    async fn after_publish(&self, job: &ReminderJob) -> DispatchOutcome {
        match self.store.mark_fired(job.job_id).await {
            Ok(true) => {
                tracing::info!(job_id = %job.job_id, task_id = %job.task_id, user_id = %job.user_id, "reminder fired");
                DispatchOutcome::Fired
            }
            Ok(false) => self.claim_lost(job).await,
            Err(err) => {
                tracing::warn!(job_id = %job.job_id, error = %err, "could not record fired reminder");
                DispatchOutcome::Unrecorded
            }
        }
    }

    async fn after_failure(&self, job: &ReminderJob, err: HeraldError) -> DispatchOutcome {
        match self.retry_policy.after_failure(job.attempts) {
            RetryDecision::Retry { attempts } => match self.store.reschedule(job.job_id, attempts).await {
                Ok(true) => {
                    tracing::warn!(
                        job_id = %job.job_id,
                        task_id = %job.task_id,
                        attempts,
                        max_retries = self.retry_policy.max_retries,
                        error = %err,
                        "dispatch failed, will retry"
                    );
                    DispatchOutcome::Retried { attempts }
                }
                Ok(false) => self.claim_lost(job).await,
                Err(store_err) => {
                    tracing::warn!(job_id = %job.job_id, error = %store_err, "could not reschedule reminder");
                    DispatchOutcome::Unrecorded
                }
            },
            RetryDecision::GiveUp { attempts } => {
                tracing::error!(
                    job_id = %job.job_id,
                    task_id = %job.task_id,
                    attempts,
                    error = %err,
                    "dispatch retries exhausted"
                );
                self.record_failed(job, format!("retries exhausted after {attempts} attempts: {err}"))
                    .await
            }
        }
    }

    async fn give_up(&self, job: &ReminderJob, err: HeraldError) -> DispatchOutcome {
        tracing::warn!(job_id = %job.job_id, task_id = %job.task_id, error = %err, "discarding reminder");
        self.record_failed(job, err.to_string()).await
    }

    async fn record_failed(&self, job: &ReminderJob, reason: String) -> DispatchOutcome {
        match self.store.mark_failed(job.job_id, reason.clone()).await {
            Ok(true) => DispatchOutcome::Failed { reason },
            Ok(false) => self.claim_lost(job).await,
            Err(err) => {
                tracing::warn!(job_id = %job.job_id, error = %err, "could not record failed reminder");
                DispatchOutcome::Unrecorded
            }
        }
    }

    /// 結果を書こうとしたら job がもう自分の claim ではなかった。
    ///
    /// キャンセルされたのか、reaper が claim を回収したのかを見分ける。
    async fn claim_lost(&self, job: &ReminderJob) -> DispatchOutcome {
        match self.store.get(job.job_id).await {
            Ok(Some(current)) if current.status.is_active() => {
                tracing::warn!(
                    job_id = %job.job_id,
                    task_id = %job.task_id,
                    "claim expired before the result was recorded, reminder will be dispatched again"
                );
                DispatchOutcome::Reclaimed
            }
            Ok(_) => {
                tracing::info!(job_id = %job.job_id, task_id = %job.task_id, "reminder was cancelled while in flight");
                DispatchOutcome::Superseded
            }
            Err(err) => {
                tracing::warn!(job_id = %job.job_id, error = %err, "could not read back reminder state");
                DispatchOutcome::Unrecorded
            }
        }
    }
}
