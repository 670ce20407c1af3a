//! Status - 予約済み reminder の一覧と件数
//!
//! worker の tick ごとに呼ばれ、今どの task の reminder がいつ発火するかをログに出す。

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::domain::{JobId, TaskId};
use crate::error::HeraldError;
use crate::observability::JobCounts;
use crate::ports::{Clock, JobStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpcomingReminder {
    pub job_id: JobId,
    pub task_id: TaskId,
    pub due_date: DateTime<Utc>,
    pub fire_at: DateTime<Utc>,
    /// 発火までの残り時間（期限到来済みなら 0）
    #[serde(skip)]
    pub delay: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub counts: JobCounts,
    pub upcoming: Vec<UpcomingReminder>,
}

pub struct StatusReporter {
    store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
}

impl StatusReporter {
    pub fn new(store: Arc<dyn JobStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn snapshot(&self) -> Result<StatusReport, HeraldError> {
        let now = self.clock.now();
        let counts = self.store.counts_by_status().await?;
        let upcoming = self
            .store
            .pending_jobs()
            .await?
            .into_iter()
            .map(|job| UpcomingReminder {
                job_id: job.job_id,
                task_id: job.task_id,
                due_date: job.due_date,
                fire_at: job.fire_at,
                delay: (job.fire_at - now).max(Duration::zero()),
            })
            .collect();
        Ok(StatusReport { counts, upcoming })
    }

    /// snapshot を取ってログに出す。
    pub async fn report(&self) -> Result<StatusReport, HeraldError> {
        let report = self.snapshot().await?;
        if report.upcoming.is_empty() {
            tracing::debug!("no scheduled reminders at the moment");
        } else {
            tracing::info!(
                scheduled = report.upcoming.len(),
                claimed = report.counts.claimed,
                fired = report.counts.fired,
                failed = report.counts.failed,
                "scheduled reminders"
            );
            for reminder in &report.upcoming {
                tracing::debug!(
                    job_id = %reminder.job_id,
                    task_id = %reminder.task_id,
                    due_date = %reminder.due_date,
                    delay_ms = reminder.delay.num_milliseconds(),
                    "scheduled reminder"
                );
            }
        }
        Ok(report)
    }
}
