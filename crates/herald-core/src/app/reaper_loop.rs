//! JobReaper - 取り残された claim の回収と終端レコードの掃除
//!
//! - claim されたまま結果が記録されなかった job（dispatch 中に JobStore が落ちた等）を
//!   `claim_timeout` 経過後に Pending に戻す。at-least-once の保証はここで担保される。
//! - Fired / Cancelled / Failed のレコードは `retention` 経過後に削除する。

use std::sync::Arc;

use chrono::Duration;

use crate::error::HeraldError;
use crate::ports::{Clock, JobStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapSummary {
    pub requeued: usize,
    pub purged: usize,
}

pub struct JobReaper {
    store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
    claim_timeout: Duration,
    retention: Duration,
}

impl JobReaper {
    pub fn new(
        store: Arc<dyn JobStore>,
        clock: Arc<dyn Clock>,
        claim_timeout: Duration,
        retention: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            claim_timeout,
            retention,
        }
    }

    pub async fn run_once(&self) -> Result<ReapSummary, HeraldError> {
        let now = self.clock.now();
        let mut summary = ReapSummary::default();

        // cutoff が表現できない（期間が長すぎる）なら該当レコードは存在しない
        if let Some(claimed_before) = now.checked_sub_signed(self.claim_timeout) {
            summary.requeued = self.store.requeue_stale_claims(claimed_before).await?;
            if summary.requeued > 0 {
                tracing::warn!(
                    requeued = summary.requeued,
                    "requeued reminders whose dispatch result was never recorded"
                );
            }
        }
        if let Some(older_than) = now.checked_sub_signed(self.retention) {
            summary.purged = self.store.purge_terminal(older_than).await?;
            if summary.purged > 0 {
                tracing::debug!(purged = summary.purged, "purged finished reminder records");
            }
        }
        Ok(summary)
    }
}
