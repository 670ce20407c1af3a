//! WorkerLoop - poll_interval ごとに due な reminder を配送するループ
//!
//! 1 tick の流れ:
//! 1. Scheduler に溜まった deferred mutation を再適用（housekeeping 担当のみ）
//! 2. Dispatcher::poll_once で due job を claim → publish → 記録
//! 3. JobReaper で stale claim の回収と終端レコードの削除（housekeeping 担当のみ）
//! 4. StatusReporter で予約状況をログ出力（housekeeping 担当のみ）
//!
//! どのステップが失敗してもループは止めない。失敗はログに残して次の tick で再試行する。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::dispatcher::{Dispatcher, PollSummary};
use super::reaper_loop::{JobReaper, ReapSummary};
use super::scheduler::Scheduler;
use super::status::StatusReporter;

/// 1 tick の結果。失敗したステップは `None`。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub flushed: usize,
    pub poll: Option<PollSummary>,
    pub reap: Option<ReapSummary>,
}

pub struct WorkerLoop {
    scheduler: Arc<Scheduler>,
    dispatcher: Arc<Dispatcher>,
    reaper: Arc<JobReaper>,
    reporter: Arc<StatusReporter>,
    poll_interval: Duration,
}

impl WorkerLoop {
    pub fn new(
        scheduler: Arc<Scheduler>,
        dispatcher: Arc<Dispatcher>,
        reaper: Arc<JobReaper>,
        reporter: Arc<StatusReporter>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            scheduler,
            dispatcher,
            reaper,
            reporter,
            poll_interval,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// 1 回分の処理。`housekeeping` が false の worker は配送だけ行う。
    pub async fn tick(&self, housekeeping: bool) -> TickReport {
        let mut report = TickReport::default();

        if housekeeping {
            report.flushed = self.scheduler.flush_deferred().await;
        }

        match self.dispatcher.poll_once().await {
            Ok(summary) => report.poll = Some(summary),
            Err(err) => tracing::error!(error = %err, "polling for due reminders failed"),
        }

        if housekeeping {
            match self.reaper.run_once().await {
                Ok(summary) => report.reap = Some(summary),
                Err(err) => tracing::warn!(error = %err, "reaper pass failed"),
            }
            if let Err(err) = self.reporter.report().await {
                tracing::warn!(error = %err, "status report failed");
            }
        }

        report
    }

    async fn run(&self, worker_id: usize, shutdown_rx: &mut watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let housekeeping = worker_id == 0;

        tracing::debug!(worker_id, "reminder worker started");
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown_rx.changed() => {
                    // sender が drop された場合も停止
                    if changed.is_err() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    self.tick(housekeeping).await;
                }
            }
        }
        tracing::debug!(worker_id, "reminder worker stopped");
    }
}

/// Worker group handle.
/// - `request_shutdown()` で新しい tick の開始を止める（実行中の tick は最後まで走る）
/// - `shutdown_and_join()` で全 worker の終了を待てる
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `n` workers sharing one loop. Worker 0 also does housekeeping.
    pub fn spawn(n: usize, worker: Arc<WorkerLoop>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let joins = (0..n.max(1))
            .map(|worker_id| {
                let worker = Arc::clone(&worker);
                let mut rx = shutdown_rx.clone();
                tokio::spawn(async move {
                    worker.run(worker_id, &mut rx).await;
                })
            })
            .collect();

        Self { shutdown_tx, joins }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(err) = join.await {
                tracing::error!(error = %err, "reminder worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Task, TaskId, User, UserId};
    use crate::impls::InMemoryTaskStorage;
    use crate::ports::{Clock, JobStore};
    use crate::queue::RetryPolicy;
    use crate::testing::{FlakyStore, RecordingPublisher, clock_and_store, minutes, start};

    struct Fixture {
        clock: crate::ports::FixedClock,
        flaky: Arc<FlakyStore>,
        storage: Arc<InMemoryTaskStorage>,
        publisher: Arc<RecordingPublisher>,
        scheduler: Arc<Scheduler>,
        worker: Arc<WorkerLoop>,
    }

    async fn fixture() -> Fixture {
        let (clock, store) = clock_and_store();
        let flaky = Arc::new(FlakyStore::new(store));
        let clock_dyn: Arc<dyn Clock> = Arc::new(clock.clone());
        let storage = Arc::new(InMemoryTaskStorage::new());
        storage.put_user(User::new(UserId::new(1), "a@example.com", "A")).await;
        let publisher = Arc::new(RecordingPublisher::default());

        let scheduler = Arc::new(Scheduler::new(flaky.clone(), clock_dyn.clone(), minutes(5)));
        let dispatcher = Arc::new(Dispatcher::new(
            flaky.clone(),
            storage.clone(),
            publisher.clone(),
            clock_dyn.clone(),
            RetryPolicy::default(),
        ));
        let reaper = Arc::new(JobReaper::new(flaky.clone(), clock_dyn.clone(), minutes(1), minutes(60)));
        let reporter = Arc::new(StatusReporter::new(flaky.clone(), clock_dyn));
        let worker = Arc::new(WorkerLoop::new(
            scheduler.clone(),
            dispatcher,
            reaper,
            reporter,
            Duration::from_millis(5),
        ));

        Fixture {
            clock,
            flaky,
            storage,
            publisher,
            scheduler,
            worker,
        }
    }

    fn task(id: i64, due_in_minutes: i64) -> Task {
        Task::new(TaskId::new(id), UserId::new(1), format!("task {id}"))
            .with_due_date(start() + minutes(due_in_minutes))
    }

    #[tokio::test]
    async fn tick_applies_deferred_mutation_then_dispatches_it() {
        let f = fixture().await;
        let t = task(1, 10);
        f.storage.put_task(t.clone()).await;

        f.flaky.set_down(true);
        f.scheduler.on_task_upserted(&t).await;
        let report = f.worker.tick(true).await;
        assert_eq!(report.poll, None);
        assert_eq!(report.reap, None);

        f.flaky.set_down(false);
        let report = f.worker.tick(true).await;
        assert_eq!(report.flushed, 1);
        assert_eq!(report.poll.map(|p| p.claimed), Some(0));
        assert_eq!(f.scheduler.deferred_count().await, 0);

        f.clock.advance(minutes(5));
        let report = f.worker.tick(true).await;
        assert_eq!(report.flushed, 0);
        assert_eq!(report.poll.map(|p| p.fired), Some(1));
        assert_eq!(f.publisher.events().await.len(), 1);
    }

    #[tokio::test]
    async fn non_housekeeping_tick_only_dispatches() {
        let f = fixture().await;
        let t = task(1, 10);
        f.storage.put_task(t.clone()).await;

        f.flaky.set_down(true);
        f.scheduler.on_task_upserted(&t).await;
        f.flaky.set_down(false);

        let report = f.worker.tick(false).await;
        assert_eq!(report.flushed, 0);
        assert_eq!(report.reap, None);
        assert_eq!(f.scheduler.deferred_count().await, 1);
    }

    #[tokio::test]
    async fn worker_group_fires_due_reminder_and_shuts_down() {
        let f = fixture().await;
        let t = task(1, 10);
        f.storage.put_task(t.clone()).await;
        f.scheduler.on_task_upserted(&t).await;
        f.clock.advance(minutes(5));

        let group = WorkerGroup::spawn(2, f.worker.clone());
        assert_eq!(group.len(), 2);

        let mut fired = false;
        for _ in 0..200 {
            if !f.publisher.events().await.is_empty() {
                fired = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        group.shutdown_and_join().await;

        assert!(fired);
        assert_eq!(f.publisher.events().await.len(), 1);
        let counts = f.flaky.counts_by_status().await.unwrap();
        assert_eq!(counts.fired, 1);
        assert_eq!(counts.active(), 0);
    }

    #[tokio::test]
    async fn shutdown_with_nothing_scheduled_returns_promptly() {
        let f = fixture().await;
        let group = WorkerGroup::spawn(1, f.worker.clone());
        tokio::time::timeout(Duration::from_secs(1), group.shutdown_and_join())
            .await
            .unwrap();
    }
}
