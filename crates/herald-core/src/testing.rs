//! Test doubles shared by the app-layer tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::Mutex;

use crate::domain::{JobId, NotificationEvent, Task, TaskId, User, UserId};
use crate::error::HeraldError;
use crate::impls::InMemoryTaskStorage;
use crate::observability::JobCounts;
use crate::ports::{FixedClock, JobStore, NewReminder, Publisher, TaskStore, UlidGenerator};
use crate::queue::{InMemoryJobStore, ReminderJob};

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

pub fn minutes(n: i64) -> Duration {
    Duration::minutes(n)
}

pub fn clock_and_store() -> (FixedClock, Arc<InMemoryJobStore>) {
    let clock = FixedClock::new(start());
    let store = Arc::new(InMemoryJobStore::new(
        Arc::new(clock.clone()),
        Arc::new(UlidGenerator::new(clock.clone())),
    ));
    (clock, store)
}

/// Wraps a real store and fails every call while `down` is set.
pub struct FlakyStore {
    inner: Arc<InMemoryJobStore>,
    down: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: Arc<InMemoryJobStore>) -> Self {
        Self {
            inner,
            down: AtomicBool::new(false),
        }
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), HeraldError> {
        if self.down.load(Ordering::SeqCst) {
            Err(HeraldError::StoreUnavailable("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl JobStore for FlakyStore {
    async fn insert(&self, reminder: NewReminder) -> Result<JobId, HeraldError> {
        self.check()?;
        self.inner.insert(reminder).await
    }

    async fn cancel_by_task_id(&self, task_id: TaskId) -> Result<usize, HeraldError> {
        self.check()?;
        self.inner.cancel_by_task_id(task_id).await
    }

    async fn claim_due(&self, now: DateTime<Utc>) -> Result<Vec<ReminderJob>, HeraldError> {
        self.check()?;
        self.inner.claim_due(now).await
    }

    async fn mark_fired(&self, job_id: JobId) -> Result<bool, HeraldError> {
        self.check()?;
        self.inner.mark_fired(job_id).await
    }

    async fn mark_failed(&self, job_id: JobId, reason: String) -> Result<bool, HeraldError> {
        self.check()?;
        self.inner.mark_failed(job_id, reason).await
    }

    async fn reschedule(&self, job_id: JobId, attempts: u32) -> Result<bool, HeraldError> {
        self.check()?;
        self.inner.reschedule(job_id, attempts).await
    }

    async fn requeue_stale_claims(&self, claimed_before: DateTime<Utc>) -> Result<usize, HeraldError> {
        self.check()?;
        self.inner.requeue_stale_claims(claimed_before).await
    }

    async fn get(&self, job_id: JobId) -> Result<Option<ReminderJob>, HeraldError> {
        self.check()?;
        self.inner.get(job_id).await
    }

    async fn active_job_for_task(&self, task_id: TaskId) -> Result<Option<ReminderJob>, HeraldError> {
        self.check()?;
        self.inner.active_job_for_task(task_id).await
    }

    async fn pending_jobs(&self) -> Result<Vec<ReminderJob>, HeraldError> {
        self.check()?;
        self.inner.pending_jobs().await
    }

    async fn counts_by_status(&self) -> Result<JobCounts, HeraldError> {
        self.check()?;
        self.inner.counts_by_status().await
    }

    async fn purge_terminal(&self, older_than: DateTime<Utc>) -> Result<usize, HeraldError> {
        self.check()?;
        self.inner.purge_terminal(older_than).await
    }
}

/// Records every published event; fails the first `failures` publishes.
#[derive(Default)]
pub struct RecordingPublisher {
    failures: AtomicU32,
    pub published: Mutex<Vec<(UserId, NotificationEvent)>>,
}

impl RecordingPublisher {
    pub fn failing(failures: u32) -> Self {
        Self {
            failures: AtomicU32::new(failures),
            published: Mutex::new(Vec::new()),
        }
    }

    pub async fn events(&self) -> Vec<(UserId, NotificationEvent)> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, user_id: UserId, event: &NotificationEvent) -> Result<(), HeraldError> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.fetch_sub(1, Ordering::SeqCst);
            return Err(HeraldError::PublishFailure(format!(
                "intentional failure (left={left})"
            )));
        }
        self.published.lock().await.push((user_id, event.clone()));
        Ok(())
    }
}

/// Task storage that fails every read while `down` is set.
pub struct FlakyTaskStorage {
    inner: Arc<InMemoryTaskStorage>,
    down: AtomicBool,
}

impl FlakyTaskStorage {
    pub fn new(inner: Arc<InMemoryTaskStorage>) -> Self {
        Self {
            inner,
            down: AtomicBool::new(false),
        }
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), HeraldError> {
        if self.down.load(Ordering::SeqCst) {
            Err(HeraldError::StorageUnavailable("database is restarting".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TaskStore for FlakyTaskStorage {
    async fn get_task_by_id(&self, id: TaskId) -> Result<Option<Task>, HeraldError> {
        self.check()?;
        self.inner.get_task_by_id(id).await
    }

    async fn get_user_by_id(&self, id: UserId) -> Result<Option<User>, HeraldError> {
        self.check()?;
        self.inner.get_user_by_id(id).await
    }
}

/// Publishes successfully, then takes the job store down once, so the
/// dispatch result cannot be recorded.
pub struct StoreOutageOnPublish {
    store: Arc<FlakyStore>,
    armed: AtomicBool,
    pub inner: RecordingPublisher,
}

impl StoreOutageOnPublish {
    pub fn new(store: Arc<FlakyStore>) -> Self {
        Self {
            store,
            armed: AtomicBool::new(true),
            inner: RecordingPublisher::default(),
        }
    }
}

#[async_trait]
impl Publisher for StoreOutageOnPublish {
    async fn publish(&self, user_id: UserId, event: &NotificationEvent) -> Result<(), HeraldError> {
        self.inner.publish(user_id, event).await?;
        if self.armed.swap(false, Ordering::SeqCst) {
            self.store.set_down(true);
        }
        Ok(())
    }
}
