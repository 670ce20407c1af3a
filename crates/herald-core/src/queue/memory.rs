//! In-memory job store implementation.

use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{JobStatus, ReminderJob};
use crate::domain::{JobId, TaskId};
use crate::error::HeraldError;
use crate::observability::JobCounts;
use crate::ports::{Clock, IdGenerator, JobStore, NewReminder};

/// Due-order entry for the priority queue.
///
/// We use Reverse ordering so BinaryHeap acts as a min-heap (earliest first).
/// Entries are never removed eagerly: a cancelled or re-queued job leaves its
/// old entry behind, and `claim_due` skips entries whose job is no longer
/// Pending at that fire time. Stale entries that have not come due yet are
/// dropped by `purge_terminal`, so the heap holds at most one live entry per
/// pending job plus whatever went stale since the last purge.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DueEntry {
    fire_at: DateTime<Utc>,
    job_id: JobId,
}

impl PartialOrd for DueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .fire_at
            .cmp(&self.fire_at)
            .then_with(|| other.job_id.cmp(&self.job_id))
    }
}

/// In-memory store state. Everything is behind one lock, so every operation
/// on a task's job is serialized against claims from the poll loop.
#[derive(Default)]
struct InMemoryJobStoreState {
    /// All job records (single source of truth).
    jobs: HashMap<JobId, ReminderJob>,

    /// task_id -> its active (Pending / Claimed) job.
    by_task: HashMap<TaskId, JobId>,

    /// Pending jobs ordered by fire time.
    due: BinaryHeap<DueEntry>,
}

impl InMemoryJobStoreState {
    fn cancel_active(&mut self, task_id: TaskId, now: DateTime<Utc>) -> usize {
        let Some(job_id) = self.by_task.remove(&task_id) else {
            return 0;
        };
        match self.jobs.get_mut(&job_id) {
            Some(job) if job.status.is_active() => {
                job.cancel(now);
                1
            }
            _ => 0,
        }
    }

    fn insert(&mut self, job_id: JobId, reminder: NewReminder, now: DateTime<Utc>) {
        self.cancel_active(reminder.task_id, now);

        let job = ReminderJob::new(job_id, reminder, now);
        self.due.push(DueEntry {
            fire_at: job.fire_at,
            job_id,
        });
        self.by_task.insert(job.task_id, job_id);
        self.jobs.insert(job_id, job);
    }

    fn claim_due(&mut self, now: DateTime<Utc>) -> Vec<ReminderJob> {
        let mut claimed = Vec::new();
        while let Some(entry) = self.due.peek() {
            if entry.fire_at > now {
                break; // Heap is sorted, so we can stop
            }
            let Some(entry) = self.due.pop() else {
                break;
            };
            if let Some(job) = self.jobs.get_mut(&entry.job_id)
                && job.is_due(now)
                && job.fire_at == entry.fire_at
            {
                job.claim(now);
                claimed.push(job.clone());
            }
        }
        claimed
    }

    /// Drop the index entry if it still points at `job_id`.
    fn release_index(&mut self, task_id: TaskId, job_id: JobId) {
        if self.by_task.get(&task_id) == Some(&job_id) {
            self.by_task.remove(&task_id);
        }
    }

    fn mark_fired(&mut self, job_id: JobId, now: DateTime<Utc>) -> bool {
        let Some(job) = self.jobs.get_mut(&job_id) else {
            return false;
        };
        if job.status != JobStatus::Claimed {
            return false;
        }
        job.mark_fired(now);
        let task_id = job.task_id;
        self.release_index(task_id, job_id);
        true
    }

    fn mark_failed(&mut self, job_id: JobId, reason: String, now: DateTime<Utc>) -> bool {
        let Some(job) = self.jobs.get_mut(&job_id) else {
            return false;
        };
        if !job.status.is_active() {
            return false;
        }
        job.mark_failed(reason, now);
        let task_id = job.task_id;
        self.release_index(task_id, job_id);
        true
    }

    fn reschedule(&mut self, job_id: JobId, attempts: u32, now: DateTime<Utc>) -> bool {
        let Some(job) = self.jobs.get_mut(&job_id) else {
            return false;
        };
        if job.status != JobStatus::Claimed {
            return false;
        }
        job.requeue(attempts, now);
        self.due.push(DueEntry {
            fire_at: job.fire_at,
            job_id,
        });
        true
    }

    fn requeue_stale_claims(&mut self, claimed_before: DateTime<Utc>, now: DateTime<Utc>) -> usize {
        let stale: Vec<JobId> = self
            .jobs
            .values()
            .filter(|job| job.status == JobStatus::Claimed && job.updated_at < claimed_before)
            .map(|job| job.job_id)
            .collect();
        for job_id in &stale {
            if let Some(job) = self.jobs.get_mut(job_id) {
                let attempts = job.attempts;
                job.requeue(attempts, now);
                self.due.push(DueEntry {
                    fire_at: job.fire_at,
                    job_id: *job_id,
                });
            }
        }
        stale.len()
    }

    /// Drop heap entries that no longer point at a pending job with that fire time.
    fn compact_due(&mut self) {
        let Self { jobs, due, .. } = self;
        due.retain(|entry| {
            jobs.get(&entry.job_id)
                .is_some_and(|job| job.status == JobStatus::Pending && job.fire_at == entry.fire_at)
        });
    }

    fn counts_by_status(&self) -> JobCounts {
        let mut counts = JobCounts::default();
        for job in self.jobs.values() {
            match job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Claimed => counts.claimed += 1,
                JobStatus::Fired => counts.fired += 1,
                JobStatus::Cancelled => counts.cancelled += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }
}

/// In-memory `JobStore`.
///
/// Never reports `StoreUnavailable`; a persistent implementation would map its
/// I/O errors onto that variant.
pub struct InMemoryJobStore {
    state: Mutex<InMemoryJobStoreState>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl InMemoryJobStore {
    pub fn new(clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            state: Mutex::new(InMemoryJobStoreState::default()),
            clock,
            ids,
        }
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, reminder: NewReminder) -> Result<JobId, HeraldError> {
        let job_id = self.ids.generate_job_id();
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        state.insert(job_id, reminder, now);
        Ok(job_id)
    }

    async fn cancel_by_task_id(&self, task_id: TaskId) -> Result<usize, HeraldError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        Ok(state.cancel_active(task_id, now))
    }

    async fn claim_due(&self, now: DateTime<Utc>) -> Result<Vec<ReminderJob>, HeraldError> {
        let mut state = self.state.lock().await;
        Ok(state.claim_due(now))
    }

    async fn mark_fired(&self, job_id: JobId) -> Result<bool, HeraldError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        Ok(state.mark_fired(job_id, now))
    }

    async fn mark_failed(&self, job_id: JobId, reason: String) -> Result<bool, HeraldError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        Ok(state.mark_failed(job_id, reason, now))
    }

    async fn reschedule(&self, job_id: JobId, attempts: u32) -> Result<bool, HeraldError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        Ok(state.reschedule(job_id, attempts, now))
    }

    async fn requeue_stale_claims(&self, claimed_before: DateTime<Utc>) -> Result<usize, HeraldError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        Ok(state.requeue_stale_claims(claimed_before, now))
    }

    async fn get(&self, job_id: JobId) -> Result<Option<ReminderJob>, HeraldError> {
        let state = self.state.lock().await;
        Ok(state.jobs.get(&job_id).cloned())
    }

    async fn active_job_for_task(&self, task_id: TaskId) -> Result<Option<ReminderJob>, HeraldError> {
        let state = self.state.lock().await;
        Ok(state
            .by_task
            .get(&task_id)
            .and_then(|job_id| state.jobs.get(job_id))
            .filter(|job| job.status.is_active())
            .cloned())
    }

    async fn pending_jobs(&self) -> Result<Vec<ReminderJob>, HeraldError> {
        let state = self.state.lock().await;
        let mut pending: Vec<ReminderJob> = state
            .jobs
            .values()
            .filter(|job| job.status == JobStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.fire_at.cmp(&b.fire_at).then(a.job_id.cmp(&b.job_id)));
        Ok(pending)
    }

    async fn counts_by_status(&self) -> Result<JobCounts, HeraldError> {
        let state = self.state.lock().await;
        Ok(state.counts_by_status())
    }

    async fn purge_terminal(&self, older_than: DateTime<Utc>) -> Result<usize, HeraldError> {
        let mut state = self.state.lock().await;
        let before = state.jobs.len();
        state
            .jobs
            .retain(|_, job| !(job.status.is_terminal() && job.updated_at < older_than));
        state.compact_due();
        Ok(before - state.jobs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UserId;
    use crate::ports::{FixedClock, UlidGenerator};
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn store_with_clock() -> (InMemoryJobStore, FixedClock) {
        let clock = FixedClock::new(start());
        let store = InMemoryJobStore::new(
            Arc::new(clock.clone()),
            Arc::new(UlidGenerator::new(clock.clone())),
        );
        (store, clock)
    }

    fn reminder(task: i64, fire_in_minutes: i64) -> NewReminder {
        let fire_at = start() + Duration::minutes(fire_in_minutes);
        NewReminder {
            task_id: TaskId::new(task),
            user_id: UserId::new(1),
            due_date: fire_at + Duration::minutes(5),
            fire_at,
        }
    }

    #[tokio::test]
    async fn insert_creates_pending_job_indexed_by_task() {
        let (store, _clock) = store_with_clock();

        let job_id = store.insert(reminder(1, 5)).await.unwrap();

        let job = store.active_job_for_task(TaskId::new(1)).await.unwrap().unwrap();
        assert_eq!(job.job_id, job_id);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.fire_at, start() + Duration::minutes(5));
    }

    #[tokio::test]
    async fn insert_replaces_the_active_job_for_the_same_task() {
        let (store, _clock) = store_with_clock();

        let old = store.insert(reminder(1, 5)).await.unwrap();
        let new = store.insert(reminder(1, 15)).await.unwrap();

        assert_eq!(store.get(old).await.unwrap().unwrap().status, JobStatus::Cancelled);
        let active = store.active_job_for_task(TaskId::new(1)).await.unwrap().unwrap();
        assert_eq!(active.job_id, new);

        let counts = store.counts_by_status().await.unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.cancelled, 1);
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let (store, _clock) = store_with_clock();
        store.insert(reminder(1, 5)).await.unwrap();

        assert_eq!(store.cancel_by_task_id(TaskId::new(1)).await.unwrap(), 1);
        assert_eq!(store.cancel_by_task_id(TaskId::new(1)).await.unwrap(), 0);
        assert_eq!(store.cancel_by_task_id(TaskId::new(99)).await.unwrap(), 0);
        assert!(store.active_job_for_task(TaskId::new(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claim_due_takes_only_jobs_whose_time_has_come() {
        let (store, clock) = store_with_clock();
        store.insert(reminder(1, 5)).await.unwrap();
        store.insert(reminder(2, 10)).await.unwrap();

        assert!(store.claim_due(clock.now()).await.unwrap().is_empty());

        clock.advance(Duration::minutes(5));
        let claimed = store.claim_due(clock.now()).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].task_id, TaskId::new(1));
        assert_eq!(claimed[0].status, JobStatus::Claimed);

        clock.advance(Duration::minutes(10));
        let claimed = store.claim_due(clock.now()).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].task_id, TaskId::new(2));
    }

    #[tokio::test]
    async fn claimed_jobs_are_not_claimed_twice() {
        let (store, clock) = store_with_clock();
        store.insert(reminder(1, 0)).await.unwrap();

        let first = store.claim_due(clock.now()).await.unwrap();
        let second = store.claim_due(clock.now()).await.unwrap();

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn cancelled_jobs_are_never_claimed() {
        let (store, clock) = store_with_clock();
        store.insert(reminder(1, 5)).await.unwrap();
        store.cancel_by_task_id(TaskId::new(1)).await.unwrap();

        clock.advance(Duration::minutes(30));
        assert!(store.claim_due(clock.now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn replaced_job_is_not_dispatched_at_its_old_time() {
        let (store, clock) = store_with_clock();
        store.insert(reminder(1, 5)).await.unwrap();
        let new = store.insert(reminder(1, 15)).await.unwrap();

        clock.advance(Duration::minutes(5));
        assert!(store.claim_due(clock.now()).await.unwrap().is_empty());

        clock.advance(Duration::minutes(10));
        let claimed = store.claim_due(clock.now()).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].job_id, new);
    }

    #[tokio::test]
    async fn fired_job_leaves_the_index() {
        let (store, clock) = store_with_clock();
        let job_id = store.insert(reminder(1, 0)).await.unwrap();
        store.claim_due(clock.now()).await.unwrap();

        assert!(store.mark_fired(job_id).await.unwrap());

        assert!(store.active_job_for_task(TaskId::new(1)).await.unwrap().is_none());
        assert_eq!(store.get(job_id).await.unwrap().unwrap().status, JobStatus::Fired);
        // A second mark is rejected.
        assert!(!store.mark_fired(job_id).await.unwrap());
    }

    #[tokio::test]
    async fn reschedule_returns_job_to_pending_with_same_fire_time() {
        let (store, clock) = store_with_clock();
        let job_id = store.insert(reminder(1, 0)).await.unwrap();
        let claimed = store.claim_due(clock.now()).await.unwrap();
        let fire_at = claimed[0].fire_at;

        assert!(store.reschedule(job_id, 1).await.unwrap());

        let job = store.get(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.fire_at, fire_at);

        let again = store.claim_due(clock.now()).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].attempts, 1);
    }

    #[tokio::test]
    async fn cancelled_while_claimed_is_not_resurrected() {
        let (store, clock) = store_with_clock();
        let job_id = store.insert(reminder(1, 0)).await.unwrap();
        store.claim_due(clock.now()).await.unwrap();

        // Task deleted while the dispatch is in flight.
        assert_eq!(store.cancel_by_task_id(TaskId::new(1)).await.unwrap(), 1);

        assert!(!store.reschedule(job_id, 1).await.unwrap());
        assert!(!store.mark_fired(job_id).await.unwrap());
        assert_eq!(store.get(job_id).await.unwrap().unwrap().status, JobStatus::Cancelled);
        assert!(store.claim_due(clock.now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn late_mark_on_replaced_job_keeps_new_job_indexed() {
        let (store, clock) = store_with_clock();
        let old = store.insert(reminder(1, 0)).await.unwrap();
        store.claim_due(clock.now()).await.unwrap();
        let new = store.insert(reminder(1, 20)).await.unwrap();

        assert!(!store.mark_failed(old, "late".into()).await.unwrap());

        let active = store.active_job_for_task(TaskId::new(1)).await.unwrap().unwrap();
        assert_eq!(active.job_id, new);
    }

    #[tokio::test]
    async fn stale_claims_are_requeued() {
        let (store, clock) = store_with_clock();
        let job_id = store.insert(reminder(1, 0)).await.unwrap();
        store.claim_due(clock.now()).await.unwrap();

        assert_eq!(store.requeue_stale_claims(clock.now()).await.unwrap(), 0);

        clock.advance(Duration::minutes(2));
        assert_eq!(
            store
                .requeue_stale_claims(clock.now() - Duration::minutes(1))
                .await
                .unwrap(),
            1
        );
        let claimed = store.claim_due(clock.now()).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].job_id, job_id);
    }

    #[tokio::test]
    async fn pending_jobs_are_listed_in_fire_order() {
        let (store, _clock) = store_with_clock();
        store.insert(reminder(3, 30)).await.unwrap();
        store.insert(reminder(1, 10)).await.unwrap();
        store.insert(reminder(2, 20)).await.unwrap();

        let order: Vec<i64> = store
            .pending_jobs()
            .await
            .unwrap()
            .iter()
            .map(|job| job.task_id.get())
            .collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn purge_terminal_removes_only_old_terminal_records() {
        let (store, clock) = store_with_clock();
        let fired = store.insert(reminder(1, 0)).await.unwrap();
        store.claim_due(clock.now()).await.unwrap();
        store.mark_fired(fired).await.unwrap();
        let pending = store.insert(reminder(2, 60)).await.unwrap();

        clock.advance(Duration::minutes(10));
        let cancelled = store.insert(reminder(3, 60)).await.unwrap();
        store.cancel_by_task_id(TaskId::new(3)).await.unwrap();

        let removed = store
            .purge_terminal(clock.now() - Duration::minutes(5))
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert!(store.get(fired).await.unwrap().is_none());
        assert!(store.get(pending).await.unwrap().is_some());
        assert!(store.get(cancelled).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn purge_drops_heap_entries_of_superseded_far_future_jobs() {
        let (store, clock) = store_with_clock();
        let year = 60 * 24 * 365;
        for shift in 0..5 {
            store.insert(reminder(1, year + shift)).await.unwrap();
        }
        assert_eq!(store.state.lock().await.due.len(), 5);

        clock.advance(Duration::minutes(10));
        let removed = store.purge_terminal(clock.now()).await.unwrap();

        assert_eq!(removed, 4);
        assert_eq!(store.state.lock().await.due.len(), 1);
        let active = store.active_job_for_task(TaskId::new(1)).await.unwrap().unwrap();
        let claimed = store
            .claim_due(start() + Duration::minutes(year + 4))
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].job_id, active.job_id);
    }

    #[tokio::test]
    async fn concurrent_replacements_and_claims_keep_one_active_job_per_task() {
        let (store, clock) = store_with_clock();
        let store = Arc::new(store);

        let mut joins = Vec::new();
        for round in 0..20 {
            for task in 0..5 {
                let store = Arc::clone(&store);
                joins.push(tokio::spawn(async move {
                    store.insert(reminder(task, round % 3)).await.unwrap();
                }));
            }
            let store = Arc::clone(&store);
            let now = clock.now() + Duration::minutes(1);
            joins.push(tokio::spawn(async move {
                store.claim_due(now).await.unwrap();
            }));
        }
        for join in joins {
            join.await.unwrap();
        }

        let state = store.state.lock().await;
        for task in 0..5 {
            let active = state
                .jobs
                .values()
                .filter(|job| job.task_id == TaskId::new(task) && job.status.is_active())
                .count();
            assert_eq!(active, 1, "task {task} has {active} active jobs");
        }
    }
}
