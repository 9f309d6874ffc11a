//! The delayed task queue
//!
//! Tasks are keyed by their deterministic id, held in memory for fast
//! reservation, and written through to a [`QueueStore`] so the full queue
//! survives process restarts. Reservation hides a task from other consumers
//! until it is acknowledged, rescheduled, or failed.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    QueueError,
    backends::QueueStore,
    metrics::QueueMetrics,
    retention::RetentionPolicy,
    retry::RetryPolicy,
    task::{Task, TaskId, TaskPayload, TaskState},
};

/// Outcome of an enqueue call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enqueued {
    /// A new task was created
    Created(TaskId),
    /// A task with this id already exists; nothing was written
    AlreadyQueued(TaskId),
}

impl Enqueued {
    #[must_use]
    pub const fn task_id(&self) -> &TaskId {
        match self {
            Self::Created(id) | Self::AlreadyQueued(id) => id,
        }
    }

    #[must_use]
    pub const fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Durable delayed task queue shared by the scheduler and the worker pool
#[derive(Debug)]
pub struct TaskQueue {
    store: Arc<dyn QueueStore>,
    tasks: RwLock<HashMap<TaskId, Task>>,
    retry: RetryPolicy,
    retention: RetentionPolicy,
}

impl TaskQueue {
    /// Create a queue over the given store with default policies
    #[must_use]
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self::with_policies(store, RetryPolicy::default(), RetentionPolicy::default())
    }

    /// Create a queue with explicit retry and retention policies
    #[must_use]
    pub fn with_policies(
        store: Arc<dyn QueueStore>,
        retry: RetryPolicy,
        retention: RetentionPolicy,
    ) -> Self {
        Self {
            store,
            tasks: RwLock::new(HashMap::new()),
            retry,
            retention,
        }
    }

    /// The retry policy applied to failed tasks
    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Reload every persisted task after a restart.
    ///
    /// Tasks that were `Active` when the process died were reserved but never
    /// acknowledged; they return to `Waiting` with their original ready-at so
    /// they run again. Returns the number of non-terminal tasks recovered.
    ///
    /// # Errors
    /// If the store cannot be read or an un-parked record cannot be written.
    pub async fn restore(&self) -> crate::Result<usize> {
        let records = self.store.list().await?;
        let mut tasks = self.tasks.write().await;
        let mut recovered = 0;

        for mut task in records {
            if task.state == TaskState::Active {
                task.state = TaskState::Waiting;
                self.store.put(&task).await?;
            }

            if !task.state.is_terminal() {
                recovered += 1;
            }

            tasks.insert(task.id.clone(), task);
        }

        tracing::info!(recovered, total = tasks.len(), "Restored task queue");

        Ok(recovered)
    }

    /// Append a task, delayed by `delay` from now.
    ///
    /// Enqueue is idempotent on the deterministic task id: a second call for
    /// the same dispatch is a no-op, no matter what state the existing task
    /// is in.
    ///
    /// # Errors
    /// If the record cannot be persisted.
    pub async fn enqueue(&self, payload: TaskPayload, delay: Duration) -> crate::Result<Enqueued> {
        let id = TaskId::for_dispatch(payload.dispatch_id);

        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&id) {
            return Ok(Enqueued::AlreadyQueued(id));
        }

        let task = Task::new(payload, after(Utc::now(), delay));
        self.store.put(&task).await?;
        tasks.insert(id.clone(), task);

        Ok(Enqueued::Created(id))
    }

    /// Reserve the next ready task, if any.
    ///
    /// Tasks whose ready-at has passed are handed out in approximate
    /// ready-at order; a reserved task is hidden from other consumers until
    /// it is acknowledged, rescheduled, or failed.
    ///
    /// # Errors
    /// If the reservation cannot be persisted.
    pub async fn reserve(&self) -> crate::Result<Option<Task>> {
        let now = Utc::now();
        let mut tasks = self.tasks.write().await;

        for task in tasks.values_mut() {
            if task.state == TaskState::Delayed && task.ready_at <= now {
                task.state = TaskState::Waiting;
            }
        }

        let candidate = tasks
            .values()
            .filter(|t| t.state == TaskState::Waiting && t.ready_at <= now)
            .min_by(|a, b| {
                a.ready_at
                    .cmp(&b.ready_at)
                    .then_with(|| a.created_at.cmp(&b.created_at))
                    .then_with(|| a.id.cmp(&b.id))
            })
            .map(|t| t.id.clone());

        let Some(id) = candidate else {
            return Ok(None);
        };

        let task = tasks
            .get_mut(&id)
            .ok_or_else(|| QueueError::Internal(format!("reserved task vanished: {id}")))?;
        task.state = TaskState::Active;
        let snapshot = task.clone();
        self.store.put(&snapshot).await?;

        Ok(Some(snapshot))
    }

    /// Acknowledge a processed task.
    ///
    /// The record is marked completed and retained per the retention policy
    /// rather than removed immediately.
    ///
    /// # Errors
    /// `QueueError::NotFound` if the task is unknown.
    pub async fn ack(&self, task: &Task) -> crate::Result<()> {
        let mut tasks = self.tasks.write().await;
        let entry = tasks
            .get_mut(&task.id)
            .ok_or_else(|| QueueError::NotFound(task.id.clone()))?;

        entry.state = TaskState::Completed;
        entry.finished_at = Some(Utc::now());
        let snapshot = entry.clone();
        self.store.put(&snapshot).await
    }

    /// Return a task to the delayed state with a new ready-at.
    ///
    /// Identity and the attempt counter are preserved: rescheduling is how
    /// rate-limited tasks wait out the hour window, and it must not consume
    /// any of the retry budget.
    ///
    /// # Errors
    /// `QueueError::NotFound` if the task is unknown.
    pub async fn reschedule(&self, task: &Task, delay: Duration) -> crate::Result<()> {
        let mut tasks = self.tasks.write().await;
        let entry = tasks
            .get_mut(&task.id)
            .ok_or_else(|| QueueError::NotFound(task.id.clone()))?;

        entry.state = TaskState::Delayed;
        entry.ready_at = after(Utc::now(), delay);
        let snapshot = entry.clone();
        self.store.put(&snapshot).await
    }

    /// Record a failed attempt and apply the retry policy.
    ///
    /// While budget remains the task backs off exponentially; once the
    /// budget is exhausted it parks as `Failed` and is retained for
    /// inspection. Returns the task's resulting state.
    ///
    /// # Errors
    /// `QueueError::NotFound` if the task is unknown.
    pub async fn fail(&self, task: &Task, error: &str) -> crate::Result<TaskState> {
        let now = Utc::now();
        let mut tasks = self.tasks.write().await;
        let entry = tasks
            .get_mut(&task.id)
            .ok_or_else(|| QueueError::NotFound(task.id.clone()))?;

        entry.attempts += 1;
        entry.last_error = Some(error.to_string());

        if self.retry.should_retry(entry.attempts) {
            entry.state = TaskState::Delayed;
            entry.ready_at = after(now, self.retry.backoff_for(entry.attempts));
        } else {
            entry.state = TaskState::Failed;
            entry.finished_at = Some(now);
        }

        let snapshot = entry.clone();
        self.store.put(&snapshot).await?;

        Ok(snapshot.state)
    }

    /// Snapshot queue depth by state.
    ///
    /// Delayed tasks whose ready-at has passed are counted as waiting; they
    /// are reservable on the next poll.
    pub async fn metrics(&self) -> QueueMetrics {
        let now = Utc::now();
        let tasks = self.tasks.read().await;
        let mut metrics = QueueMetrics::default();

        for task in tasks.values() {
            match task.state {
                TaskState::Waiting => metrics.waiting += 1,
                TaskState::Delayed if task.ready_at <= now => metrics.waiting += 1,
                TaskState::Delayed => metrics.delayed += 1,
                TaskState::Active => metrics.active += 1,
                TaskState::Completed => metrics.completed += 1,
                TaskState::Failed => metrics.failed += 1,
            }
        }

        metrics
    }

    /// Drop finished tasks that have aged out of their retention window.
    ///
    /// Completed tasks are kept for the configured window or until the
    /// newest-N cap evicts them; failed tasks keep a longer window. Returns
    /// the number of records removed.
    ///
    /// # Errors
    /// If a record removal fails.
    pub async fn cleanup(&self) -> crate::Result<usize> {
        self.cleanup_at(Utc::now()).await
    }

    /// Retention pass evaluated against an explicit `now`.
    ///
    /// # Errors
    /// If a record removal fails.
    pub async fn cleanup_at(&self, now: DateTime<Utc>) -> crate::Result<usize> {
        let completed_cutoff = now
            - chrono::Duration::from_std(self.retention.completed_for())
                .unwrap_or_else(|_| chrono::Duration::zero());
        let failed_cutoff = now
            - chrono::Duration::from_std(self.retention.failed_for())
                .unwrap_or_else(|_| chrono::Duration::zero());

        let mut tasks = self.tasks.write().await;
        let mut expired: Vec<TaskId> = Vec::new();

        let mut completed: Vec<(TaskId, DateTime<Utc>)> = Vec::new();
        for task in tasks.values() {
            let finished = task.finished_at.unwrap_or(task.created_at);
            match task.state {
                TaskState::Completed => {
                    if finished < completed_cutoff {
                        expired.push(task.id.clone());
                    } else {
                        completed.push((task.id.clone(), finished));
                    }
                }
                TaskState::Failed => {
                    if finished < failed_cutoff {
                        expired.push(task.id.clone());
                    }
                }
                _ => {}
            }
        }

        // Newest-N cap on retained completed tasks
        if completed.len() > self.retention.completed_max {
            completed.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            expired.extend(
                completed
                    .drain(self.retention.completed_max..)
                    .map(|(id, _)| id),
            );
        }

        for id in &expired {
            tasks.remove(id);
            self.store.remove(id).await?;
        }

        if !expired.is_empty() {
            tracing::debug!(removed = expired.len(), "Queue retention pass");
        }

        Ok(expired.len())
    }

    /// Look up a task by id
    pub async fn task(&self, id: &TaskId) -> Option<Task> {
        self.tasks.read().await.get(id).cloned()
    }

    /// Number of tasks currently tracked (all states)
    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// Check whether the queue tracks no tasks at all
    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}

fn after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| now.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use reach_store::{CampaignId, DispatchId};

    use super::*;
    use crate::backends::MemoryQueueStore;

    fn queue() -> TaskQueue {
        TaskQueue::new(Arc::new(MemoryQueueStore::new()))
    }

    fn payload() -> TaskPayload {
        payload_for(DispatchId::generate())
    }

    fn payload_for(dispatch_id: DispatchId) -> TaskPayload {
        TaskPayload {
            dispatch_id,
            campaign_id: CampaignId::generate(),
            recipient_email: "a@x.io".to_string(),
            subject: "subject".to_string(),
            body: "body".to_string(),
            scheduled_at: Utc::now(),
            sender_id: None,
        }
    }

    #[tokio::test]
    async fn enqueue_is_idempotent_on_task_id() {
        let queue = queue();
        let dispatch_id = DispatchId::generate();

        let first = queue
            .enqueue(payload_for(dispatch_id), Duration::ZERO)
            .await
            .unwrap();
        assert!(first.is_created());

        let second = queue
            .enqueue(payload_for(dispatch_id), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(!second.is_created());
        assert_eq!(first.task_id(), second.task_id());
        assert_eq!(queue.len().await, 1);

        // Still a no-op after the task completes
        let task = queue.reserve().await.unwrap().unwrap();
        queue.ack(&task).await.unwrap();
        let third = queue
            .enqueue(payload_for(dispatch_id), Duration::ZERO)
            .await
            .unwrap();
        assert!(!third.is_created());
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn reserve_respects_ready_at() {
        let queue = queue();
        queue.enqueue(payload(), Duration::ZERO).await.unwrap();
        queue
            .enqueue(payload(), Duration::from_secs(3600))
            .await
            .unwrap();

        let task = queue.reserve().await.unwrap().expect("one ready task");
        assert_eq!(task.state, TaskState::Active);

        // The delayed task is not handed out, and the active one is hidden
        assert!(queue.reserve().await.unwrap().is_none());

        let metrics = queue.metrics().await;
        assert_eq!(metrics.active, 1);
        assert_eq!(metrics.delayed, 1);
    }

    #[tokio::test]
    async fn reserve_hands_out_oldest_ready_first() {
        let queue = queue();
        let first = queue.enqueue(payload(), Duration::ZERO).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = queue.enqueue(payload(), Duration::ZERO).await.unwrap();

        let a = queue.reserve().await.unwrap().unwrap();
        let b = queue.reserve().await.unwrap().unwrap();
        assert_eq!(&a.id, first.task_id());
        assert_eq!(&b.id, second.task_id());
    }

    #[tokio::test]
    async fn reschedule_preserves_identity_and_attempts() {
        let queue = queue();
        queue.enqueue(payload(), Duration::ZERO).await.unwrap();
        let task = queue.reserve().await.unwrap().unwrap();

        queue
            .reschedule(&task, Duration::from_secs(1800))
            .await
            .unwrap();

        let parked = queue.task(&task.id).await.unwrap();
        assert_eq!(parked.id, task.id);
        assert_eq!(parked.state, TaskState::Delayed);
        assert_eq!(parked.attempts, 0);
        assert!(parked.ready_at > Utc::now() + chrono::Duration::seconds(1700));
        assert!(queue.reserve().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fail_backs_off_then_parks() {
        let queue = queue();
        queue.enqueue(payload(), Duration::ZERO).await.unwrap();
        let task = queue.reserve().await.unwrap().unwrap();

        let before = Utc::now();
        let state = queue.fail(&task, "connection refused").await.unwrap();
        assert_eq!(state, TaskState::Delayed);
        let retry = queue.task(&task.id).await.unwrap();
        assert_eq!(retry.attempts, 1);
        assert_eq!(retry.last_error.as_deref(), Some("connection refused"));
        let delay = (retry.ready_at - before).num_seconds();
        assert!((4..=6).contains(&delay), "first backoff ≈5s, got {delay}s");

        let state = queue.fail(&task, "connection refused").await.unwrap();
        assert_eq!(state, TaskState::Delayed);
        let retry = queue.task(&task.id).await.unwrap();
        let delay = (retry.ready_at - Utc::now()).num_seconds();
        assert!((23..=25).contains(&delay), "second backoff ≈25s, got {delay}s");

        let state = queue.fail(&task, "connection refused").await.unwrap();
        assert_eq!(state, TaskState::Failed);
        let parked = queue.task(&task.id).await.unwrap();
        assert_eq!(parked.attempts, 3);
        assert!(parked.finished_at.is_some());
        assert_eq!(queue.metrics().await.failed, 1);
    }

    #[tokio::test]
    async fn cleanup_enforces_retention_windows() {
        let queue = queue();

        queue.enqueue(payload(), Duration::ZERO).await.unwrap();
        let done = queue.reserve().await.unwrap().unwrap();
        queue.ack(&done).await.unwrap();

        queue.enqueue(payload(), Duration::ZERO).await.unwrap();
        let broken = queue.reserve().await.unwrap().unwrap();
        for _ in 0..3 {
            queue.fail(&broken, "boom").await.unwrap();
        }

        let now = Utc::now();
        assert_eq!(queue.cleanup_at(now).await.unwrap(), 0);

        // Completed ages out after a day, failed only after a week
        let removed = queue
            .cleanup_at(now + chrono::Duration::hours(25))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(queue.task(&done.id).await.is_none());
        assert!(queue.task(&broken.id).await.is_some());

        let removed = queue
            .cleanup_at(now + chrono::Duration::days(8))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(queue.task(&broken.id).await.is_none());
    }

    #[tokio::test]
    async fn cleanup_caps_retained_completed_tasks() {
        let retention = RetentionPolicy {
            completed_max: 2,
            ..RetentionPolicy::default()
        };
        let queue = TaskQueue::with_policies(
            Arc::new(MemoryQueueStore::new()),
            RetryPolicy::default(),
            retention,
        );

        for _ in 0..3 {
            queue.enqueue(payload(), Duration::ZERO).await.unwrap();
            let task = queue.reserve().await.unwrap().unwrap();
            queue.ack(&task).await.unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(queue.cleanup().await.unwrap(), 1);
        assert_eq!(queue.metrics().await.completed, 2);
    }
}
