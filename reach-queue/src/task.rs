//! Task records carried by the queue

use chrono::{DateTime, Utc};
use reach_store::{CampaignId, DispatchId};
use serde::{Deserialize, Serialize};

use crate::TASK_KIND;

const TASK_ID_PREFIX: &str = "emailTask-";

/// Identifier for a queued task
///
/// Task ids are deterministic from dispatch ids (`emailTask-<dispatch-uuid>`),
/// which is what makes enqueueing idempotent: a second enqueue for the same
/// dispatch maps to the same id and is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Derive the task id for a dispatch
    #[must_use]
    pub fn for_dispatch(dispatch_id: DispatchId) -> Self {
        Self(format!("{TASK_ID_PREFIX}{dispatch_id}"))
    }

    /// Parse a task id from a record filename like `emailTask-<uuid>.bin`
    ///
    /// Validates shape and the embedded UUID, which also guards against path
    /// traversal through crafted filenames.
    #[must_use]
    pub fn from_filename(filename: &str) -> Option<Self> {
        if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
            return None;
        }

        let stem = filename.strip_suffix(".bin")?;
        let raw = stem.strip_prefix(TASK_ID_PREFIX)?;
        DispatchId::parse(raw).ok()?;

        Some(Self(stem.to_string()))
    }

    /// The dispatch this task belongs to
    #[must_use]
    pub fn dispatch_id(&self) -> Option<DispatchId> {
        self.0
            .strip_prefix(TASK_ID_PREFIX)
            .and_then(|raw| DispatchId::parse(raw).ok())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Queue-side lifecycle of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    /// Waiting for its ready-at instant
    Delayed,
    /// Ready to be reserved by a worker
    Waiting,
    /// Reserved by a worker, hidden from other consumers
    Active,
    /// Acknowledged after successful processing
    Completed,
    /// Retry budget exhausted
    Failed,
}

impl TaskState {
    /// Whether the task will never run again
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Everything a worker needs to deliver one email
///
/// Subject and body ride along so a worker never depends on the campaign row
/// still matching what was scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPayload {
    pub dispatch_id: DispatchId,
    pub campaign_id: CampaignId,
    pub recipient_email: String,
    pub subject: String,
    pub body: String,
    /// The instant this dispatch was originally scheduled for
    pub scheduled_at: DateTime<Utc>,
    /// Sender account identifier, when upstream wires one in
    pub sender_id: Option<String>,
}

/// A durable queue record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub kind: String,
    pub payload: TaskPayload,
    pub state: TaskState,
    /// Earliest instant a worker may reserve this task
    pub ready_at: DateTime<Utc>,
    /// Completed delivery attempts; rescheduling does not advance this
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new task for a dispatch, delayed until `ready_at`
    #[must_use]
    pub fn new(payload: TaskPayload, ready_at: DateTime<Utc>) -> Self {
        let now = Utc::now();
        let state = if ready_at <= now {
            TaskState::Waiting
        } else {
            TaskState::Delayed
        };

        Self {
            id: TaskId::for_dispatch(payload.dispatch_id),
            kind: TASK_KIND.to_string(),
            payload,
            state,
            ready_at,
            attempts: 0,
            last_error: None,
            created_at: now,
            finished_at: None,
        }
    }

    /// Whether the task's ready-at instant has passed
    #[must_use]
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        matches!(self.state, TaskState::Waiting | TaskState::Delayed) && self.ready_at <= now
    }
}
