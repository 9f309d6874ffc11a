//! Campaign ingress
//!
//! Turns one campaign request into persisted rows and delayed tasks: the
//! campaign row first, then one dispatch row plus one queue task per
//! deduplicated recipient, each offset by the configured spacing. Recipients
//! are iterated individually on purpose: the store's unique
//! `(campaign, recipient)` index is the authoritative dedup mechanism, and a
//! per-row conflict must skip that recipient without aborting the batch.

use std::{collections::HashSet, sync::Arc, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use reach_common::{email::is_valid_recipient, ingress};
use reach_queue::{TaskPayload, TaskQueue};
use reach_store::{Campaign, CampaignStatus, Dispatch, Store};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Maximum subject length accepted at ingress
const MAX_SUBJECT_CHARS: usize = 500;

/// Ingress configuration, derived from the process-wide settings
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Spacing applied when the request does not name one (in milliseconds)
    ///
    /// Default: 2000
    #[serde(default = "default_delay_between_ms")]
    pub default_delay_between_ms: u64,

    /// Hourly limit recorded when the request does not name one
    ///
    /// Default: 50
    #[serde(default = "default_hourly_limit")]
    pub default_hourly_limit: u32,

    /// Clock-skew tolerance for start times slightly in the past
    /// (in seconds)
    ///
    /// Default: 60
    #[serde(default = "default_clock_skew_secs")]
    pub clock_skew_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_delay_between_ms: default_delay_between_ms(),
            default_hourly_limit: default_hourly_limit(),
            clock_skew_secs: default_clock_skew_secs(),
        }
    }
}

const fn default_delay_between_ms() -> u64 {
    2000
}

const fn default_hourly_limit() -> u32 {
    50
}

const fn default_clock_skew_secs() -> u64 {
    60
}

/// Create-campaign request body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCampaignRequest {
    pub user_id: String,
    pub subject: String,
    pub body: String,
    pub recipient_emails: Vec<String>,
    /// ISO-8601 instant
    pub start_time: String,
    pub delay_between_ms: Option<i64>,
    pub hourly_limit: Option<i64>,
}

/// What ingress reports back for a created campaign
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignReceipt {
    pub campaign: Campaign,
    /// Dispatch rows actually created
    pub dispatch_count: usize,
    /// Recipients after deduplication
    pub total_emails: usize,
    /// Recipients skipped because a row already existed
    pub failed: usize,
}

/// Errors surfaced by campaign ingress
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Request validation failed; never retried.
    #[error("{message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// Every recipient conflicted with an existing dispatch row.
    #[error("no new dispatches")]
    NoNewDispatches,

    /// Store failure.
    #[error("Store error: {0}")]
    Store(#[from] reach_store::StoreError),

    /// Queue failure.
    #[error("Queue error: {0}")]
    Queue(#[from] reach_queue::QueueError),
}

fn invalid(field: &'static str, message: impl Into<String>) -> SchedulerError {
    SchedulerError::Validation {
        field,
        message: message.into(),
    }
}

/// Validated form of a create-campaign request
struct ValidatedRequest {
    user_id: Uuid,
    subject: String,
    body: String,
    recipients: Vec<String>,
    start_time: DateTime<Utc>,
    delay_between_ms: u64,
    hourly_limit: u32,
}

/// Campaign ingress over the store and the task queue
#[derive(Debug)]
pub struct CampaignScheduler {
    store: Arc<dyn Store>,
    queue: Arc<TaskQueue>,
    config: SchedulerConfig,
}

impl CampaignScheduler {
    /// Create a new scheduler
    #[must_use]
    pub fn new(store: Arc<dyn Store>, queue: Arc<TaskQueue>, config: SchedulerConfig) -> Self {
        Self {
            store,
            queue,
            config,
        }
    }

    /// Create a campaign: validate, persist the campaign row, then one
    /// dispatch row and one delayed task per recipient.
    ///
    /// # Errors
    /// Validation failures and all-duplicate batches surface as bad-request
    /// errors; store and queue failures are internal.
    pub async fn create_campaign(
        &self,
        request: CreateCampaignRequest,
    ) -> Result<CampaignReceipt, SchedulerError> {
        let request = self.validate(request)?;
        let now = Utc::now();

        let campaign = Campaign::new(
            request.user_id,
            request.subject,
            request.body,
            request.start_time,
            request.delay_between_ms,
            Some(request.hourly_limit),
        );
        self.store.insert_campaign(&campaign).await?;

        let base_delay_ms = u64::try_from(
            (request.start_time - now).num_milliseconds().max(0),
        )
        .unwrap_or(0);

        let mut created = 0usize;
        let mut failed = 0usize;

        for (i, recipient) in request.recipients.iter().enumerate() {
            let delay_ms = base_delay_ms
                .saturating_add((i as u64).saturating_mul(campaign.delay_between_ms));
            let scheduled_at = now
                .checked_add_signed(TimeDelta::milliseconds(
                    i64::try_from(delay_ms).unwrap_or(i64::MAX),
                ))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);

            let dispatch = Dispatch::new(
                campaign.id,
                recipient.clone(),
                campaign.subject.clone(),
                campaign.body.clone(),
                scheduled_at,
            );

            match self.store.insert_dispatch(&dispatch).await {
                Ok(()) => {
                    self.queue
                        .enqueue(
                            TaskPayload {
                                dispatch_id: dispatch.id,
                                campaign_id: campaign.id,
                                recipient_email: dispatch.recipient_email.clone(),
                                subject: dispatch.subject.clone(),
                                body: dispatch.body.clone(),
                                scheduled_at,
                                sender_id: None,
                            },
                            Duration::from_millis(delay_ms),
                        )
                        .await?;
                    created += 1;
                }
                Err(e) if e.is_duplicate() => {
                    ingress!(level = DEBUG, "Skipping duplicate recipient {recipient}");
                    failed += 1;
                }
                Err(e) => {
                    // Mid-batch store trouble: rows already written stay, and
                    // the caller sees the partial result.
                    tracing::error!(
                        campaign = %campaign.id,
                        recipient = %recipient,
                        error = %e,
                        "Dispatch insert failed mid-batch"
                    );
                    if created == 0 {
                        return Err(e.into());
                    }
                    break;
                }
            }
        }

        if created == 0 {
            return Err(SchedulerError::NoNewDispatches);
        }

        self.store
            .update_campaign_status(campaign.id, CampaignStatus::InProgress)
            .await?;
        let campaign = self.store.campaign(campaign.id).await?;

        ingress!(
            level = INFO,
            "Campaign {} scheduled: {created} dispatches, {failed} skipped",
            campaign.id
        );

        Ok(CampaignReceipt {
            campaign,
            dispatch_count: created,
            total_emails: request.recipients.len(),
            failed,
        })
    }

    fn validate(&self, request: CreateCampaignRequest) -> Result<ValidatedRequest, SchedulerError> {
        let user_id = Uuid::parse_str(request.user_id.trim())
            .map_err(|_| invalid("userId", "userId must be a valid UUID"))?;

        let subject = request.subject.trim().to_string();
        if subject.is_empty() {
            return Err(invalid("subject", "Subject must not be empty"));
        }
        if subject.chars().count() > MAX_SUBJECT_CHARS {
            return Err(invalid(
                "subject",
                format!("Subject must be at most {MAX_SUBJECT_CHARS} characters"),
            ));
        }

        if request.body.trim().is_empty() {
            return Err(invalid("body", "Body must not be empty"));
        }

        let start_time = DateTime::parse_from_rfc3339(request.start_time.trim())
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| invalid("startTime", "startTime must be an ISO-8601 instant"))?;

        // Clamped so a nonsense config value cannot overflow the arithmetic
        let skew = TimeDelta::seconds(
            i64::try_from(self.config.clock_skew_secs.min(86_400)).unwrap_or(86_400),
        );
        if start_time < Utc::now() - skew {
            return Err(invalid("startTime", "Start time cannot be in the past"));
        }

        let delay_between_ms = match request.delay_between_ms {
            Some(delay) if delay < 0 => {
                return Err(invalid("delayBetweenMs", "delayBetweenMs must be >= 0"));
            }
            Some(delay) => u64::try_from(delay).unwrap_or(0),
            None => self.config.default_delay_between_ms,
        };

        let hourly_limit = match request.hourly_limit {
            Some(limit) if limit < 1 => {
                return Err(invalid("hourlyLimit", "hourlyLimit must be >= 1"));
            }
            Some(limit) => u32::try_from(limit)
                .map_err(|_| invalid("hourlyLimit", "hourlyLimit is out of range"))?,
            None => self.config.default_hourly_limit,
        };

        if request.recipient_emails.is_empty() {
            return Err(invalid(
                "recipientEmails",
                "recipientEmails must not be empty",
            ));
        }

        // Validate first, then deduplicate preserving first-seen order
        let mut seen = HashSet::new();
        let mut recipients = Vec::new();
        for raw in &request.recipient_emails {
            let recipient = raw.trim();
            if !is_valid_recipient(recipient) {
                return Err(invalid(
                    "recipientEmails",
                    format!("Invalid recipient address: {raw}"),
                ));
            }
            if seen.insert(recipient.to_string()) {
                recipients.push(recipient.to_string());
            }
        }

        Ok(ValidatedRequest {
            user_id,
            subject,
            body: request.body,
            recipients,
            start_time,
            delay_between_ms,
            hourly_limit,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use reach_queue::MemoryQueueStore;
    use reach_store::MemoryStore;

    use super::*;

    fn scheduler() -> (CampaignScheduler, Arc<TaskQueue>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(TaskQueue::new(Arc::new(MemoryQueueStore::new())));
        let scheduler = CampaignScheduler::new(
            store.clone() as Arc<dyn Store>,
            queue.clone(),
            SchedulerConfig::default(),
        );
        (scheduler, queue, store)
    }

    fn request(recipients: &[&str], start_time: DateTime<Utc>) -> CreateCampaignRequest {
        CreateCampaignRequest {
            user_id: Uuid::new_v4().to_string(),
            subject: "Launch".to_string(),
            body: "Hello there".to_string(),
            recipient_emails: recipients.iter().map(ToString::to_string).collect(),
            start_time: start_time.to_rfc3339(),
            delay_between_ms: Some(2000),
            hourly_limit: None,
        }
    }

    fn field_of(err: &SchedulerError) -> &'static str {
        match err {
            SchedulerError::Validation { field, .. } => *field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn happy_path_spaces_dispatches() {
        let (scheduler, queue, store) = scheduler();
        let now = Utc::now();
        let start = now + TimeDelta::seconds(60);

        let receipt = scheduler
            .create_campaign(request(&["a@x.io", "b@x.io"], start))
            .await
            .unwrap();

        assert_eq!(receipt.dispatch_count, 2);
        assert_eq!(receipt.total_emails, 2);
        assert_eq!(receipt.failed, 0);
        assert_eq!(receipt.campaign.status, CampaignStatus::InProgress);

        let dispatches = store
            .dispatches_for_campaign(receipt.campaign.id)
            .await
            .unwrap();
        assert_eq!(dispatches.len(), 2);
        assert_eq!(dispatches[0].recipient_email, "a@x.io");
        assert_eq!(dispatches[1].recipient_email, "b@x.io");

        // 60s and 62s ahead, within scheduling slop
        let first_offset = (dispatches[0].scheduled_time - now).num_milliseconds();
        let second_offset = (dispatches[1].scheduled_time - now).num_milliseconds();
        assert!((59_000..=61_000).contains(&first_offset), "{first_offset}");
        assert!((61_000..=63_000).contains(&second_offset), "{second_offset}");

        assert_eq!(queue.len().await, 2);
        let metrics = queue.metrics().await;
        assert_eq!(metrics.delayed, 2, "neither task is ready yet");
    }

    #[tokio::test]
    async fn duplicate_recipients_are_deduplicated() {
        let (scheduler, queue, _) = scheduler();

        let receipt = scheduler
            .create_campaign(request(&["a@x.io", "a@x.io", "b@x.io"], Utc::now()))
            .await
            .unwrap();

        assert_eq!(receipt.dispatch_count, 2);
        assert_eq!(receipt.total_emails, 2);
        assert_eq!(receipt.failed, 0);
        assert_eq!(queue.len().await, 2);
    }

    #[tokio::test]
    async fn past_start_times_depend_on_skew() {
        let (scheduler, _, store) = scheduler();

        let err = scheduler
            .create_campaign(request(&["a@x.io"], Utc::now() - TimeDelta::seconds(120)))
            .await
            .unwrap_err();
        assert_eq!(field_of(&err), "startTime");
        assert_eq!(err.to_string(), "Start time cannot be in the past");

        // Within the 60s tolerance: accepted with base delay clamped to zero
        let receipt = scheduler
            .create_campaign(request(&["a@x.io"], Utc::now() - TimeDelta::seconds(30)))
            .await
            .unwrap();
        let dispatches = store
            .dispatches_for_campaign(receipt.campaign.id)
            .await
            .unwrap();
        let offset = (dispatches[0].scheduled_time - Utc::now()).num_seconds();
        assert!(offset.abs() <= 2, "base delay clamps to zero, got {offset}s");
    }

    #[tokio::test]
    async fn validation_rejects_malformed_fields() {
        let (scheduler, _, _) = scheduler();
        let start = Utc::now() + TimeDelta::seconds(60);

        let mut bad_user = request(&["a@x.io"], start);
        bad_user.user_id = "not-a-uuid".to_string();
        assert_eq!(
            field_of(&scheduler.create_campaign(bad_user).await.unwrap_err()),
            "userId"
        );

        let mut empty_subject = request(&["a@x.io"], start);
        empty_subject.subject = "   ".to_string();
        assert_eq!(
            field_of(&scheduler.create_campaign(empty_subject).await.unwrap_err()),
            "subject"
        );

        let mut long_subject = request(&["a@x.io"], start);
        long_subject.subject = "x".repeat(501);
        assert_eq!(
            field_of(&scheduler.create_campaign(long_subject).await.unwrap_err()),
            "subject"
        );

        let mut empty_body = request(&["a@x.io"], start);
        empty_body.body = String::new();
        assert_eq!(
            field_of(&scheduler.create_campaign(empty_body).await.unwrap_err()),
            "body"
        );

        let mut bad_time = request(&["a@x.io"], start);
        bad_time.start_time = "next tuesday".to_string();
        assert_eq!(
            field_of(&scheduler.create_campaign(bad_time).await.unwrap_err()),
            "startTime"
        );

        let mut bad_recipient = request(&["a@x.io", "not-an-email"], start);
        bad_recipient.recipient_emails[1] = "not-an-email".to_string();
        assert_eq!(
            field_of(&scheduler.create_campaign(bad_recipient).await.unwrap_err()),
            "recipientEmails"
        );

        assert_eq!(
            field_of(
                &scheduler
                    .create_campaign(request(&[], start))
                    .await
                    .unwrap_err()
            ),
            "recipientEmails"
        );

        let mut bad_delay = request(&["a@x.io"], start);
        bad_delay.delay_between_ms = Some(-1);
        assert_eq!(
            field_of(&scheduler.create_campaign(bad_delay).await.unwrap_err()),
            "delayBetweenMs"
        );

        let mut bad_limit = request(&["a@x.io"], start);
        bad_limit.hourly_limit = Some(0);
        assert_eq!(
            field_of(&scheduler.create_campaign(bad_limit).await.unwrap_err()),
            "hourlyLimit"
        );
    }

    #[tokio::test]
    async fn defaults_are_applied() {
        let (scheduler, _, _) = scheduler();

        let mut req = request(&["a@x.io"], Utc::now() + TimeDelta::seconds(10));
        req.delay_between_ms = None;
        req.hourly_limit = None;

        let receipt = scheduler.create_campaign(req).await.unwrap();
        assert_eq!(receipt.campaign.delay_between_ms, 2000);
        assert_eq!(receipt.campaign.hourly_limit, Some(50));
    }

    #[tokio::test]
    async fn enqueue_is_idempotent_per_dispatch() {
        let (scheduler, queue, store) = scheduler();

        let receipt = scheduler
            .create_campaign(request(&["a@x.io"], Utc::now()))
            .await
            .unwrap();

        // Re-enqueueing the same dispatch is a no-op
        let dispatches = store
            .dispatches_for_campaign(receipt.campaign.id)
            .await
            .unwrap();
        let outcome = queue
            .enqueue(
                TaskPayload {
                    dispatch_id: dispatches[0].id,
                    campaign_id: receipt.campaign.id,
                    recipient_email: dispatches[0].recipient_email.clone(),
                    subject: dispatches[0].subject.clone(),
                    body: dispatches[0].body.clone(),
                    scheduled_at: dispatches[0].scheduled_time,
                    sender_id: None,
                },
                Duration::ZERO,
            )
            .await
            .unwrap();
        assert!(!outcome.is_created());
        assert_eq!(queue.len().await, 1);
    }
}
