//! The per-task delivery state machine
//!
//! Every branch writes the dispatch row before yielding the task back to the
//! queue, so crash recovery can always resume from the row's state. The
//! ordering contracts here are load-bearing:
//!
//! - `mail_sender.send` is only ever reached through an admission that
//!   returned allowed.
//! - A rate-limit rejection reschedules the task into the next hour window
//!   and does not touch the attempt counter.
//! - A failed send does not refund its admission; retries still have to fit
//!   inside the hourly budget.

use std::time::Duration;

use chrono::Utc;
use reach_queue::{Task, TaskState};
use reach_store::{CampaignStatus, DispatchStatus, StoreError};

use crate::{processor::DeliveryProcessor, sender::OutgoingEmail};

/// What became of one reserved task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Transport accepted the message; dispatch is `Sent`
    Delivered,
    /// Replay guard: the dispatch was already `Sent`, nothing was sent
    AlreadySent,
    /// Admission denied; task rescheduled into the next hour window
    RateLimited,
    /// Transport failed; attempt consumed, task backing off
    Retrying,
    /// Transport failed and the retry budget is exhausted
    Failed,
    /// The dispatch row no longer exists (campaign deleted mid-flight)
    Orphaned,
}

pub(crate) async fn process_task(
    processor: &DeliveryProcessor,
    task: &Task,
) -> crate::Result<TaskOutcome> {
    let store = processor.store();
    let queue = processor.queue();

    let mut dispatch = match store.dispatch(task.payload.dispatch_id).await {
        Ok(dispatch) => dispatch,
        Err(StoreError::DispatchNotFound(id)) => {
            tracing::warn!(dispatch = %id, task = %task.id, "Dispatch row missing, dropping task");
            queue.ack(task).await?;
            return Ok(TaskOutcome::Orphaned);
        }
        Err(e) => return Err(e.into()),
    };

    // Idempotent replay guard: a redelivered task for a sent dispatch is
    // silent success.
    if dispatch.status == DispatchStatus::Sent {
        queue.ack(task).await?;
        return Ok(TaskOutcome::AlreadySent);
    }

    dispatch.transition(DispatchStatus::Sending);
    store.update_dispatch(&dispatch).await?;

    let admission = processor
        .limiter()
        .try_admit(task.payload.sender_id.as_deref())
        .await?;

    if !admission.allowed {
        dispatch.transition(DispatchStatus::RateLimited);
        dispatch.scheduled_time = admission.reset_at;
        store.update_dispatch(&dispatch).await?;

        let delay = (admission.reset_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        queue.reschedule(task, delay).await?;

        reach_common::delivery!(
            level = DEBUG,
            "Dispatch {} rate limited until {}",
            dispatch.id,
            admission.reset_at
        );
        return Ok(TaskOutcome::RateLimited);
    }

    // Spacing between outbound SMTP conversations; applied after admission
    // so it throttles the transport, not admission throughput.
    let spacing = processor.config.min_delay_between_emails_ms;
    if spacing > 0 {
        tokio::time::sleep(Duration::from_millis(spacing)).await;
    }

    let from = store
        .active_sender_account()
        .await?
        .map(|account| account.email);

    let email = OutgoingEmail {
        to: task.payload.recipient_email.clone(),
        subject: task.payload.subject.clone(),
        body: task.payload.body.clone(),
        from,
    };

    match processor.mail_sender().send(&email).await {
        Ok(receipt) => {
            dispatch.transition(DispatchStatus::Sent);
            dispatch.sent_time = Some(Utc::now());
            dispatch.sender_email = Some(receipt.message_id);
            dispatch.error_message = None;
            store.update_dispatch(&dispatch).await?;
            queue.ack(task).await?;

            reach_common::delivery!(
                level = INFO,
                "Dispatch {} sent to {}",
                dispatch.id,
                dispatch.recipient_email
            );

            maybe_complete_campaign(processor, &dispatch).await;
            Ok(TaskOutcome::Delivered)
        }
        Err(transport_error) => {
            // The admission is not refunded: the failed attempt consumed its
            // slot, so a flood of retries cannot bypass the hourly budget.
            dispatch.error_message = Some(transport_error.to_string());

            let state = queue.fail(task, &transport_error.to_string()).await?;
            if state == TaskState::Failed {
                dispatch.transition(DispatchStatus::Failed);
                store.update_dispatch(&dispatch).await?;

                tracing::error!(
                    dispatch = %dispatch.id,
                    recipient = %dispatch.recipient_email,
                    error = %transport_error,
                    "Dispatch failed permanently"
                );

                maybe_complete_campaign(processor, &dispatch).await;
                Ok(TaskOutcome::Failed)
            } else {
                // Budget remains: the row goes back to scheduled, aligned
                // with the task's backoff instant.
                dispatch.transition(DispatchStatus::Scheduled);
                if let Some(parked) = queue.task(&task.id).await {
                    dispatch.scheduled_time = parked.ready_at;
                }
                store.update_dispatch(&dispatch).await?;

                tracing::warn!(
                    dispatch = %dispatch.id,
                    error = %transport_error,
                    "Transport failure, retry scheduled"
                );
                Ok(TaskOutcome::Retrying)
            }
        }
    }
}

/// Advisory campaign completion: once no non-terminal dispatches remain,
/// flip the campaign to `Completed`. Correctness never depends on this.
async fn maybe_complete_campaign(
    processor: &DeliveryProcessor,
    dispatch: &reach_store::Dispatch,
) {
    let store = processor.store();

    match store.open_dispatch_count(dispatch.campaign_id).await {
        Ok(0) => {
            if let Err(e) = store
                .update_campaign_status(dispatch.campaign_id, CampaignStatus::Completed)
                .await
            {
                tracing::warn!(
                    campaign = %dispatch.campaign_id,
                    error = %e,
                    "Failed to mark campaign completed"
                );
            }
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(
                campaign = %dispatch.campaign_id,
                error = %e,
                "Failed to count open dispatches"
            );
        }
    }
}
