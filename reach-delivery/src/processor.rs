//! Delivery pool orchestration
//!
//! A bounded pool of consumers shares the durable queue. Each worker polls
//! for ready tasks, runs the state machine in `worker.rs`, and drains
//! gracefully on shutdown: no new reservations after the signal, in-flight
//! tasks finish, and the drain is bounded by a timeout.

use std::{sync::Arc, time::Duration};

use reach_common::{Signal, internal};
use reach_queue::TaskQueue;
use reach_store::{DispatchStatus, Store};
use tokio::sync::broadcast;

use crate::{
    config::DeliveryConfig,
    counter::{CounterStore, MemoryCounterStore},
    rate_limiter::RateLimiter,
    sender::MailSender,
    worker::{self, TaskOutcome},
};

/// Processor owning the delivery worker pool
#[derive(Debug)]
pub struct DeliveryProcessor {
    pub config: DeliveryConfig,
    store: Arc<dyn Store>,
    queue: Arc<TaskQueue>,
    limiter: RateLimiter,
    mail_sender: Arc<dyn MailSender>,
}

impl DeliveryProcessor {
    /// Create a processor with an in-process counter store
    #[must_use]
    pub fn new(
        config: DeliveryConfig,
        store: Arc<dyn Store>,
        queue: Arc<TaskQueue>,
        mail_sender: Arc<dyn MailSender>,
    ) -> Self {
        let counters: Arc<dyn CounterStore> = Arc::new(MemoryCounterStore::new());
        Self::with_counter_store(config, store, queue, mail_sender, counters)
    }

    /// Create a processor over an explicit counter store
    #[must_use]
    pub fn with_counter_store(
        config: DeliveryConfig,
        store: Arc<dyn Store>,
        queue: Arc<TaskQueue>,
        mail_sender: Arc<dyn MailSender>,
        counters: Arc<dyn CounterStore>,
    ) -> Self {
        let limiter = RateLimiter::new(config.rate_limit, counters);
        Self {
            config,
            store,
            queue,
            limiter,
            mail_sender,
        }
    }

    /// The shared task queue
    #[must_use]
    pub const fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    /// The relational store
    #[must_use]
    pub const fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// The admission authority
    #[must_use]
    pub const fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// The injected transport
    #[must_use]
    pub const fn mail_sender(&self) -> &Arc<dyn MailSender> {
        &self.mail_sender
    }

    /// Recover state after a restart.
    ///
    /// Restores the queue from its durable store, then returns any dispatch
    /// resting in `Sending` to `Scheduled`: its task was never acknowledged,
    /// so it will run again, and the replay guard keeps anything already
    /// sent from sending twice. Returns the number of live tasks restored.
    ///
    /// # Errors
    /// If the queue or store cannot be read.
    pub async fn recover(&self) -> crate::Result<usize> {
        let restored = self.queue.restore().await?;

        let stuck = self
            .store
            .dispatches_in_status(DispatchStatus::Sending)
            .await?;
        let interrupted = stuck.len();

        for mut dispatch in stuck {
            dispatch.transition(DispatchStatus::Scheduled);
            self.store.update_dispatch(&dispatch).await?;
        }

        if interrupted > 0 {
            internal!(
                level = INFO,
                "Recovered {interrupted} dispatches interrupted mid-send"
            );
        }

        Ok(restored)
    }

    /// Reserve and process a single ready task, if one is available.
    ///
    /// This is the unit the worker loops run; it is public so tests and
    /// embedders can drive the pipeline deterministically.
    ///
    /// # Errors
    /// If reservation itself fails. Processing errors are folded into the
    /// queue's retry policy and reported as `Ok(Some(...))` outcomes.
    pub async fn process_one(&self) -> crate::Result<Option<TaskOutcome>> {
        let Some(task) = self.queue.reserve().await? else {
            return Ok(None);
        };

        match worker::process_task(self, &task).await {
            Ok(outcome) => Ok(Some(outcome)),
            Err(e) => {
                // Persistence trouble is transient by policy: the task goes
                // back through the retry ladder.
                tracing::error!(task = %task.id, error = %e, "Task handler error");
                let state = self.queue.fail(&task, &e.to_string()).await?;
                if state == reach_queue::TaskState::Failed {
                    Ok(Some(TaskOutcome::Failed))
                } else {
                    Ok(Some(TaskOutcome::Retrying))
                }
            }
        }
    }

    /// Run the worker pool until a shutdown signal is received.
    ///
    /// Spawns `worker_concurrency` consumers plus a retention loop. On
    /// shutdown the consumers stop reserving, finish their in-flight task,
    /// and the drain is bounded by `drain_timeout_secs`.
    ///
    /// # Errors
    /// Currently only fails if the runtime refuses to spawn; worker errors
    /// are logged and retried, never fatal.
    pub async fn serve(
        self: Arc<Self>,
        mut shutdown: broadcast::Receiver<Signal>,
    ) -> crate::Result<()> {
        internal!(level = INFO, "Delivery processor starting");

        let mut workers = tokio::task::JoinSet::new();

        for worker_id in 0..self.config.worker_concurrency {
            let processor = Arc::clone(&self);
            let rx = shutdown.resubscribe();
            workers.spawn(worker_loop(processor, worker_id, rx));
        }

        workers.spawn(retention_loop(Arc::clone(&self), shutdown.resubscribe()));

        // Wait for the pool; once the signal lands, bound the drain.
        let mut signaled = false;
        let drain_timeout = Duration::from_secs(self.config.drain_timeout_secs);

        loop {
            if signaled {
                match tokio::time::timeout(drain_timeout, workers.join_next()).await {
                    Ok(None) => break,
                    Ok(Some(Ok(()))) => {}
                    Ok(Some(Err(e))) => {
                        tracing::error!(error = %e, "Worker task panicked");
                    }
                    Err(_) => {
                        tracing::warn!(
                            "Drain timeout exceeded, aborting remaining in-flight deliveries; \
                             they will be retried after restart"
                        );
                        workers.abort_all();
                        break;
                    }
                }
            } else {
                tokio::select! {
                    sig = shutdown.recv() => {
                        match sig {
                            Ok(signal) => internal!("Delivery processor received {signal:?}"),
                            Err(e) => tracing::debug!("Shutdown channel closed: {e}"),
                        }
                        signaled = true;
                    }
                    joined = workers.join_next() => match joined {
                        None => break,
                        Some(Ok(())) => {}
                        Some(Err(e)) => {
                            tracing::error!(error = %e, "Worker task panicked");
                        }
                    },
                }
            }
        }

        internal!(level = INFO, "Delivery processor shutdown complete");
        Ok(())
    }
}

async fn worker_loop(
    processor: Arc<DeliveryProcessor>,
    worker_id: usize,
    mut shutdown: broadcast::Receiver<Signal>,
) {
    let mut poll = tokio::time::interval(Duration::from_millis(processor.config.poll_interval_ms));
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    'serve: loop {
        tokio::select! {
            _ = shutdown.recv() => {
                break 'serve;
            }
            _ = poll.tick() => {
                loop {
                    // Stop reserving as soon as the signal lands; the task
                    // just processed was allowed to finish.
                    match shutdown.try_recv() {
                        Err(broadcast::error::TryRecvError::Empty) => {}
                        _ => break 'serve,
                    }

                    match processor.process_one().await {
                        Ok(Some(outcome)) => {
                            tracing::trace!(worker_id, ?outcome, "Processed task");
                        }
                        Ok(None) => break,
                        Err(e) => {
                            tracing::error!(worker_id, error = %e, "Failed to reserve task");
                            break;
                        }
                    }
                }
            }
        }
    }

    tracing::debug!(worker_id, "Worker drained");
}

async fn retention_loop(processor: Arc<DeliveryProcessor>, mut shutdown: broadcast::Receiver<Signal>) {
    let mut timer =
        tokio::time::interval(Duration::from_secs(processor.config.cleanup_interval_secs));
    // Skip the immediate first tick
    timer.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = timer.tick() => {
                match processor.queue().cleanup().await {
                    Ok(removed) if removed > 0 => {
                        tracing::debug!(removed, "Removed finished tasks past retention");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "Queue retention pass failed");
                    }
                }
            }
        }
    }
}
