//! Process controller
//!
//! Owns the wiring: opens the store and queue backends, recovers pending
//! work, and runs the API server and delivery pool until a shutdown signal.
//! Configuration comes from the RON config file with every deployment knob
//! overridable through the environment.

use std::sync::{Arc, LazyLock};

use reach_api::{ApiServer, AppState, CampaignScheduler, StatusReporter};
use reach_common::{Signal, internal, logging};
use reach_delivery::{DeliveryProcessor, DevMailSender, MailSender};
use reach_queue::TaskQueue;
use serde::Deserialize;
use tokio::sync::broadcast;

/// Top-level configuration, one section per component
#[derive(Debug, Default, Deserialize)]
pub struct Reach {
    #[serde(default)]
    api: reach_api::ApiConfig,
    #[serde(default)]
    scheduler: reach_api::SchedulerConfig,
    #[serde(default)]
    store: reach_store::StoreConfig,
    #[serde(default)]
    queue: reach_queue::QueueConfig,
    #[serde(default)]
    delivery: reach_delivery::DeliveryConfig,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!("CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!("Terminate signal received, shutting down");
        }
    }

    let mut receiver = SHUTDOWN_BROADCAST.subscribe();

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    loop {
        tokio::select! {
            sig = receiver.recv() => {
                match sig {
                    Ok(s) => tracing::debug!("Received {s:?}"),
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(e) => tracing::debug!("Received: {e:?}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    Ok(())
}

fn env_override<T: std::str::FromStr>(name: &str, target: &mut T) {
    if let Ok(value) = std::env::var(name) {
        match value.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!(name, value, "Ignoring unparseable environment override"),
        }
    }
}

impl Reach {
    /// Apply the environment overrides on top of the config file
    pub fn apply_env(&mut self) {
        if let Ok(port) = std::env::var("PORT") {
            self.api.listen_address = format!("0.0.0.0:{port}");
        }

        env_override(
            "MAX_EMAILS_PER_HOUR",
            &mut self.delivery.rate_limit.max_emails_per_hour,
        );
        env_override(
            "MAX_EMAILS_PER_HOUR_PER_SENDER",
            &mut self.delivery.rate_limit.max_emails_per_hour_per_sender,
        );
        env_override(
            "MIN_DELAY_BETWEEN_EMAILS_MS",
            &mut self.delivery.min_delay_between_emails_ms,
        );
        env_override("WORKER_CONCURRENCY", &mut self.delivery.worker_concurrency);

        // Ingress defaults track the delivery-side settings
        self.scheduler.default_delay_between_ms = self.delivery.min_delay_between_emails_ms;
        self.scheduler.default_hourly_limit =
            self.delivery.rate_limit.max_emails_per_hour_per_sender;
    }

    /// Run this controller, and everything it controls.
    ///
    /// # Errors
    ///
    /// Returns an error (and a non-zero exit) when either backend cannot be
    /// opened, or when a component fails fatally at runtime.
    pub async fn run(mut self) -> anyhow::Result<()> {
        logging::init();
        self.apply_env();

        internal!("Controller running");

        // Backends are fatal at startup: a scheduler that cannot persist is
        // not allowed to accept campaigns.
        let store = self.store.into_store().await?;
        let queue = Arc::new(TaskQueue::new(self.queue.into_store()?));

        let mail_sender: Arc<dyn MailSender> = Arc::new(DevMailSender::new());
        let processor = Arc::new(DeliveryProcessor::new(
            self.delivery,
            store.clone(),
            queue.clone(),
            mail_sender,
        ));

        let recovered = processor.recover().await?;
        internal!(level = INFO, "Recovered {recovered} pending tasks");

        let scheduler = Arc::new(CampaignScheduler::new(
            store.clone(),
            queue.clone(),
            self.scheduler,
        ));
        let reporter = Arc::new(StatusReporter::new(store.clone(), queue.clone()));

        let api = ApiServer::new(
            self.api,
            AppState {
                scheduler,
                store,
                queue,
                reporter,
            },
        )
        .await?;

        let ret = tokio::select! {
            r = api.serve(SHUTDOWN_BROADCAST.subscribe()) => {
                r.map_err(Into::into)
            }
            r = Arc::clone(&processor).serve(SHUTDOWN_BROADCAST.subscribe()) => {
                r.map_err(Into::into)
            }
            r = shutdown() => {
                r
            }
        };

        internal!("Shutting down...");

        ret
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn full_config_parses_from_ron() {
        let config: Reach = ron::from_str(
            r#"Reach (
                api: (
                    listen_address: "127.0.0.1:4000",
                ),
                store: File((
                    path: "/tmp/reach-test/store",
                )),
                queue: Memory,
                delivery: (
                    worker_concurrency: 2,
                    rate_limit: (
                        max_emails_per_hour: 10,
                    ),
                ),
            )"#,
        )
        .unwrap();

        assert_eq!(config.api.listen_address, "127.0.0.1:4000");
        assert_eq!(config.delivery.worker_concurrency, 2);
        assert_eq!(config.delivery.rate_limit.max_emails_per_hour, 10);
        // Unspecified fields keep their defaults
        assert_eq!(config.delivery.rate_limit.max_emails_per_hour_per_sender, 50);
        assert_eq!(config.delivery.min_delay_between_emails_ms, 2000);
        assert!(config.queue.path().is_none());
    }

    #[test]
    fn defaults_match_the_documented_deployment() {
        let config = Reach::default();
        assert_eq!(config.delivery.worker_concurrency, 5);
        assert_eq!(config.delivery.min_delay_between_emails_ms, 2000);
        assert_eq!(config.delivery.rate_limit.max_emails_per_hour, 200);
        assert_eq!(config.delivery.rate_limit.max_emails_per_hour_per_sender, 50);
        assert_eq!(config.scheduler.clock_skew_secs, 60);
    }

    #[test]
    fn environment_overrides_take_precedence() {
        // SAFETY: test-local variables, no other test reads them
        unsafe {
            std::env::set_var("MAX_EMAILS_PER_HOUR", "42");
            std::env::set_var("WORKER_CONCURRENCY", "9");
            std::env::set_var("PORT", "8125");
        }

        let mut config = Reach::default();
        config.apply_env();

        assert_eq!(config.delivery.rate_limit.max_emails_per_hour, 42);
        assert_eq!(config.delivery.worker_concurrency, 9);
        assert_eq!(config.api.listen_address, "0.0.0.0:8125");
        // Ingress defaults follow the delivery settings
        assert_eq!(config.scheduler.default_hourly_limit, 50);
        assert_eq!(config.scheduler.default_delay_between_ms, 2000);

        unsafe {
            std::env::remove_var("MAX_EMAILS_PER_HOUR");
            std::env::remove_var("WORKER_CONCURRENCY");
            std::env::remove_var("PORT");
        }
    }
}
