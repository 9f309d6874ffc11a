//! The outbound transport capability
//!
//! The SMTP conversation itself is an injected collaborator: workers only
//! ever see the [`MailSender`] trait. The dev implementation accepts
//! everything and fabricates message ids with preview links, which is what
//! local and staging deployments run against; tests script failures through
//! [`MockMailSender`].

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Notify;

/// One email handed to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Envelope sender, when an active sender account is configured
    pub from: Option<String>,
}

/// What the transport reports back on acceptance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    /// Transport-assigned message id
    pub message_id: String,
    /// Out-of-band link to inspect the accepted message, when the transport
    /// offers one
    pub preview_url: Option<String>,
}

/// Errors surfaced by the transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// Failed to reach the SMTP server.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The server rejected the message.
    #[error("Message rejected: {0}")]
    Rejected(String),

    /// The conversation timed out.
    #[error("Transport timed out: {0}")]
    Timeout(String),
}

/// Capability for handing one email to the outbound transport.
#[async_trait]
pub trait MailSender: Send + Sync + std::fmt::Debug {
    /// Hand one email to the transport.
    ///
    /// # Errors
    /// If the transport refuses or cannot be reached.
    async fn send(&self, email: &OutgoingEmail) -> Result<SendReceipt, TransportError>;
}

/// Development transport: accepts everything, delivers nothing
///
/// Fabricates sequential message ids and preview links so the rest of the
/// pipeline behaves exactly as it would against a test SMTP service.
#[derive(Debug, Default)]
pub struct DevMailSender {
    accepted: parking_lot::Mutex<Vec<OutgoingEmail>>,
    sequence: AtomicU64,
}

impl DevMailSender {
    /// Create a new dev transport
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Emails accepted so far
    #[must_use]
    pub fn accepted(&self) -> Vec<OutgoingEmail> {
        self.accepted.lock().clone()
    }

    /// Number of emails accepted so far
    #[must_use]
    pub fn count(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MailSender for DevMailSender {
    async fn send(&self, email: &OutgoingEmail) -> Result<SendReceipt, TransportError> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        self.accepted.lock().push(email.clone());

        tracing::info!(to = %email.to, sequence, "Dev transport accepted message");

        Ok(SendReceipt {
            message_id: format!("<{sequence}.dev@reach.local>"),
            preview_url: Some(format!("http://localhost:1080/message/{sequence}")),
        })
    }
}

/// Scriptable transport for tests
///
/// Calls are counted from 1; any call number registered through
/// [`Self::fail_on_call`] returns a transport error instead of a receipt.
/// `wait_for_count` lets tests block until the worker pool has pushed a
/// given number of sends through.
#[derive(Debug, Default)]
pub struct MockMailSender {
    accepted: parking_lot::Mutex<Vec<OutgoingEmail>>,
    failures: parking_lot::Mutex<Vec<u64>>,
    calls: AtomicU64,
    notify: Arc<Notify>,
}

impl MockMailSender {
    /// Create a transport that accepts every send
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the numbered call (1-indexed) fail with a connection error
    pub fn fail_on_call(&self, call: u64) {
        self.failures.lock().push(call);
    }

    /// Total send calls made, including failed ones
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Emails the transport accepted
    #[must_use]
    pub fn accepted(&self) -> Vec<OutgoingEmail> {
        self.accepted.lock().clone()
    }

    /// Wait until at least `expected` send calls have been made.
    ///
    /// # Errors
    /// Returns an error if the timeout elapses first.
    pub async fn wait_for_calls(
        &self,
        expected: u64,
        timeout: std::time::Duration,
    ) -> Result<(), tokio::time::error::Elapsed> {
        tokio::time::timeout(timeout, async {
            loop {
                if self.calls() >= expected {
                    return;
                }
                self.notify.notified().await;
            }
        })
        .await
    }
}

#[async_trait]
impl MailSender for MockMailSender {
    async fn send(&self, email: &OutgoingEmail) -> Result<SendReceipt, TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        let result = if self.failures.lock().contains(&call) {
            Err(TransportError::ConnectionFailed(format!(
                "scripted failure on call {call}"
            )))
        } else {
            self.accepted.lock().push(email.clone());
            Ok(SendReceipt {
                message_id: format!("<{call}.mock@reach.test>"),
                preview_url: None,
            })
        };

        self.notify.notify_waiters();
        result
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dev_sender_fabricates_receipts() {
        let sender = DevMailSender::new();
        let email = OutgoingEmail {
            to: "a@x.io".to_string(),
            subject: "subject".to_string(),
            body: "body".to_string(),
            from: None,
        };

        let first = sender.send(&email).await.unwrap();
        let second = sender.send(&email).await.unwrap();

        assert_eq!(first.message_id, "<1.dev@reach.local>");
        assert_eq!(second.message_id, "<2.dev@reach.local>");
        assert!(first.preview_url.is_some());
        assert_eq!(sender.count(), 2);
        assert_eq!(sender.accepted().len(), 2);
    }

    #[tokio::test]
    async fn mock_sender_scripts_failures() {
        let sender = MockMailSender::new();
        sender.fail_on_call(2);

        let email = OutgoingEmail {
            to: "a@x.io".to_string(),
            subject: "subject".to_string(),
            body: "body".to_string(),
            from: None,
        };

        assert!(sender.send(&email).await.is_ok());
        assert!(sender.send(&email).await.is_err());
        assert!(sender.send(&email).await.is_ok());

        assert_eq!(sender.calls(), 3);
        assert_eq!(sender.accepted().len(), 2);
    }
}
