//! Row types for campaigns, dispatches, and sender accounts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for a campaign
///
/// An opaque UUID, serialized in its hyphenated string form so the same
/// representation appears in API payloads, file names, and log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CampaignId(Uuid);

impl CampaignId {
    #[must_use]
    pub const fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Generate a new unique campaign id
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Parse from a hyphenated string form
    ///
    /// # Errors
    /// If the input is not a valid UUID
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl std::fmt::Display for CampaignId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl serde::Serialize for CampaignId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for CampaignId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let id = Uuid::parse_str(&s).map_err(serde::de::Error::custom)?;
        Ok(Self(id))
    }
}

/// Identifier for a dispatch (one email to one recipient)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DispatchId(Uuid);

impl DispatchId {
    #[must_use]
    pub const fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Generate a new unique dispatch id
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Parse from a hyphenated string form
    ///
    /// # Errors
    /// If the input is not a valid UUID
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl std::fmt::Display for DispatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl serde::Serialize for DispatchId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for DispatchId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let id = Uuid::parse_str(&s).map_err(serde::de::Error::custom)?;
        Ok(Self(id))
    }
}

/// Lifecycle state of a campaign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignStatus {
    Scheduled,
    InProgress,
    Completed,
    Paused,
    Cancelled,
}

impl CampaignStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "SCHEDULED",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Paused => "PAUSED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a single dispatch
///
/// `RateLimited` is a loop state: the dispatch returns to `Scheduled` with a
/// new scheduled instant once the worker has pushed it into the next hour
/// window. `Sent` and `Failed` are terminal for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatchStatus {
    Pending,
    Scheduled,
    Sending,
    Sent,
    Failed,
    RateLimited,
}

impl DispatchStatus {
    /// Whether the dispatch has reached a terminal state for this run
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Scheduled => "SCHEDULED",
            Self::Sending => "SENDING",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
            Self::RateLimited => "RATE_LIMITED",
        }
    }
}

impl std::fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bulk-send configuration: one subject and body aimed at many recipients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: CampaignId,
    pub user_id: Uuid,
    pub subject: String,
    pub body: String,
    /// Absolute instant the first dispatch becomes eligible
    pub start_time: DateTime<Utc>,
    /// Spacing between consecutive dispatches, in milliseconds
    pub delay_between_ms: u64,
    /// Per-sender hourly ceiling override, if the caller supplied one
    pub hourly_limit: Option<u32>,
    pub status: CampaignStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Create a new campaign row in the `Scheduled` state
    #[must_use]
    pub fn new(
        user_id: Uuid,
        subject: String,
        body: String,
        start_time: DateTime<Utc>,
        delay_between_ms: u64,
        hourly_limit: Option<u32>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: CampaignId::generate(),
            user_id,
            subject,
            body,
            start_time,
            delay_between_ms,
            hourly_limit,
            status: CampaignStatus::Scheduled,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The record of one email to one recipient within one campaign
///
/// Subject and body are denormalized snapshots taken at schedule time, so an
/// in-flight dispatch is immune to later campaign edits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dispatch {
    pub id: DispatchId,
    pub campaign_id: CampaignId,
    pub recipient_email: String,
    pub subject: String,
    pub body: String,
    pub scheduled_time: DateTime<Utc>,
    pub sent_time: Option<DateTime<Utc>>,
    pub status: DispatchStatus,
    pub error_message: Option<String>,
    /// Transport message id recorded on successful acceptance
    pub sender_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Dispatch {
    /// Create a new dispatch row in the `Scheduled` state
    #[must_use]
    pub fn new(
        campaign_id: CampaignId,
        recipient_email: String,
        subject: String,
        body: String,
        scheduled_time: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: DispatchId::generate(),
            campaign_id,
            recipient_email,
            subject,
            body,
            scheduled_time,
            sent_time: None,
            status: DispatchStatus::Scheduled,
            error_message: None,
            sender_email: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move the dispatch into a new state, refreshing `updated_at`
    pub fn transition(&mut self, status: DispatchStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

/// An SMTP account available for outbound sends
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderAccount {
    pub id: Uuid,
    pub email: String,
    pub password: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub is_active: bool,
}

/// An account owning campaigns
///
/// Session establishment is handled upstream; the row exists so campaigns
/// have a stable owner reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub google_id: String,
    pub email: String,
    pub name: String,
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
