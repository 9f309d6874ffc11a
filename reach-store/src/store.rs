//! Storage trait for campaigns, dispatches, and sender accounts

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    Result,
    types::{Campaign, CampaignId, CampaignStatus, Dispatch, DispatchId, DispatchStatus,
        SenderAccount, User},
};

/// Backing storage for campaign scheduling state.
///
/// Implementations must enforce the unique `(campaign_id, recipient_email)`
/// index on dispatch insertion; everything else is plain row access. Workers
/// only ever update a dispatch whose task they reserved, so per-row
/// last-write-wins is sufficient.
#[async_trait]
pub trait Store: Send + Sync + std::fmt::Debug {
    /// Insert a new campaign row.
    ///
    /// # Errors
    /// If the row cannot be written.
    async fn insert_campaign(&self, campaign: &Campaign) -> Result<()>;

    /// Fetch a campaign by id.
    ///
    /// # Errors
    /// `StoreError::CampaignNotFound` if no such row exists.
    async fn campaign(&self, id: CampaignId) -> Result<Campaign>;

    /// Update a campaign's lifecycle state.
    ///
    /// # Errors
    /// `StoreError::CampaignNotFound` if no such row exists.
    async fn update_campaign_status(&self, id: CampaignId, status: CampaignStatus) -> Result<()>;

    /// List campaigns owned by a user, most recently created first.
    ///
    /// # Errors
    /// If the rows cannot be read.
    async fn campaigns_for_user(&self, user_id: Uuid) -> Result<Vec<Campaign>>;

    /// Delete a campaign and cascade to its dispatches. Not a hot path.
    ///
    /// # Errors
    /// `StoreError::CampaignNotFound` if no such row exists.
    async fn delete_campaign(&self, id: CampaignId) -> Result<()>;

    /// Insert a new dispatch row.
    ///
    /// # Errors
    /// `StoreError::DuplicateDispatch` when a row already exists for the
    /// same `(campaign, recipient)` pair.
    async fn insert_dispatch(&self, dispatch: &Dispatch) -> Result<()>;

    /// Fetch a dispatch by id.
    ///
    /// # Errors
    /// `StoreError::DispatchNotFound` if no such row exists.
    async fn dispatch(&self, id: DispatchId) -> Result<Dispatch>;

    /// Overwrite a dispatch row.
    ///
    /// # Errors
    /// `StoreError::DispatchNotFound` if no such row exists.
    async fn update_dispatch(&self, dispatch: &Dispatch) -> Result<()>;

    /// List the dispatches belonging to a campaign, in scheduled order.
    ///
    /// # Errors
    /// If the rows cannot be read.
    async fn dispatches_for_campaign(&self, id: CampaignId) -> Result<Vec<Dispatch>>;

    /// List a user's dispatches whose status matches any of `statuses`,
    /// in scheduled order.
    ///
    /// # Errors
    /// If the rows cannot be read.
    async fn dispatches_by_status(
        &self,
        user_id: Uuid,
        statuses: &[DispatchStatus],
    ) -> Result<Vec<Dispatch>>;

    /// List every dispatch currently in `status`, across all campaigns.
    /// Used by crash recovery to find rows resting in `Sending`.
    ///
    /// # Errors
    /// If the rows cannot be read.
    async fn dispatches_in_status(&self, status: DispatchStatus) -> Result<Vec<Dispatch>>;

    /// Count the non-terminal dispatches remaining in a campaign.
    ///
    /// # Errors
    /// If the rows cannot be read.
    async fn open_dispatch_count(&self, id: CampaignId) -> Result<usize>;

    /// Insert a sender account row.
    ///
    /// # Errors
    /// If the row cannot be written.
    async fn insert_sender_account(&self, account: &SenderAccount) -> Result<()>;

    /// Pick one active sender account, if any exist.
    ///
    /// # Errors
    /// If the rows cannot be read.
    async fn active_sender_account(&self) -> Result<Option<SenderAccount>>;

    /// Insert a user row.
    ///
    /// # Errors
    /// If the row cannot be written.
    async fn insert_user(&self, user: &User) -> Result<()>;

    /// Fetch a user row by id, if it exists.
    ///
    /// # Errors
    /// If the rows cannot be read.
    async fn user(&self, id: Uuid) -> Result<Option<User>>;

    /// Liveness probe; the `SELECT 1` of this store.
    ///
    /// # Errors
    /// If the backend is unreachable.
    async fn ping(&self) -> Result<()>;
}
