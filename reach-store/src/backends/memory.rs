use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    StoreError,
    store::Store,
    types::{Campaign, CampaignId, CampaignStatus, Dispatch, DispatchId, DispatchStatus,
        SenderAccount, User},
};

#[derive(Debug, Default)]
struct Inner {
    campaigns: HashMap<CampaignId, Campaign>,
    dispatches: HashMap<DispatchId, Dispatch>,
    /// Unique index backing the `(campaign, recipient)` invariant
    dispatch_keys: HashSet<(CampaignId, String)>,
    senders: HashMap<Uuid, SenderAccount>,
    users: HashMap<Uuid, User>,
}

/// In-memory store implementation
///
/// Rows live in `HashMap`s behind an `RwLock`. Primarily intended for tests,
/// but usable for transient single-process deployments where restart
/// recovery is not required.
///
/// # Concurrency
/// Uses an `RwLock` for interior mutability; critical sections never span an
/// await point. The unique dispatch index is checked and updated under the
/// same write lock as the row insert, so concurrent duplicate inserts cannot
/// both succeed.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of dispatch rows currently held
    ///
    /// Recovers gracefully if the lock is poisoned by accessing the
    /// underlying data.
    #[must_use]
    pub fn dispatch_count(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .dispatches
            .len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_campaign(&self, campaign: &Campaign) -> crate::Result<()> {
        self.inner
            .write()?
            .campaigns
            .insert(campaign.id, campaign.clone());
        Ok(())
    }

    async fn campaign(&self, id: CampaignId) -> crate::Result<Campaign> {
        self.inner
            .read()?
            .campaigns
            .get(&id)
            .cloned()
            .ok_or(StoreError::CampaignNotFound(id))
    }

    async fn update_campaign_status(
        &self,
        id: CampaignId,
        status: CampaignStatus,
    ) -> crate::Result<()> {
        let mut inner = self.inner.write()?;
        let campaign = inner
            .campaigns
            .get_mut(&id)
            .ok_or(StoreError::CampaignNotFound(id))?;
        campaign.status = status;
        campaign.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn campaigns_for_user(&self, user_id: Uuid) -> crate::Result<Vec<Campaign>> {
        let mut campaigns: Vec<_> = self
            .inner
            .read()?
            .campaigns
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        campaigns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(campaigns)
    }

    async fn delete_campaign(&self, id: CampaignId) -> crate::Result<()> {
        let mut inner = self.inner.write()?;
        inner
            .campaigns
            .remove(&id)
            .ok_or(StoreError::CampaignNotFound(id))?;

        inner.dispatches.retain(|_, d| d.campaign_id != id);
        inner.dispatch_keys.retain(|(campaign, _)| *campaign != id);
        Ok(())
    }

    async fn insert_dispatch(&self, dispatch: &Dispatch) -> crate::Result<()> {
        let mut inner = self.inner.write()?;
        let key = (dispatch.campaign_id, dispatch.recipient_email.clone());
        if !inner.dispatch_keys.insert(key) {
            return Err(StoreError::DuplicateDispatch {
                campaign_id: dispatch.campaign_id,
                recipient_email: dispatch.recipient_email.clone(),
            });
        }
        inner.dispatches.insert(dispatch.id, dispatch.clone());
        Ok(())
    }

    async fn dispatch(&self, id: DispatchId) -> crate::Result<Dispatch> {
        self.inner
            .read()?
            .dispatches
            .get(&id)
            .cloned()
            .ok_or(StoreError::DispatchNotFound(id))
    }

    async fn update_dispatch(&self, dispatch: &Dispatch) -> crate::Result<()> {
        let mut inner = self.inner.write()?;
        if !inner.dispatches.contains_key(&dispatch.id) {
            return Err(StoreError::DispatchNotFound(dispatch.id));
        }
        inner.dispatches.insert(dispatch.id, dispatch.clone());
        Ok(())
    }

    async fn dispatches_for_campaign(&self, id: CampaignId) -> crate::Result<Vec<Dispatch>> {
        let mut dispatches: Vec<_> = self
            .inner
            .read()?
            .dispatches
            .values()
            .filter(|d| d.campaign_id == id)
            .cloned()
            .collect();
        dispatches.sort_by(|a, b| a.scheduled_time.cmp(&b.scheduled_time));
        Ok(dispatches)
    }

    async fn dispatches_by_status(
        &self,
        user_id: Uuid,
        statuses: &[DispatchStatus],
    ) -> crate::Result<Vec<Dispatch>> {
        let inner = self.inner.read()?;
        let owned: HashSet<_> = inner
            .campaigns
            .values()
            .filter(|c| c.user_id == user_id)
            .map(|c| c.id)
            .collect();

        let mut dispatches: Vec<_> = inner
            .dispatches
            .values()
            .filter(|d| owned.contains(&d.campaign_id) && statuses.contains(&d.status))
            .cloned()
            .collect();
        drop(inner);

        dispatches.sort_by(|a, b| a.scheduled_time.cmp(&b.scheduled_time));
        Ok(dispatches)
    }

    async fn dispatches_in_status(&self, status: DispatchStatus) -> crate::Result<Vec<Dispatch>> {
        Ok(self
            .inner
            .read()?
            .dispatches
            .values()
            .filter(|d| d.status == status)
            .cloned()
            .collect())
    }

    async fn open_dispatch_count(&self, id: CampaignId) -> crate::Result<usize> {
        Ok(self
            .inner
            .read()?
            .dispatches
            .values()
            .filter(|d| d.campaign_id == id && !d.status.is_terminal())
            .count())
    }

    async fn insert_sender_account(&self, account: &SenderAccount) -> crate::Result<()> {
        self.inner
            .write()?
            .senders
            .insert(account.id, account.clone());
        Ok(())
    }

    async fn active_sender_account(&self) -> crate::Result<Option<SenderAccount>> {
        let inner = self.inner.read()?;
        let mut active: Vec<_> = inner.senders.values().filter(|a| a.is_active).collect();
        active.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(active.first().map(|a| (*a).clone()))
    }

    async fn insert_user(&self, user: &User) -> crate::Result<()> {
        self.inner.write()?.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn user(&self, id: Uuid) -> crate::Result<Option<User>> {
        Ok(self.inner.read()?.users.get(&id).cloned())
    }

    async fn ping(&self) -> crate::Result<()> {
        Ok(())
    }
}
