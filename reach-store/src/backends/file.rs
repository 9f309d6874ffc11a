use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{
    SerializationError, StoreError, ValidationError,
    backends::MemoryStore,
    store::Store,
    types::{Campaign, CampaignId, CampaignStatus, Dispatch, DispatchId, DispatchStatus,
        SenderAccount, User},
};

const CAMPAIGNS_DIR: &str = "campaigns";
const DISPATCHES_DIR: &str = "dispatches";
const SENDERS_DIR: &str = "senders";
const USERS_DIR: &str = "users";

/// File-backed store implementation
///
/// One bincode record per row, grouped into per-entity directories beneath
/// the data root. The full data set is loaded into a [`MemoryStore`] cache at
/// open; reads are served from the cache and every mutation is written
/// through to disk before returning. Writes go to a temp file and are
/// renamed into place, so a crash never leaves a half-written record.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    cache: MemoryStore,
}

impl FileStore {
    /// Open (or create) a store rooted at `path` and load every record.
    ///
    /// # Errors
    /// If the directory layout cannot be created or an existing record fails
    /// to decode.
    pub async fn open(path: impl Into<PathBuf>) -> crate::Result<Self> {
        let root = path.into();

        for dir in [CAMPAIGNS_DIR, DISPATCHES_DIR, SENDERS_DIR, USERS_DIR] {
            std::fs::create_dir_all(root.join(dir)).map_err(|e| {
                ValidationError::PathUnavailable(format!("{}: {e}", root.display()))
            })?;
        }

        if !root.is_dir() {
            return Err(ValidationError::NotDirectory(root.display().to_string()).into());
        }

        let store = Self {
            root,
            cache: MemoryStore::new(),
        };
        store.load().await?;

        Ok(store)
    }

    async fn load(&self) -> crate::Result<()> {
        for campaign in read_dir::<Campaign>(&self.root.join(CAMPAIGNS_DIR))? {
            self.cache.insert_campaign(&campaign).await?;
        }
        for dispatch in read_dir::<Dispatch>(&self.root.join(DISPATCHES_DIR))? {
            self.cache.insert_dispatch(&dispatch).await?;
        }
        for account in read_dir::<SenderAccount>(&self.root.join(SENDERS_DIR))? {
            self.cache.insert_sender_account(&account).await?;
        }
        for user in read_dir::<User>(&self.root.join(USERS_DIR))? {
            self.cache.insert_user(&user).await?;
        }

        tracing::debug!(
            root = %self.root.display(),
            dispatches = self.cache.dispatch_count(),
            "Loaded store from disk"
        );

        Ok(())
    }

    async fn persist<T: Serialize + Sync>(
        &self,
        dir: &str,
        name: &str,
        value: &T,
    ) -> crate::Result<()> {
        let bytes = bincode::serde::encode_to_vec(value, bincode::config::standard())
            .map_err(SerializationError::from)?;

        let path = self.root.join(dir).join(format!("{name}.bin"));
        let tmp = path.with_extension("bin.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        Ok(())
    }

    async fn unlink(&self, dir: &str, name: &str) -> crate::Result<()> {
        let path = self.root.join(dir).join(format!("{name}.bin"));
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn read_dir<T: DeserializeOwned>(dir: &Path) -> crate::Result<Vec<T>> {
    let mut records = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_none_or(|ext| ext != "bin") {
            continue;
        }

        let bytes = std::fs::read(&path)?;
        let (record, _) = bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
            .map_err(|e| {
                StoreError::Serialization(SerializationError::Corrupted(format!(
                    "{}: {e}",
                    path.display()
                )))
            })?;
        records.push(record);
    }

    Ok(records)
}

#[async_trait]
impl Store for FileStore {
    async fn insert_campaign(&self, campaign: &Campaign) -> crate::Result<()> {
        self.cache.insert_campaign(campaign).await?;
        self.persist(CAMPAIGNS_DIR, &campaign.id.to_string(), campaign)
            .await
    }

    async fn campaign(&self, id: CampaignId) -> crate::Result<Campaign> {
        self.cache.campaign(id).await
    }

    async fn update_campaign_status(
        &self,
        id: CampaignId,
        status: CampaignStatus,
    ) -> crate::Result<()> {
        self.cache.update_campaign_status(id, status).await?;
        let campaign = self.cache.campaign(id).await?;
        self.persist(CAMPAIGNS_DIR, &id.to_string(), &campaign).await
    }

    async fn campaigns_for_user(&self, user_id: Uuid) -> crate::Result<Vec<Campaign>> {
        self.cache.campaigns_for_user(user_id).await
    }

    async fn delete_campaign(&self, id: CampaignId) -> crate::Result<()> {
        let dispatches = self.cache.dispatches_for_campaign(id).await?;
        self.cache.delete_campaign(id).await?;

        self.unlink(CAMPAIGNS_DIR, &id.to_string()).await?;
        for dispatch in dispatches {
            self.unlink(DISPATCHES_DIR, &dispatch.id.to_string()).await?;
        }

        Ok(())
    }

    async fn insert_dispatch(&self, dispatch: &Dispatch) -> crate::Result<()> {
        self.cache.insert_dispatch(dispatch).await?;
        self.persist(DISPATCHES_DIR, &dispatch.id.to_string(), dispatch)
            .await
    }

    async fn dispatch(&self, id: DispatchId) -> crate::Result<Dispatch> {
        self.cache.dispatch(id).await
    }

    async fn update_dispatch(&self, dispatch: &Dispatch) -> crate::Result<()> {
        self.cache.update_dispatch(dispatch).await?;
        self.persist(DISPATCHES_DIR, &dispatch.id.to_string(), dispatch)
            .await
    }

    async fn dispatches_for_campaign(&self, id: CampaignId) -> crate::Result<Vec<Dispatch>> {
        self.cache.dispatches_for_campaign(id).await
    }

    async fn dispatches_by_status(
        &self,
        user_id: Uuid,
        statuses: &[DispatchStatus],
    ) -> crate::Result<Vec<Dispatch>> {
        self.cache.dispatches_by_status(user_id, statuses).await
    }

    async fn dispatches_in_status(&self, status: DispatchStatus) -> crate::Result<Vec<Dispatch>> {
        self.cache.dispatches_in_status(status).await
    }

    async fn open_dispatch_count(&self, id: CampaignId) -> crate::Result<usize> {
        self.cache.open_dispatch_count(id).await
    }

    async fn insert_sender_account(&self, account: &SenderAccount) -> crate::Result<()> {
        self.cache.insert_sender_account(account).await?;
        self.persist(SENDERS_DIR, &account.id.to_string(), account)
            .await
    }

    async fn active_sender_account(&self) -> crate::Result<Option<SenderAccount>> {
        self.cache.active_sender_account().await
    }

    async fn insert_user(&self, user: &User) -> crate::Result<()> {
        self.cache.insert_user(user).await?;
        self.persist(USERS_DIR, &user.id.to_string(), user).await
    }

    async fn user(&self, id: Uuid) -> crate::Result<Option<User>> {
        self.cache.user(id).await
    }

    async fn ping(&self) -> crate::Result<()> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(ValidationError::PathUnavailable(self.root.display().to_string()).into())
        }
    }
}
