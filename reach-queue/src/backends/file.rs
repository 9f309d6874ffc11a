use std::path::PathBuf;

use async_trait::async_trait;

use crate::{
    QUEUE_NAMESPACE, QueueError, SerializationError,
    backends::QueueStore,
    task::{Task, TaskId},
};

/// File-backed queue store
///
/// One bincode record per task, named by its task id, inside the
/// `reachinboxScheduler` namespace directory under the data root. Records are
/// written to a temp file and renamed into place, so a crash never leaves a
/// half-written task behind.
#[derive(Debug, Clone)]
pub struct FileQueueStore {
    dir: PathBuf,
}

impl FileQueueStore {
    /// Open (or create) a queue store rooted at `path`.
    ///
    /// # Errors
    /// If the namespace directory cannot be created.
    pub fn open(path: impl Into<PathBuf>) -> crate::Result<Self> {
        let dir = path.into().join(QUEUE_NAMESPACE);
        std::fs::create_dir_all(&dir)
            .map_err(|e| QueueError::Validation(format!("{}: {e}", dir.display())))?;

        Ok(Self { dir })
    }

    /// The namespace directory this store writes into
    #[must_use]
    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }

    fn record_path(&self, id: &TaskId) -> PathBuf {
        self.dir.join(format!("{id}.bin"))
    }
}

#[async_trait]
impl QueueStore for FileQueueStore {
    async fn put(&self, task: &Task) -> crate::Result<()> {
        let bytes = bincode::serde::encode_to_vec(task, bincode::config::standard())
            .map_err(SerializationError::from)?;

        let path = self.record_path(&task.id);
        let tmp = path.with_extension("bin.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        Ok(())
    }

    async fn list(&self) -> crate::Result<Vec<Task>> {
        let mut tasks = Vec::new();

        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let Some(filename) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };

            // Only well-formed task records; anything else in the directory
            // (temp files, foreign data) is skipped.
            if TaskId::from_filename(&filename).is_none() {
                continue;
            }

            let bytes = tokio::fs::read(entry.path()).await?;
            let (task, _): (Task, _) =
                bincode::serde::decode_from_slice(&bytes, bincode::config::standard()).map_err(
                    |e| {
                        QueueError::Serialization(SerializationError::Corrupted(format!(
                            "{filename}: {e}"
                        )))
                    },
                )?;
            tasks.push(task);
        }

        Ok(tasks)
    }

    async fn remove(&self, id: &TaskId) -> crate::Result<()> {
        match tokio::fs::remove_file(self.record_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use reach_store::{CampaignId, DispatchId};

    use super::*;
    use crate::task::TaskPayload;

    fn task() -> Task {
        Task::new(
            TaskPayload {
                dispatch_id: DispatchId::generate(),
                campaign_id: CampaignId::generate(),
                recipient_email: "a@x.io".to_string(),
                subject: "subject".to_string(),
                body: "body".to_string(),
                scheduled_at: Utc::now(),
                sender_id: None,
            },
            Utc::now() + chrono::Duration::seconds(30),
        )
    }

    #[tokio::test]
    async fn records_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileQueueStore::open(dir.path()).unwrap();

        let task = task();
        store.put(&task).await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, task.id);
        assert_eq!(listed[0].payload, task.payload);
        assert_eq!(listed[0].attempts, 0);

        store.remove(&task.id).await.unwrap();
        assert!(store.list().await.unwrap().is_empty());

        // Removing twice is fine
        store.remove(&task.id).await.unwrap();
    }

    #[tokio::test]
    async fn foreign_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileQueueStore::open(dir.path()).unwrap();

        std::fs::write(store.dir().join("notes.txt"), b"not a task").unwrap();
        std::fs::write(store.dir().join("broken.bin"), b"not a task").unwrap();

        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn namespace_directory_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileQueueStore::open(dir.path()).unwrap();
        assert!(store.dir().ends_with(QUEUE_NAMESPACE));
        assert!(store.dir().is_dir());
    }
}
