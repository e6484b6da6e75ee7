//! On-disk message store.
//!
//! Each queue owns one directory holding one `<id>.json` file per message.
//! A file's presence means the message is durable; its removal means a consumer
//! finished with it. Writes go through a `.json.tmp` file and a rename so a crash
//! mid-write never leaves a truncated `.json` behind.

use super::types::{Message, MessageId};
use crate::error::{MqError, Result};

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

const MESSAGE_EXT: &str = "json";
const TMP_SUFFIX: &str = ".json.tmp";

pub struct MessageStore {
    dir: PathBuf,
    /// Serialises file writes and deletes within this queue.
    lock: Mutex<()>,
}

impl MessageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: &MessageId) -> PathBuf {
        self.dir.join(format!("{}.{}", id.0, MESSAGE_EXT))
    }

    /// Creates the backing directory if it does not exist yet.
    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| MqError::Storage {
                path: self.dir.clone(),
                source,
            })
    }

    /// Writes the message file. Returns only once the file is in place.
    pub async fn save(&self, msg: &Message) -> Result<()> {
        let data = serde_json::to_vec(msg)?;
        let path = self.path_for(&msg.id);
        let tmp = self.dir.join(format!("{}{}", msg.id.0, TMP_SUFFIX));

        let _guard = self.lock.lock().await;

        let persist_err = |source| MqError::Persist {
            id: msg.id.clone(),
            source,
        };
        tokio::fs::write(&tmp, &data).await.map_err(persist_err)?;
        tokio::fs::rename(&tmp, &path).await.map_err(persist_err)?;

        tracing::debug!("Persisted message {} to {}", msg.id, path.display());
        Ok(())
    }

    /// Removes the message file. Fails if the file is already gone.
    pub async fn delete(&self, id: &MessageId) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.remove_file(id).await
    }

    /// Removes the message file and runs `after` before the store lock is released,
    /// whether or not the delete succeeded.
    pub async fn delete_then<F>(&self, id: &MessageId, after: F) -> Result<()>
    where
        F: FnOnce(),
    {
        let _guard = self.lock.lock().await;
        let result = self.remove_file(id).await;
        after();
        result
    }

    /// Runs `claim` under the store lock if the message file exists.
    ///
    /// Returns `false` when the file is gone or `claim` declined. Deletes cannot
    /// interleave with the check, so a successful claim always refers to a file
    /// that is still on disk.
    pub async fn claim_if_present<F>(&self, id: &MessageId, claim: F) -> bool
    where
        F: FnOnce() -> bool,
    {
        let _guard = self.lock.lock().await;
        self.exists(id).await && claim()
    }

    pub async fn exists(&self, id: &MessageId) -> bool {
        tokio::fs::try_exists(self.path_for(id))
            .await
            .unwrap_or(false)
    }

    /// Ids of every message file currently on disk, in file-name order.
    pub async fn ids(&self) -> Result<Vec<MessageId>> {
        let mut ids: Vec<MessageId> = self
            .message_files()
            .await?
            .iter()
            .filter_map(|path| path.file_stem())
            .map(|stem| MessageId(stem.to_string_lossy().into_owned()))
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Reads every message on disk in file-name order.
    ///
    /// Files that cannot be read or parsed are skipped with a warning; they stay
    /// on disk untouched.
    pub async fn load_all(&self) -> Result<Vec<Message>> {
        let _guard = self.lock.lock().await;

        let mut files = self.message_files().await?;
        files.sort();

        let mut messages = Vec::with_capacity(files.len());
        for path in files {
            let data = match tokio::fs::read(&path).await {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!("Skipping unreadable message file {}: {}", path.display(), e);
                    continue;
                }
            };

            match serde_json::from_slice::<Message>(&data) {
                Ok(msg) => messages.push(msg),
                Err(e) => {
                    tracing::warn!("Skipping malformed message file {}: {}", path.display(), e);
                }
            }
        }

        Ok(messages)
    }

    async fn remove_file(&self, id: &MessageId) -> Result<()> {
        let path = self.path_for(id);
        tokio::fs::remove_file(&path)
            .await
            .map_err(|source| MqError::Storage { path, source })
    }

    async fn message_files(&self) -> Result<Vec<PathBuf>> {
        let storage_err = |source| MqError::Storage {
            path: self.dir.clone(),
            source,
        };

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage_err(e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(storage_err)? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == MESSAGE_EXT) {
                files.push(path);
            }
        }

        Ok(files)
    }
}
