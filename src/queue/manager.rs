use super::queue::Queue;
use crate::config::QueueConfig;
use crate::error::{MqError, Result};

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Registry of the queues owned by one broker.
///
/// Every queue lives in its own subdirectory of `base_dir`.
pub struct QueueManager {
    queues: RwLock<HashMap<String, Arc<Queue>>>,
    base_dir: PathBuf,
    defaults: QueueConfig,
}

impl QueueManager {
    /// Does not touch the disk; the base directory appears with the first queue
    /// or an explicit [`QueueManager::ensure_base_dir`].
    pub fn new(base_dir: impl AsRef<Path>, defaults: QueueConfig) -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
            base_dir: base_dir.as_ref().to_path_buf(),
            defaults,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub async fn ensure_base_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|source| MqError::Storage {
                path: self.base_dir.clone(),
                source,
            })
    }

    /// Returns the queue called `name`, creating and loading it on first use.
    ///
    /// Only a name that is not a single plain path component is rejected; disk
    /// problems are logged and leave the queue empty.
    pub async fn create_queue(&self, name: &str) -> Result<Arc<Queue>> {
        let config = self.defaults.clone();
        self.create_queue_with(name, &config).await
    }

    /// Like [`QueueManager::create_queue`] with explicit sizing. The config is
    /// ignored when the queue already exists.
    pub async fn create_queue_with(&self, name: &str, config: &QueueConfig) -> Result<Arc<Queue>> {
        validate_queue_name(name)?;

        let mut queues = self.queues.write().await;

        if let Some(queue) = queues.get(name) {
            return Ok(queue.clone());
        }

        let dir = self.base_dir.join(name);
        let queue = Arc::new(Queue::open(name, &dir, config).await);
        queues.insert(name.to_string(), queue.clone());

        tracing::info!("Created queue {} at {}", name, dir.display());
        Ok(queue)
    }

    pub async fn get_queue(&self, name: &str) -> Result<Arc<Queue>> {
        self.queues
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| MqError::QueueNotFound(name.to_string()))
    }

    pub async fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

/// A queue name must be exactly one normal path component, so its directory
/// always lands directly under the base directory.
fn validate_queue_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();

    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == name && !name.contains(['/', '\\']) => {
            Ok(())
        }
        _ => Err(MqError::InvalidQueueName(name.to_string())),
    }
}
