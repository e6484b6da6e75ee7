//! A single named, disk-backed queue with a bounded in-memory buffer.
//!
//! The directory on disk is the source of truth; the buffer is a cache of
//! messages ready for delivery. A message goes to disk first and only then
//! into the buffer, and it leaves the disk only after a consumer handled it.

use super::store::MessageStore;
use super::types::{Message, MessageId};
use crate::config::QueueConfig;
use crate::error::{MqError, Result};

use dashmap::DashSet;
use std::path::Path;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};

pub struct Queue {
    name: String,
    capacity: usize,
    enqueue_timeout: Duration,
    store: MessageStore,
    sender: mpsc::Sender<Message>,
    /// Shared by every consumer of this queue; whoever holds the lock gets the next message.
    receiver: Mutex<mpsc::Receiver<Message>>,
    /// Ids currently sitting in the buffer or being handled by a consumer.
    tracked: DashSet<MessageId>,
}

impl Queue {
    /// Builds an empty queue over `dir`. Nothing touches the disk until
    /// [`Queue::open`] or the first write.
    pub fn new(name: &str, dir: &Path, config: &QueueConfig) -> Self {
        let capacity = config.effective_capacity();
        let (sender, receiver) = mpsc::channel(capacity);

        Self {
            name: name.to_string(),
            capacity,
            enqueue_timeout: config.enqueue_timeout,
            store: MessageStore::new(dir),
            sender,
            receiver: Mutex::new(receiver),
            tracked: DashSet::new(),
        }
    }

    /// Creates the backing directory and loads whatever was persisted before.
    ///
    /// Never fails: problems are logged and leave the queue empty or partially loaded.
    pub async fn open(name: &str, dir: &Path, config: &QueueConfig) -> Self {
        let queue = Self::new(name, dir, config);

        if let Err(e) = queue.store.ensure_dir().await {
            tracing::error!("Error creating queue directory for {}: {}", name, e);
        }

        match queue.reload().await {
            Ok(0) => {}
            Ok(loaded) => tracing::info!("Queue {} recovered {} message(s) from disk", name, loaded),
            Err(e) => tracing::error!("Error loading messages for queue {}: {}", name, e),
        }

        queue
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn dir(&self) -> &Path {
        self.store.dir()
    }

    /// Number of messages waiting in the in-memory buffer.
    pub fn buffered(&self) -> usize {
        self.capacity - self.sender.capacity()
    }

    pub fn is_tracked(&self, id: &MessageId) -> bool {
        self.tracked.contains(id)
    }

    pub async fn persisted_ids(&self) -> Result<Vec<MessageId>> {
        self.store.ids().await
    }

    pub async fn is_persisted(&self, id: &MessageId) -> bool {
        self.store.exists(id).await
    }

    /// Writes the message to disk. Once this returns `Ok` the message is durable.
    pub async fn persist(&self, msg: &Message) -> Result<()> {
        self.store.save(msg).await
    }

    /// Hands a persisted message to the buffer, waiting up to the enqueue timeout.
    ///
    /// A message that is already buffered (a reload got there first) or whose file
    /// is gone is skipped. On timeout the message stays on disk but is no longer
    /// tracked, so the next [`Queue::reload`] will offer it again.
    pub async fn enqueue(&self, msg: Message) -> Result<()> {
        let id = msg.id.clone();
        if !self.claim(&id).await {
            tracing::debug!("Queue {}: message {} already buffered or completed", self.name, id);
            return Ok(());
        }

        match self.sender.send_timeout(msg, self.enqueue_timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) | Err(SendTimeoutError::Closed(_)) => {
                self.tracked.remove(&id);
                tracing::warn!(
                    "Queue {} buffer full after {:?}, message {} left on disk",
                    self.name,
                    self.enqueue_timeout,
                    id
                );
                Err(MqError::QueueFull {
                    queue: self.name.clone(),
                    id,
                })
            }
        }
    }

    /// Persist-then-buffer in one call.
    pub async fn push(&self, msg: Message) -> Result<()> {
        self.persist(&msg).await?;
        self.enqueue(msg).await
    }

    /// Waits for the next buffered message.
    pub async fn next_message(&self) -> Option<Message> {
        let mut receiver = self.receiver.lock().await;
        receiver.recv().await
    }

    /// Marks a delivered message as done: removes its file, then stops tracking it.
    ///
    /// A failed delete is logged only; the message was already delivered.
    pub async fn complete(&self, id: &MessageId) {
        let result = self
            .store
            .delete_then(id, || {
                self.tracked.remove(id);
            })
            .await;

        if let Err(e) = result {
            tracing::error!("Error deleting processed message {}: {}", id, e);
        }
    }

    /// Offers every untracked message on disk to the buffer without blocking.
    ///
    /// Stops at the first full buffer; the remaining files stay on disk for a
    /// later reload. Returns how many messages were enqueued.
    pub async fn reload(&self) -> Result<usize> {
        let messages = self.store.load_all().await?;

        let mut loaded = 0;
        for msg in messages {
            let id = msg.id.clone();
            if !self.claim(&id).await {
                continue;
            }

            match self.sender.try_send(msg) {
                Ok(()) => loaded += 1,
                Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
                    self.tracked.remove(&id);
                    tracing::warn!(
                        "Queue {} buffer full during load, remaining messages stay on disk",
                        self.name
                    );
                    break;
                }
            }
        }

        Ok(loaded)
    }

    /// Starts tracking `id` if its file is still on disk and nobody tracks it yet.
    /// Checked under the store lock so a concurrent `complete` cannot slip between
    /// the existence check and the insert.
    async fn claim(&self, id: &MessageId) -> bool {
        self.store
            .claim_if_present(id, || self.tracked.insert(id.clone()))
            .await
    }
}
