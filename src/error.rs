//! Error types shared by every layer of the broker.

use crate::queue::types::MessageId;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors produced by queues, brokers, nodes and the cluster layer.
#[derive(Error, Debug)]
pub enum MqError {
    /// No queue was created under this name.
    #[error("queue not found: {0}")]
    QueueNotFound(String),

    /// The in-memory buffer stayed full for the whole enqueue timeout.
    /// The message is already on disk and will be picked up by a reload.
    #[error("queue {queue} is full, message {id} persisted to disk")]
    QueueFull { queue: String, id: MessageId },

    /// The name would not map to a single directory under the data dir.
    #[error("invalid queue name: {0:?}")]
    InvalidQueueName(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("rpc registration failed: {0}")]
    Registration(String),

    #[error("no nodes available")]
    NoNodesAvailable,

    /// Writing the message file failed, so the message is not durable.
    #[error("failed to persist message {id}: {source}")]
    Persist {
        id: MessageId,
        #[source]
        source: io::Error,
    },

    #[error("storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to connect to {addr}: {reason}")]
    Connect { addr: String, reason: String },

    #[error("rpc call {method} failed: {reason}")]
    Rpc { method: String, reason: String },

    #[error("rpc call {method} timed out after {timeout:?}")]
    Timeout { method: String, timeout: Duration },
}

impl MqError {
    /// True when the failed operation still left its message safely on disk.
    pub fn is_durable(&self) -> bool {
        matches!(self, MqError::QueueFull { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, MqError::QueueNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, MqError>;
