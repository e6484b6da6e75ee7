//! Per-node broker: owns the queues, turns produce requests into durable
//! messages, and keeps the registry of connected clients.

use super::types::{ClientId, RegistryCommand};
use crate::config::BrokerConfig;
use crate::error::Result;
use crate::queue::manager::QueueManager;
use crate::queue::queue::Queue;
use crate::queue::types::{Message, MessageId, MessageIdGenerator};
use crate::rpc::protocol::ProduceArgs;

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

pub struct Broker {
    pub queue_manager: Arc<QueueManager>,
    ids: MessageIdGenerator,
    registry_tx: mpsc::UnboundedSender<RegistryCommand>,
    shutdown: CancellationToken,
}

impl Broker {
    /// Creates the broker and spawns its registry loop.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: BrokerConfig) -> Arc<Self> {
        let (registry_tx, registry_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        tokio::spawn(registry_loop(registry_rx, shutdown.clone()));

        tracing::info!("Broker started with data dir {}", config.data_dir.display());

        Arc::new(Self {
            queue_manager: Arc::new(QueueManager::new(&config.data_dir, config.queue)),
            ids: MessageIdGenerator::new(),
            registry_tx,
            shutdown,
        })
    }

    pub async fn create_queue(&self, name: &str) -> Result<Arc<Queue>> {
        self.queue_manager.create_queue(name).await
    }

    /// Local produce path.
    ///
    /// Persists a new message and then offers it to the queue's buffer. Returns
    /// `QueueFull` when the buffer stayed full for the whole enqueue timeout; the
    /// message is durable in that case and will be delivered after a reload.
    pub async fn produce(&self, queue_name: &str, body: Vec<u8>) -> Result<MessageId> {
        let queue = self.queue_manager.get_queue(queue_name).await?;

        let msg = Message::new(self.ids.next_id(), body);
        let id = msg.id.clone();

        queue.persist(&msg).await?;
        queue.enqueue(msg).await?;

        tracing::debug!("Produced message {} to queue {}", id, queue_name);
        Ok(id)
    }

    /// Remote produce path behind `Broker.Produce`.
    ///
    /// Durability is the success criterion here, so a buffer timeout still replies `true`.
    pub async fn produce_remote(&self, args: ProduceArgs) -> Result<bool> {
        match self.produce(&args.queue, args.message).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_durable() => {
                tracing::warn!("Remote produce deferred: {}", e);
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    pub fn register(&self, id: ClientId) {
        self.send_registry(RegistryCommand::Register(id));
    }

    pub fn unregister(&self, id: ClientId) {
        self.send_registry(RegistryCommand::Unregister(id));
    }

    /// Clients currently registered, as seen by the registry loop.
    pub async fn registered_clients(&self) -> Vec<ClientId> {
        let (tx, rx) = oneshot::channel();
        self.send_registry(RegistryCommand::Snapshot(tx));
        rx.await.unwrap_or_default()
    }

    /// Token cancelled on [`Broker::shutdown`]; consumers hang child tokens off it.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Stops the registry loop and every consumer attached through this broker.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn send_registry(&self, cmd: RegistryCommand) {
        if self.registry_tx.send(cmd).is_err() {
            tracing::debug!("Broker registry loop is not running");
        }
    }
}

/// Single owner of the client set; every registration goes through here in order.
async fn registry_loop(
    mut commands: mpsc::UnboundedReceiver<RegistryCommand>,
    shutdown: CancellationToken,
) {
    let mut clients: HashSet<ClientId> = HashSet::new();

    loop {
        let cmd = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            cmd = commands.recv() => match cmd {
                Some(cmd) => cmd,
                None => break,
            },
        };

        match cmd {
            RegistryCommand::Register(id) => {
                tracing::info!("Client registered: {}", id);
                clients.insert(id);
            }
            RegistryCommand::Unregister(id) => {
                if clients.remove(&id) {
                    tracing::info!("Client unregistered: {}", id);
                }
            }
            RegistryCommand::Snapshot(reply) => {
                let mut snapshot: Vec<ClientId> = clients.iter().cloned().collect();
                snapshot.sort();
                let _ = reply.send(snapshot);
            }
        }
    }

    tracing::debug!("Broker registry loop stopped with {} client(s)", clients.len());
}
