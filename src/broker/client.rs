use super::broker::Broker;
use super::types::ClientId;
use crate::error::Result;
use crate::queue::types::{Message, MessageId};

use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Producer/consumer handle bound to one broker.
pub struct Client {
    id: ClientId,
    broker: Arc<Broker>,
}

impl Client {
    /// Creates a client and registers it with the broker.
    pub fn new(broker: Arc<Broker>) -> Self {
        let id = ClientId::new();
        broker.register(id.clone());
        Self { id, broker }
    }

    pub fn id(&self) -> &ClientId {
        &self.id
    }

    pub async fn produce(&self, queue: &str, body: impl Into<Vec<u8>>) -> Result<MessageId> {
        self.broker.produce(queue, body.into()).await
    }

    /// Starts one background worker delivering messages from `queue` to `handler`.
    ///
    /// Each message is handed to the handler and its file is deleted once the
    /// handler returns. Several consumers on one queue compete; each message goes
    /// to exactly one of them. A panicking handler ends this worker only.
    pub async fn consume<F, Fut>(&self, queue: &str, handler: F) -> Result<ConsumerHandle>
    where
        F: Fn(Message) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let queue = self.broker.queue_manager.get_queue(queue).await?;
        let token = self.broker.shutdown_token().child_token();

        let worker_token = token.clone();
        let client_id = self.id.clone();

        let handle = tokio::spawn(async move {
            tracing::info!("Consumer {} attached to queue {}", client_id, queue.name());

            loop {
                let msg = tokio::select! {
                    biased;
                    _ = worker_token.cancelled() => break,
                    next = queue.next_message() => match next {
                        Some(msg) => msg,
                        None => break,
                    },
                };

                let id = msg.id.clone();
                tracing::debug!("Consumer {} handling message {}", client_id, id);

                handler(msg).await;
                queue.complete(&id).await;
            }

            tracing::info!("Consumer {} detached from queue {}", client_id, queue.name());
        });

        Ok(ConsumerHandle { token, handle })
    }

    /// Unregisters the client from its broker.
    pub fn close(self) {
        self.broker.unregister(self.id);
    }
}

/// Running consumer worker.
pub struct ConsumerHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ConsumerHandle {
    /// Asks the worker to stop. A message already being handled is finished first.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the worker to exit. Returns `false` if it ended by panicking.
    pub async fn join(self) -> bool {
        match self.handle.await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Consumer worker ended abnormally: {}", e);
                false
            }
        }
    }
}
