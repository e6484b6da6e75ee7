use crate::broker::broker::Broker;
use crate::cluster::types::NodeId;
use crate::config::BrokerConfig;
use crate::error::{MqError, Result};
use crate::rpc::client::{RpcClient, normalize_address};
use crate::rpc::handlers::handle_ping;
use crate::rpc::protocol::{METHOD_PING, ProduceArgs, SERVICE_NODE};
use crate::rpc::server::{RpcServer, RpcService};

use axum::routing::{MethodRouter, post};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// A network-addressable process hosting one broker behind an RPC listener.
///
/// Serves `Broker.Produce` and `Node.Ping`.
pub struct Node {
    pub id: NodeId,
    pub broker: Arc<Broker>,
    address: SocketAddr,
    peers: DashMap<NodeId, RpcClient>,
    listener_token: CancellationToken,
    server_task: Mutex<Option<JoinHandle<()>>>,
}

impl RpcService for Node {
    const NAME: &'static str = SERVICE_NODE;

    fn methods(self: Arc<Self>) -> Vec<(&'static str, MethodRouter)> {
        vec![(METHOD_PING, post(handle_ping))]
    }
}

impl Node {
    /// Starts a node listening on `addr` with its queues under `<data_dir>/<id>`.
    pub async fn new(id: impl Into<NodeId>, addr: &str, data_dir: impl AsRef<Path>) -> Result<Arc<Self>> {
        let id = id.into();
        let config = BrokerConfig::new(data_dir.as_ref().join(&id.0));
        Self::with_config(id, addr, config).await
    }

    /// Starts a node with an explicit broker configuration.
    ///
    /// Fails with `Bind` if the address is unavailable and `Registration` if a
    /// service cannot be mounted.
    pub async fn with_config(id: impl Into<NodeId>, addr: &str, config: BrokerConfig) -> Result<Arc<Self>> {
        let id = id.into();
        let broker = Broker::new(config);
        if let Err(e) = broker.queue_manager.ensure_base_dir().await {
            tracing::error!("Node {} cannot prepare its data directory: {}", id, e);
        }

        let mut server = RpcServer::new();
        if let Err(e) = server.register(broker.clone()) {
            broker.shutdown();
            return Err(e);
        }

        let bind_addr = listen_address(addr);
        let listener = match TcpListener::bind(&bind_addr).await {
            Ok(listener) => listener,
            Err(source) => {
                broker.shutdown();
                return Err(MqError::Bind {
                    addr: bind_addr,
                    source,
                });
            }
        };
        let address = listener.local_addr().map_err(|source| MqError::Bind {
            addr: bind_addr.clone(),
            source,
        })?;

        let node = Arc::new(Self {
            id,
            broker,
            address,
            peers: DashMap::new(),
            listener_token: CancellationToken::new(),
            server_task: Mutex::new(None),
        });

        if let Err(e) = server.register(node.clone()) {
            drop(listener);
            node.broker.shutdown();
            return Err(e);
        }

        let task = tokio::spawn(server.serve(listener, node.listener_token.clone()));
        *node.server_task.lock().await = Some(task);

        tracing::info!("Node {} listening on {}", node.id, node.address);
        Ok(node)
    }

    /// Address the listener is bound to.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Address peers should dial to reach this node.
    pub fn dial_address(&self) -> String {
        normalize_address(&self.address.to_string())
    }

    /// Local liveness answer; true until the listener is closed.
    pub fn ping(&self) -> bool {
        !self.listener_token.is_cancelled()
    }

    pub fn is_serving(&self) -> bool {
        self.ping()
    }

    /// Opens an RPC handle to another node and keeps it for later use.
    pub async fn connect_to_peer(&self, id: impl Into<NodeId>, addr: &str) -> Result<()> {
        let id = id.into();
        let client = RpcClient::dial(addr).await?;

        tracing::info!("Node {} connected to peer {} at {}", self.id, id, client.address());
        self.peers.insert(id, client);
        Ok(())
    }

    pub fn peer(&self, id: &NodeId) -> Option<RpcClient> {
        self.peers.get(id).map(|entry| entry.value().clone())
    }

    pub fn peer_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.peers.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Produces through this node's broker with the same outcome as a remote
    /// `Broker.Produce` call.
    pub async fn send_message(&self, queue: &str, body: impl Into<Vec<u8>>) -> Result<bool> {
        self.broker
            .produce_remote(ProduceArgs::new(queue, body.into()))
            .await
    }

    /// Stops accepting connections. The broker keeps running, so local consumers
    /// still drain their queues.
    pub fn close_listener(&self) {
        if !self.listener_token.is_cancelled() {
            tracing::info!("Node {} closing listener on {}", self.id, self.address);
            self.listener_token.cancel();
        }
    }

    /// Closes the listener, stops the broker's background work and waits briefly
    /// for open connections to finish.
    pub async fn shutdown(&self) {
        self.close_listener();
        self.broker.shutdown();

        if let Some(task) = self.server_task.lock().await.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
                tracing::warn!("Node {} listener did not drain within {:?}", self.id, SHUTDOWN_GRACE);
            }
        }

        tracing::info!("Node {} shut down", self.id);
    }
}

/// `:9101` listens on every interface, like the Go-style shorthand.
fn listen_address(addr: &str) -> String {
    match addr.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{}", port),
        None => addr.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_address_shorthand() {
        assert_eq!(listen_address(":9101"), "0.0.0.0:9101");
        assert_eq!(listen_address("127.0.0.1:0"), "127.0.0.1:0");
    }
}
