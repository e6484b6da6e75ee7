//! Client-side round-robin router for produce calls.

use super::types::NodeId;
use crate::error::{MqError, Result};
use crate::rpc::client::RpcClient;

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct LoadBalancer {
    nodes: DashMap<NodeId, RpcClient>,
    counter: AtomicU64,
}

impl LoadBalancer {
    pub fn new() -> Self {
        Self {
            nodes: DashMap::new(),
            counter: AtomicU64::new(0),
        }
    }

    /// Adds or replaces the handle for `id`.
    pub fn add_node(&self, id: impl Into<NodeId>, client: RpcClient) {
        let id = id.into();
        tracing::info!("Load balancer added node {} ({})", id, client.address());
        self.nodes.insert(id, client);
    }

    pub fn remove_node(&self, id: &NodeId) {
        if self.nodes.remove(id).is_some() {
            tracing::info!("Load balancer removed node {}", id);
        }
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Current members in sorted order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Picks the next node in sorted-id rotation.
    ///
    /// The id snapshot and the counter are read separately, so a membership change
    /// racing this call may skip or repeat one node for that call.
    pub fn get_next_node(&self) -> Result<(NodeId, RpcClient)> {
        loop {
            let ids = self.node_ids();
            if ids.is_empty() {
                return Err(MqError::NoNodesAvailable);
            }

            let ticket = self.counter.fetch_add(1, Ordering::Relaxed);
            let selected = select_round_robin(&ids, ticket);

            // The node may have left between the snapshot and this lookup
            if let Some(client) = self.nodes.get(selected) {
                return Ok((selected.clone(), client.value().clone()));
            }
        }
    }

    /// Routes one produce call to the next node.
    pub async fn send_message(&self, queue: &str, body: impl Into<Vec<u8>>) -> Result<bool> {
        let (id, client) = self.get_next_node()?;
        tracing::info!("Load balancer selected node: {}", id);

        client.produce(queue, body.into()).await
    }
}

impl Default for LoadBalancer {
    fn default() -> Self {
        Self::new()
    }
}

/// `ids[ticket % len]` over a sorted, non-empty slice.
pub fn select_round_robin(ids: &[NodeId], ticket: u64) -> &NodeId {
    &ids[(ticket % ids.len() as u64) as usize]
}
