//! Heartbeat-based failure detection.
//!
//! Every tick the monitor probes each tracked node. A node whose probe fails is
//! marked `Unreachable`, removed from the load balancer and then dropped from the
//! monitor itself; the check hands the dropped entries back to the caller. The two removals take separate locks, so for a moment the two
//! views may disagree; both settle within the same tick.

use super::load_balancer::LoadBalancer;
use super::types::{MemberState, MonitoredNode, NodeId};
use crate::config::{HeartbeatConfig, ProbeMode};
use crate::rpc::client::{RpcClient, normalize_address};

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub struct HeartbeatMonitor {
    nodes: DashMap<NodeId, MonitoredNode>,
    load_balancer: Arc<LoadBalancer>,
    config: HeartbeatConfig,
    stop: CancellationToken,
}

impl HeartbeatMonitor {
    pub fn new(load_balancer: Arc<LoadBalancer>, config: HeartbeatConfig) -> Arc<Self> {
        Arc::new(Self {
            nodes: DashMap::new(),
            load_balancer,
            config,
            stop: CancellationToken::new(),
        })
    }

    /// Starts tracking a node reachable at `address`.
    pub fn add_node(&self, id: impl Into<NodeId>, address: &str, client: RpcClient) {
        let id = id.into();
        let address = normalize_address(address);
        tracing::info!("HeartbeatMonitor tracking {} at {}", id, address);

        self.nodes.insert(
            id.clone(),
            MonitoredNode {
                id,
                address,
                client,
                state: MemberState::Healthy,
            },
        );
    }

    pub fn remove_node(&self, id: &NodeId) {
        self.nodes.remove(id);
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn state_of(&self, id: &NodeId) -> Option<MemberState> {
        self.nodes.get(id).map(|entry| entry.state)
    }

    pub fn config(&self) -> &HeartbeatConfig {
        &self.config
    }

    /// Spawns the ticking loop.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Ticks every interval until [`HeartbeatMonitor::stop`] is called. The first
    /// check happens one interval after the call.
    pub async fn run(&self) {
        tracing::info!("HeartbeatMonitor started (interval {:?})", self.config.interval);

        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.config.interval, self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                _ = ticker.tick() => {
                    self.check_nodes().await;
                }
            }
        }

        tracing::info!("HeartbeatMonitor stopped");
    }

    /// Stops the ticking loop; no check starts after this returns.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Probes every tracked node once and evicts the ones that fail.
    ///
    /// Probes run concurrently. Returns the evicted nodes, sorted by id, in their
    /// final `Unreachable` state; re-adding one is up to the caller.
    pub async fn check_nodes(&self) -> Vec<MonitoredNode> {
        let targets: Vec<MonitoredNode> = self
            .nodes
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut probes = JoinSet::new();
        for node in targets {
            let mode = self.config.probe;
            let timeout = self.config.probe_deadline();
            probes.spawn(async move {
                let alive = probe(&node, mode, timeout).await;
                (node, alive)
            });
        }

        let mut evicted = Vec::new();
        while let Some(result) = probes.join_next().await {
            let (node, alive) = match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!("HeartbeatMonitor probe task failed: {}", e);
                    continue;
                }
            };

            tracing::debug!(
                "HeartbeatMonitor: check for {} ({}): {}",
                node.id,
                node.address,
                alive
            );

            if !alive {
                if let Some(down) = self.evict(&node.id) {
                    evicted.push(down);
                }
            }
        }

        evicted.sort_by(|a, b| a.id.cmp(&b.id));
        evicted
    }

    /// `None` when the node was removed by someone else in the meantime.
    fn evict(&self, id: &NodeId) -> Option<MonitoredNode> {
        if let Some(mut entry) = self.nodes.get_mut(id) {
            entry.state = MemberState::Unreachable;
        }
        tracing::warn!("HeartbeatMonitor: node {} is DOWN, removing from load balancer", id);

        self.load_balancer.remove_node(id);
        self.nodes.remove(id).map(|(_, node)| node)
    }
}

async fn probe(node: &MonitoredNode, mode: ProbeMode, timeout: Duration) -> bool {
    match mode {
        ProbeMode::TcpConnect => tcp_probe(&node.address, timeout).await,
        ProbeMode::RpcPing => matches!(node.client.ping_within(timeout).await, Ok(true)),
    }
}

/// Fresh connection attempt, so a stale pooled connection cannot hide a dead node.
pub async fn tcp_probe(address: &str, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect(address)).await,
        Ok(Ok(_))
    )
}
