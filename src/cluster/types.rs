use crate::rpc::client::RpcClient;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Health of a monitored node.
///
/// `Healthy -> Unreachable -> removed`. There is no way back: a node that recovers
/// has to be added again.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MemberState {
    Healthy,
    Unreachable,
}

/// A node tracked by the heartbeat monitor. The address is probed directly,
/// independent of the cached RPC handle.
#[derive(Debug, Clone)]
pub struct MonitoredNode {
    pub id: NodeId,
    pub address: String,
    pub client: RpcClient,
    pub state: MemberState,
}
