//! Cluster Module
//!
//! Client-side view of the cluster: which nodes receive produce traffic and which
//! of them are still alive.
//!
//! ## Core Mechanisms
//! - **Round-robin routing**: node ids are sorted and a shared counter picks the next one,
//!   giving every caller the same rotation for a fixed membership.
//! - **Failure detection**: a heartbeat monitor probes each node's address on a fixed
//!   interval and evicts nodes that stop answering. Eviction is final until the node is
//!   added again.

pub mod heartbeat;
pub mod load_balancer;
pub mod types;
