//! Node Module
//!
//! A node is the unit of cluster membership: one broker behind one RPC listener,
//! plus outbound handles to its peers. Closing the listener is how a node drops
//! out of the cluster; the heartbeat monitor notices the refused connections.

pub mod node;
