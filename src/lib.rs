//! Distributed Message Queue Library
//!
//! This library crate defines the core modules of a durable, per-node message broker.
//! It serves as the foundation for the binary executable (`main.rs`).
//!
//! ## Architecture Modules
//! - **`queue`**: Named FIFO queues backed by one JSON file per message. A message is on
//!   disk before it is buffered and stays there until a consumer finishes with it.
//! - **`broker`**: Owns the queues of one node, accepts produce calls and runs consumer
//!   workers on behalf of clients.
//! - **`rpc`**: `Service.Method` calls over HTTP (axum server, reqwest client).
//! - **`node`**: A broker behind an RPC listener, answering `Broker.Produce` and `Node.Ping`.
//! - **`cluster`**: Client-side round-robin routing across nodes and heartbeat-based
//!   eviction of dead ones.
//! - **`config`** / **`error`**: Tunables with defaults and the crate-wide error type.

pub mod broker;
pub mod cluster;
pub mod config;
pub mod error;
pub mod node;
pub mod queue;
pub mod rpc;
