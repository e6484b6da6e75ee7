//! RPC Module
//!
//! Exposes brokers and nodes across the network. Method names of the form
//! `Service.Method` are the wire contract; transport is JSON over HTTP.
//!
//! ## Submodules
//! - **`protocol`**: method names, argument and fault types.
//! - **`server`**: the `RpcService` registration seam and the serving loop.
//! - **`handlers`**: axum handlers behind `Broker.Produce` and `Node.Ping`.
//! - **`client`**: the `RpcClient` handle used by load balancers, monitors and peers.

pub mod client;
pub mod handlers;
pub mod protocol;
pub mod server;
