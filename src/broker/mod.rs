//! Broker Module
//!
//! The broker is the produce entrypoint of a node. It owns a `QueueManager`,
//! builds messages for local and remote produce calls, and tracks the clients
//! attached to it through a single registry loop.
//!
//! ## Submodules
//! - **`broker`**: produce paths, client registry loop, shutdown.
//! - **`client`**: produce/consume facade and the consumer worker handle.
//! - **`types`**: client ids and registry commands.

pub mod broker;
pub mod client;
pub mod types;

#[cfg(test)]
mod tests;
