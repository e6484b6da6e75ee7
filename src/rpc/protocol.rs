//! RPC Protocol Definitions
//!
//! Method names (`Service.Method`) are the wire contract. Each method is served at
//! `POST /rpc/<Service>.<Method>` with a JSON body; a successful call answers with the
//! JSON reply value, a failed one with an error status and an [`RpcFault`].

use crate::queue::types::base64_bytes;
use serde::{Deserialize, Serialize};

pub const RPC_PREFIX: &str = "/rpc";

pub const SERVICE_BROKER: &str = "Broker";
pub const SERVICE_NODE: &str = "Node";

pub const METHOD_PRODUCE: &str = "Produce";
pub const METHOD_PING: &str = "Ping";

pub const BROKER_PRODUCE: &str = "Broker.Produce";
pub const NODE_PING: &str = "Node.Ping";

pub const FAULT_NOT_FOUND: &str = "not_found";
pub const FAULT_INTERNAL: &str = "internal";

/// HTTP path serving a fully qualified method such as `Broker.Produce`.
pub fn method_path(method: &str) -> String {
    format!("{}/{}", RPC_PREFIX, method)
}

pub fn qualified(service: &str, method: &str) -> String {
    format!("{}.{}", service, method)
}

/// Arguments of `Broker.Produce`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProduceArgs {
    #[serde(rename = "Queue")]
    pub queue: String,
    #[serde(rename = "Message", with = "base64_bytes", default)]
    pub message: Vec<u8>,
}

impl ProduceArgs {
    pub fn new(queue: &str, message: Vec<u8>) -> Self {
        Self {
            queue: queue.to_string(),
            message,
        }
    }
}

/// Arguments of `Node.Ping`; carries nothing.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PingArgs {}

/// Error body returned by a failed call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RpcFault {
    pub kind: String,
    pub message: String,
}
