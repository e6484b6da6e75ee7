use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::oneshot;

/// Identifier of a client handle registered with a broker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub String);

impl ClientId {
    pub fn new() -> Self {
        Self(format!("client-{}", uuid::Uuid::new_v4()))
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Commands processed by the broker's registry loop.
#[derive(Debug)]
pub enum RegistryCommand {
    Register(ClientId),
    Unregister(ClientId),
    Snapshot(oneshot::Sender<Vec<ClientId>>),
}
