//! Outbound RPC handle to a node.

use super::protocol::*;
use crate::error::{MqError, Result};

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::net::TcpStream;

const DIAL_TIMEOUT: Duration = Duration::from_secs(2);

/// Cloneable handle for calling `Service.Method`s on one node.
///
/// Connections are pooled by the underlying HTTP client, so a handle may hold a
/// stale connection after its node went away; liveness checks should not rely on it.
#[derive(Debug, Clone)]
pub struct RpcClient {
    address: String,
    base_url: String,
    http: reqwest::Client,
}

impl RpcClient {
    /// Builds a handle without touching the network.
    pub fn new(address: &str) -> Result<Self> {
        let address = normalize_address(address);
        let http = reqwest::Client::builder()
            .no_proxy()
            .build()
            .map_err(|e| MqError::Connect {
                addr: address.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            base_url: format!("http://{}", address),
            address,
            http,
        })
    }

    /// Connects to `address` and returns a handle once the node accepts connections.
    pub async fn dial(address: &str) -> Result<Self> {
        let client = Self::new(address)?;

        match tokio::time::timeout(DIAL_TIMEOUT, TcpStream::connect(&client.address)).await {
            Ok(Ok(_stream)) => {
                tracing::debug!("Dialed {}", client.address);
                Ok(client)
            }
            Ok(Err(e)) => Err(MqError::Connect {
                addr: client.address,
                reason: e.to_string(),
            }),
            Err(_) => Err(MqError::Connect {
                addr: client.address,
                reason: format!("no answer within {:?}", DIAL_TIMEOUT),
            }),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Invokes `method` (e.g. `Broker.Produce`) with `args`.
    pub async fn call<A, R>(&self, method: &str, args: &A) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, method_path(method));

        let response = self
            .http
            .post(url)
            .json(args)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    MqError::Connect {
                        addr: self.address.clone(),
                        reason: e.to_string(),
                    }
                } else {
                    MqError::Rpc {
                        method: method.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return response.json::<R>().await.map_err(|e| MqError::Rpc {
                method: method.to_string(),
                reason: format!("invalid reply: {}", e),
            });
        }

        match response.json::<RpcFault>().await {
            Ok(fault) if fault.kind == FAULT_NOT_FOUND => Err(MqError::QueueNotFound(fault.message)),
            Ok(fault) => Err(MqError::Rpc {
                method: method.to_string(),
                reason: fault.message,
            }),
            Err(_) => Err(MqError::Rpc {
                method: method.to_string(),
                reason: format!("status {}", status),
            }),
        }
    }

    /// `Broker.Produce`: true once the message is durable on the remote node.
    pub async fn produce(&self, queue: &str, body: Vec<u8>) -> Result<bool> {
        self.call(BROKER_PRODUCE, &ProduceArgs::new(queue, body))
            .await
    }

    /// `Node.Ping`.
    pub async fn ping(&self) -> Result<bool> {
        self.call(NODE_PING, &PingArgs::default()).await
    }

    /// `Node.Ping` raced against a timer.
    pub async fn ping_within(&self, timeout: Duration) -> Result<bool> {
        tokio::select! {
            reply = self.ping() => reply,
            _ = tokio::time::sleep(timeout) => Err(MqError::Timeout {
                method: NODE_PING.to_string(),
                timeout,
            }),
        }
    }
}

/// Turns listen-style addresses into dialable ones: `:9101` and `0.0.0.0:9101`
/// become `127.0.0.1:9101`.
pub fn normalize_address(address: &str) -> String {
    if let Some(port) = address.strip_prefix(':') {
        return format!("127.0.0.1:{}", port);
    }
    if let Some(port) = address.strip_prefix("0.0.0.0:") {
        return format!("127.0.0.1:{}", port);
    }
    if let Some(port) = address.strip_prefix("[::]:") {
        return format!("[::1]:{}", port);
    }
    address.to_string()
}
