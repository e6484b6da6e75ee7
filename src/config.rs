//! Runtime configuration for queues, brokers and the heartbeat monitor.
//!
//! The library never reads the environment; callers build these structs
//! (the node binary maps its command-line flags onto them).

use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;
pub const DEFAULT_ENQUEUE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(300);
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_millis(500);

/// Sizing of a queue's in-memory buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueConfig {
    /// Maximum number of messages held in memory.
    pub capacity: usize,
    /// How long a producer waits for buffer space before giving up.
    pub enqueue_timeout: Duration,
}

impl QueueConfig {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    pub fn enqueue_timeout(mut self, timeout: Duration) -> Self {
        self.enqueue_timeout = timeout;
        self
    }

    /// Capacity actually used for the buffer; a zero-sized buffer is not allowed.
    pub fn effective_capacity(&self) -> usize {
        self.capacity.max(1)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            enqueue_timeout: DEFAULT_ENQUEUE_TIMEOUT,
        }
    }
}

/// Where a broker keeps its queues and how it sizes them.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerConfig {
    pub data_dir: PathBuf,
    pub queue: QueueConfig,
}

impl BrokerConfig {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            queue: QueueConfig::default(),
        }
    }

    pub fn queue_config(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }
}

/// How the heartbeat monitor decides that a node is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeMode {
    /// Open a fresh TCP connection to the node's address.
    #[default]
    TcpConnect,
    /// Call `Node.Ping` over the cached RPC handle, racing a timer.
    RpcPing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatConfig {
    pub interval: Duration,
    /// Deadline of a TCP connect probe.
    pub probe_timeout: Duration,
    /// Deadline of a `Node.Ping` probe.
    pub ping_timeout: Duration,
    pub probe: ProbeMode,
}

impl HeartbeatConfig {
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    pub fn probe(mut self, probe: ProbeMode) -> Self {
        self.probe = probe;
        self
    }

    /// How long a single probe may take under the configured mode.
    pub fn probe_deadline(&self) -> Duration {
        match self.probe {
            ProbeMode::TcpConnect => self.probe_timeout,
            ProbeMode::RpcPing => self.ping_timeout,
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_HEARTBEAT_INTERVAL,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            ping_timeout: DEFAULT_PING_TIMEOUT,
            probe: ProbeMode::TcpConnect,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_config_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.capacity, 1000);
        assert_eq!(config.enqueue_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        assert_eq!(QueueConfig::with_capacity(0).effective_capacity(), 1);
        assert_eq!(QueueConfig::with_capacity(7).effective_capacity(), 7);
    }

    #[test]
    fn test_heartbeat_defaults() {
        let config = HeartbeatConfig::default();
        assert_eq!(config.interval, Duration::from_secs(1));
        assert_eq!(config.probe_timeout, Duration::from_millis(300));
        assert_eq!(config.ping_timeout, Duration::from_millis(500));
        assert_eq!(config.probe_deadline(), Duration::from_millis(300));

        let ping = config.probe(ProbeMode::RpcPing);
        assert_eq!(ping.probe_deadline(), Duration::from_millis(500));
    }

    #[test]
    fn test_heartbeat_builder() {
        let config = HeartbeatConfig::with_interval(Duration::from_millis(200))
            .probe_timeout(Duration::from_millis(50))
            .ping_timeout(Duration::from_millis(80))
            .probe(ProbeMode::RpcPing);

        assert_eq!(config.interval, Duration::from_millis(200));
        assert_eq!(config.probe_timeout, Duration::from_millis(50));
        assert_eq!(config.probe, ProbeMode::RpcPing);
        assert_eq!(config.probe_deadline(), Duration::from_millis(80));
    }
}
