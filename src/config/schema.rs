//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the forward proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, backlog, connection limit).
    pub listener: ListenerConfig,

    /// Response cache settings.
    pub cache: CacheConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Transaction log settings.
    pub log: LogConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Address to bind to, without the port (e.g. "0.0.0.0").
    pub bind_address: String,

    /// Port to listen on. Always overridden by the CLI argument.
    pub port: u16,

    /// Listen backlog passed to the OS.
    pub backlog: u32,

    /// Maximum concurrent client connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            backlog: 100,
            max_connections: 10_000,
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached responses before LRU eviction kicks in.
    pub max_entries: usize,

    /// Seconds between sweeps of expired entries.
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 50,
            sweep_interval_secs: 300,
        }
    }
}

/// Timeout configuration for the various socket operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Timeout for reading the client's request, in seconds.
    pub client_recv_secs: u64,

    /// Timeout for reads from the origin server, in seconds.
    pub origin_recv_secs: u64,

    /// Timeout for the first burst of an origin response, in seconds.
    pub initial_response_secs: u64,

    /// Idle timeout for CONNECT tunnels, in milliseconds.
    pub tunnel_idle_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            client_recv_secs: 30,
            origin_recv_secs: 10,
            initial_response_secs: 5,
            tunnel_idle_ms: 10_500,
        }
    }
}

impl TimeoutConfig {
    pub fn client_recv(&self) -> Duration {
        Duration::from_secs(self.client_recv_secs)
    }

    pub fn origin_recv(&self) -> Duration {
        Duration::from_secs(self.origin_recv_secs)
    }

    pub fn initial_response(&self) -> Duration {
        Duration::from_secs(self.initial_response_secs)
    }

    pub fn tunnel_idle(&self) -> Duration {
        Duration::from_millis(self.tunnel_idle_ms)
    }
}

/// Transaction log configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Path of the transaction log file. Truncated at startup.
    pub path: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/log/erss/proxy.log"),
        }
    }
}
