//! Server configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the Chairside gateway.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Interval between server-initiated Ping frames, in seconds.
    pub heartbeat_interval_secs: u64,
    /// Close the connection after this long without a Pong, in seconds.
    pub heartbeat_timeout_secs: u64,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Outbound queue depth per client before messages drop.
    pub send_queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 50,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 16 * 1024 * 1024, // 16 MB
            send_queue_capacity: 256,
        }
    }
}
