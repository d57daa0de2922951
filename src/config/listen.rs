//! Network listener configuration.

use serde::Deserialize;
use std::net::SocketAddr;

/// WebSocket listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Address to bind to (e.g., "0.0.0.0:7700").
    pub address: SocketAddr,
    /// Allowed origins for the WebSocket handshake.
    /// If empty, all origins are allowed.
    #[serde(default)]
    pub allow_origins: Vec<String>,
}
