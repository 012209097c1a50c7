//! Client configuration

use std::time::Duration;

use herdio_proto::{DEFAULT_ADDR, DEFAULT_PORT};
use serde::{Deserialize, Serialize};

/// Configuration for cluster connections
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Cluster address
    pub address: String,
    /// Cluster port
    pub port: u16,
    /// Request the writeback mode of the server-side object cache for
    /// object writes; an explicit [`crate::VdiSession::flush`] is then
    /// required for durability
    pub writeback: bool,
    /// Optional per-exchange deadline. `None` reproduces the reference
    /// behavior: a hung peer blocks the caller indefinitely.
    pub request_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDR.to_string(),
            port: DEFAULT_PORT,
            writeback: false,
            request_timeout: None,
        }
    }
}
