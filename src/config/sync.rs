//! Sync engine configuration and model blocks.

use super::defaults::{
    default_max_frame_bytes, default_outbound_queue, default_retention_secs,
    default_snapshot_retry_limit,
};
use crate::state::{DeltaScope, ModelOptions};
use serde::Deserialize;
use std::time::Duration;

/// Sync engine tuning (`[sync]`).
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Replay window for models without their own `retention_secs`.
    #[serde(default = "default_retention_secs")]
    pub default_retention_secs: u64,
    /// Per-connection outbound queue capacity.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
    /// Largest inbound WebSocket frame accepted.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
    /// `key` replays only the subscribed entity's changes, `model` all of them.
    #[serde(default)]
    pub delta_scope: DeltaScope,
    /// Stale snapshot reads before a subscribe gives up; 0 never gives up.
    #[serde(default = "default_snapshot_retry_limit")]
    pub snapshot_retry_limit: u32,
}

impl SyncConfig {
    pub fn default_retention(&self) -> Duration {
        Duration::from_secs(self.default_retention_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_retention_secs: default_retention_secs(),
            outbound_queue: default_outbound_queue(),
            max_frame_bytes: default_max_frame_bytes(),
            delta_scope: DeltaScope::default(),
            snapshot_retry_limit: default_snapshot_retry_limit(),
        }
    }
}

/// A model registered at startup (`[[models]]`).
#[derive(Debug, Clone, Deserialize)]
pub struct ModelBlock {
    pub name: String,
    pub primary_key: String,
    /// Store collection; defaults to `name`.
    pub source: Option<String>,
    /// Replay window override.
    pub retention_secs: Option<u64>,
}

impl ModelBlock {
    pub fn options(&self) -> ModelOptions {
        ModelOptions {
            retention: self.retention_secs.map(Duration::from_secs),
            source: self.source.clone(),
        }
    }
}
