//! Default value functions for configuration.

// =============================================================================
// Server Defaults
// =============================================================================

pub fn default_node_id() -> String {
    "E01".to_string()
}

pub fn default_metrics_port() -> u16 {
    9090
}

// =============================================================================
// Sync Defaults
// =============================================================================

/// Five minutes.
pub fn default_retention_secs() -> u64 {
    300
}

pub fn default_outbound_queue() -> usize {
    1024
}

pub fn default_max_frame_bytes() -> usize {
    64 * 1024
}

pub fn default_snapshot_retry_limit() -> u32 {
    64
}
