//! Core configuration types and loading.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use super::defaults::{default_metrics_port, default_node_id};
use super::listen::ListenConfig;
use super::sync::{ModelBlock, SyncConfig};
use crate::state::SyncOptions;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Daemon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server identity.
    pub server: ServerConfig,
    /// WebSocket listen configuration.
    pub listen: ListenConfig,
    /// Sync engine tuning.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Models registered at startup.
    #[serde(default)]
    pub models: Vec<ModelBlock>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Manager-wide options derived from `[sync]`.
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            default_retention: self.sync.default_retention(),
            delta_scope: self.sync.delta_scope,
            snapshot_retry_limit: self.sync.snapshot_retry_limit,
        }
    }
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Display name, logged at startup.
    pub name: String,
    /// Node id prefix for connection ids (3 characters).
    #[serde(default = "default_node_id")]
    pub node_id: String,
    /// Metrics/admin HTTP port. 0 disables the HTTP server.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::DeltaScope;
    use std::io::Write;
    use std::time::Duration;

    const FULL: &str = r#"
[server]
name = "entwatch.local"
node_id = "E02"
metrics_port = 0

[listen]
address = "127.0.0.1:7700"
allow_origins = ["https://app.test"]

[sync]
default_retention_secs = 60
outbound_queue = 16
delta_scope = "model"
snapshot_retry_limit = 0

[[models]]
name = "Order"
primary_key = "id"
source = "orders"
retention_secs = 600

[[models]]
name = "Invoice"
primary_key = "number"
"#;

    #[test]
    fn test_parse_full_config() {
        let config: Config = toml::from_str(FULL).unwrap();
        assert_eq!(config.server.node_id, "E02");
        assert_eq!(config.server.metrics_port, 0);
        assert_eq!(config.listen.allow_origins, vec!["https://app.test"]);
        assert_eq!(config.sync.outbound_queue, 16);
        assert_eq!(config.sync.max_frame_bytes, 65536);
        assert_eq!(config.models.len(), 2);

        let options = config.sync_options();
        assert_eq!(options.default_retention, Duration::from_secs(60));
        assert_eq!(options.delta_scope, DeltaScope::Model);
        assert_eq!(options.snapshot_retry_limit, 0);

        let order = config.models[0].options();
        assert_eq!(order.retention, Some(Duration::from_secs(600)));
        assert_eq!(order.source.as_deref(), Some("orders"));
        assert_eq!(config.models[1].options().retention, None);
    }

    #[test]
    fn test_defaults_apply() {
        let config: Config = toml::from_str(
            r#"
[server]
name = "entwatch.local"

[listen]
address = "127.0.0.1:7700"
"#,
        )
        .unwrap();
        assert_eq!(config.server.node_id, "E01");
        assert_eq!(config.server.metrics_port, 9090);
        assert!(config.listen.allow_origins.is_empty());
        assert_eq!(config.sync.default_retention_secs, 300);
        assert_eq!(config.sync.outbound_queue, 1024);
        assert_eq!(config.sync.delta_scope, DeltaScope::Key);
        assert_eq!(config.sync.snapshot_retry_limit, 64);
        assert!(config.models.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.name, "entwatch.local");
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[server\nname = ").unwrap();
        assert!(matches!(Config::load(file.path()), Err(ConfigError::Parse(_))));
        assert!(matches!(
            Config::load("/nonexistent/entwatchd.toml"),
            Err(ConfigError::Io(_))
        ));
    }
}
