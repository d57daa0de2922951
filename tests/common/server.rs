//! Test server management.
//!
//! Runs an entwatchd instance inside the test runtime on ephemeral ports.

use entwatchd::config::{Config, validate};
use entwatchd::{Daemon, MemoryStore, SyncManager};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Models every test server registers.
const MODELS: &str = r#"
[[models]]
name = "User"
primary_key = "id"

[[models]]
name = "Order"
primary_key = "id"

[[models]]
name = "OrderAudit"
primary_key = "id"
source = "Order"
"#;

/// A test server instance. The daemon task is aborted on drop.
pub struct TestServer {
    ws_addr: SocketAddr,
    http_addr: SocketAddr,
    manager: Arc<SyncManager>,
    store: Arc<MemoryStore>,
    task: JoinHandle<()>,
}

impl TestServer {
    /// Spawn a server with the default `[sync]` section.
    pub async fn spawn() -> anyhow::Result<Self> {
        Self::spawn_with_sync("").await
    }

    /// Spawn a server with the given `[sync]` body.
    pub async fn spawn_with_sync(sync: &str) -> anyhow::Result<Self> {
        let config_content = format!(
            r#"
[server]
name = "entwatch.test"
node_id = "T01"
metrics_port = 0

[listen]
address = "127.0.0.1:0"

[sync]
{sync}
{MODELS}
"#
        );
        let config: Config = toml::from_str(&config_content)?;
        if let Err(errors) = validate(&config) {
            anyhow::bail!("invalid test config: {errors:?}");
        }

        let admin: SocketAddr = "127.0.0.1:0".parse()?;
        let daemon = Daemon::build_with_admin(&config, Some(admin)).await?;
        let ws_addr = daemon.ws_addr()?;
        let http_addr = daemon
            .admin_addr()
            .ok_or_else(|| anyhow::anyhow!("admin listener not bound"))?;
        let manager = Arc::clone(daemon.manager());
        let store = Arc::clone(daemon.store());

        let task = tokio::spawn(async move {
            let _ = daemon.run().await;
        });

        Ok(Self {
            ws_addr,
            http_addr,
            manager,
            store,
            task,
        })
    }

    /// WebSocket URL of the gateway.
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.ws_addr)
    }

    /// Base URL of the admin HTTP server.
    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.http_addr, path)
    }

    pub fn manager(&self) -> &Arc<SyncManager> {
        &self.manager
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Create a new test client connected to this server.
    pub async fn connect(&self) -> anyhow::Result<super::client::TestClient> {
        super::client::TestClient::connect(&self.ws_url()).await
    }

    /// Poll until the live subscription count reaches `expected`.
    pub async fn wait_for_subscriptions(&self, expected: usize) -> anyhow::Result<()> {
        for _ in 0..100 {
            if self.manager.active_subscription_count() == expected {
                return Ok(());
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        anyhow::bail!(
            "expected {expected} subscriptions, have {}",
            self.manager.active_subscription_count()
        )
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
