//! Daemon assembly.
//!
//! Wires the store, the sync manager, the WebSocket gateway and the admin
//! HTTP server together from a [`Config`].

use crate::config::Config;
use crate::http::{self, AdminState};
use crate::network::Gateway;
use crate::state::SyncManager;
use crate::store::MemoryStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// A fully bound daemon, ready to run.
pub struct Daemon {
    store: Arc<MemoryStore>,
    manager: Arc<SyncManager>,
    gateway: Gateway,
    admin: Option<TcpListener>,
}

impl Daemon {
    /// Build from configuration. The admin server binds `0.0.0.0:metrics_port`
    /// unless the port is 0.
    pub async fn build(config: &Config) -> anyhow::Result<Self> {
        let admin = (config.server.metrics_port != 0)
            .then(|| SocketAddr::from(([0, 0, 0, 0], config.server.metrics_port)));
        Self::build_with_admin(config, admin).await
    }

    /// Build with an explicit admin bind address (`None` disables it).
    pub async fn build_with_admin(
        config: &Config,
        admin_addr: Option<SocketAddr>,
    ) -> anyhow::Result<Self> {
        let store = Arc::new(MemoryStore::new());
        let manager = SyncManager::new(store.clone(), config.sync_options());

        for model in &config.models {
            manager.register_model(&model.name, &model.primary_key, model.options())?;
        }
        info!(models = config.models.len(), "Models registered");

        let gateway = Gateway::bind(config, Arc::clone(&manager)).await?;
        let admin = match admin_addr {
            Some(addr) => {
                let listener = TcpListener::bind(addr).await?;
                info!(address = %listener.local_addr()?, "Admin HTTP server bound");
                Some(listener)
            }
            None => None,
        };

        Ok(Self {
            store,
            manager,
            gateway,
            admin,
        })
    }

    pub fn ws_addr(&self) -> std::io::Result<SocketAddr> {
        self.gateway.local_addr()
    }

    pub fn admin_addr(&self) -> Option<SocketAddr> {
        self.admin.as_ref().and_then(|l| l.local_addr().ok())
    }

    pub fn manager(&self) -> &Arc<SyncManager> {
        &self.manager
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Serve until the gateway fails.
    pub async fn run(self) -> anyhow::Result<()> {
        if let Some(listener) = self.admin {
            let state = AdminState {
                manager: Arc::clone(&self.manager),
                store: Arc::clone(&self.store),
            };
            tokio::spawn(http::serve(listener, state));
        }
        self.gateway.run().await
    }
}
