//! entwatchd - Entwatch Daemon
//!
//! Serves per-entity change subscriptions over WebSocket.

use entwatchd::Daemon;
use entwatchd::config::{Config, validate};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    if let Err(errors) = validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        return Err(anyhow::anyhow!(
            "configuration has {} error(s), see above",
            errors.len()
        ));
    }

    info!(
        server = %config.server.name,
        node_id = %config.server.node_id,
        listen = %config.listen.address,
        "Starting entwatchd"
    );

    entwatchd::metrics::init();

    let daemon = Daemon::build(&config).await?;
    let manager = std::sync::Arc::clone(daemon.manager());

    tokio::select! {
        result = daemon.run() => {
            if let Err(e) = &result {
                error!(error = %e, "Gateway stopped");
            }
            result
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
            manager.dispose()?;
            Ok(())
        }
    }
}
