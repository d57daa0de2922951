//! Gateway - WebSocket listener that accepts incoming connections.
//!
//! The Gateway binds the listen socket, performs the origin-checked
//! WebSocket handshake for each client and spawns a Connection task.

use crate::config::Config;
use crate::network::Connection;
use crate::state::{ConnectionIdGenerator, SyncManager};
use crate::store::CallerContext;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async_with_config;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tracing::{error, info, instrument, warn};

/// Per-connection limits.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionLimits {
    /// Capacity of the outbound push queue.
    pub outbound_queue: usize,
    /// Largest accepted inbound frame.
    pub max_frame_bytes: usize,
}

/// The Gateway accepts incoming WebSocket connections and spawns handlers.
pub struct Gateway {
    listener: TcpListener,
    manager: Arc<SyncManager>,
    ids: Arc<ConnectionIdGenerator>,
    allow_origins: Arc<Vec<String>>,
    limits: ConnectionLimits,
}

impl Gateway {
    /// Bind the gateway to the configured listen address.
    pub async fn bind(config: &Config, manager: Arc<SyncManager>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.listen.address).await?;
        info!(address = %listener.local_addr()?, "WebSocket listener bound");

        Ok(Self {
            listener,
            manager,
            ids: Arc::new(ConnectionIdGenerator::new(config.server.node_id.clone())),
            allow_origins: Arc::new(config.listen.allow_origins.clone()),
            limits: ConnectionLimits {
                outbound_queue: config.sync.outbound_queue,
                max_frame_bytes: config.sync.max_frame_bytes,
            },
        })
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the gateway, accepting connections forever.
    #[instrument(skip(self), name = "gateway")]
    pub async fn run(self) -> anyhow::Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    info!(%addr, "WebSocket connection attempt");

                    let id = self.ids.next();
                    let manager = Arc::clone(&self.manager);
                    let allowed = Arc::clone(&self.allow_origins);
                    let limits = self.limits;

                    tokio::spawn(async move {
                        handle_socket(id, stream, addr, manager, allowed, limits).await;
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept WebSocket connection");
                }
            }
        }
    }
}

async fn handle_socket(
    id: String,
    stream: TcpStream,
    addr: SocketAddr,
    manager: Arc<SyncManager>,
    allowed: Arc<Vec<String>>,
    limits: ConnectionLimits,
) {
    let mut principal = None;

    let handshake = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        principal = bearer_principal(req);

        if origin_allowed(&allowed, req) {
            return Ok(response);
        }
        let origin = req
            .headers()
            .get("Origin")
            .and_then(|o| o.to_str().ok())
            .unwrap_or("");
        warn!(%addr, origin = %origin, "WebSocket origin rejected");

        let mut rejection = ErrorResponse::new(Some("Origin not allowed".to_string()));
        *rejection.status_mut() = StatusCode::FORBIDDEN;
        Err(rejection)
    };

    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(limits.max_frame_bytes);
    ws_config.max_frame_size = Some(limits.max_frame_bytes);

    let accepted = accept_hdr_async_with_config(stream, handshake, Some(ws_config)).await;
    match accepted {
        Ok(ws_stream) => {
            info!(%addr, "WebSocket handshake successful");
            let ctx = CallerContext::for_connection(id.clone(), addr).with_principal(principal);
            let connection = Connection::new(id.clone(), ws_stream, addr, manager, ctx, limits);
            if let Err(e) = connection.run().await {
                error!(%id, %addr, error = %e, "WebSocket connection error");
            }
            info!(%id, %addr, "WebSocket connection closed");
        }
        Err(e) => {
            warn!(%addr, error = %e, "WebSocket handshake failed");
        }
    }
}

/// Empty allow list admits every origin.
fn origin_allowed(allowed: &[String], req: &Request) -> bool {
    if allowed.is_empty() {
        return true;
    }
    req.headers()
        .get("Origin")
        .and_then(|o| o.to_str().ok())
        .is_some_and(|origin| allowed.iter().any(|a| a == origin || a == "*"))
}

/// Credential from the `Authorization` header, without a `Bearer ` prefix.
fn bearer_principal(req: &Request) -> Option<String> {
    let value = req.headers().get("Authorization")?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    (!token.is_empty()).then(|| token.to_string())
}
