//! Connection - Handles an individual client connection.
//!
//! Each Connection runs in its own Tokio task:
//!
//! ```text
//!   WebSocket read ──▶ decode ClientFrame ──▶ SyncManager
//!                                               │ (subscribe runs on its own task)
//!                                               ▼
//!   WebSocket write ◀── outbound queue ◀── ClientHandle::send
//! ```
//!
//! When the socket ends the client handle is closed, which runs the close
//! hooks and purges the connection's subscriptions.

use crate::metrics;
use crate::network::gateway::ConnectionLimits;
use crate::network::ClientHandle;
use crate::state::{ConnectionId, SyncManager};
use crate::store::CallerContext;
use crate::telemetry::spans;
use entwatch_proto::ClientFrame;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{Instrument, debug, info, instrument, warn};

/// A client connection handler.
pub struct Connection {
    id: ConnectionId,
    addr: SocketAddr,
    ws: WebSocketStream<TcpStream>,
    manager: Arc<SyncManager>,
    ctx: CallerContext,
    limits: ConnectionLimits,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        ws: WebSocketStream<TcpStream>,
        addr: SocketAddr,
        manager: Arc<SyncManager>,
        ctx: CallerContext,
        limits: ConnectionLimits,
    ) -> Self {
        Self {
            id,
            addr,
            ws,
            manager,
            ctx,
            limits,
        }
    }

    /// Run the connection until the client goes away.
    #[instrument(skip(self), fields(id = %self.id, addr = %self.addr), name = "connection")]
    pub async fn run(self) -> anyhow::Result<()> {
        let Self {
            id,
            ws,
            manager,
            ctx,
            limits,
            ..
        } = self;

        let (client, mut outgoing_rx) = ClientHandle::new(id, limits.outbound_queue);
        let (mut writer, mut reader) = ws.split();
        metrics::inc_connected_clients();
        info!("Client connected");

        loop {
            tokio::select! {
                // Inbound frames
                result = reader.next() => {
                    match result {
                        Some(Ok(Message::Text(text))) => {
                            dispatch(&manager, &client, &ctx, &text);
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!("Client disconnected");
                            break;
                        }
                        Some(Ok(Message::Binary(data))) => {
                            debug!(len = data.len(), "Ignoring binary frame");
                        }
                        // Pings are answered by tungstenite.
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "Read error");
                            break;
                        }
                    }
                }

                // Outbound pushes
                Some(frame) = outgoing_rx.recv() => {
                    let text = match frame.encode() {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(error = %e, frame = frame.frame_type(), "Failed to encode frame");
                            continue;
                        }
                    };
                    if let Err(e) = writer.send(Message::Text(text)).await {
                        warn!(error = %e, "Write error");
                        break;
                    }
                }
            }
        }

        client.close();
        metrics::dec_connected_clients();
        if let Err(e) = writer.close().await {
            debug!(error = %e, "Socket close failed");
        }
        Ok(())
    }
}

/// Route one inbound text frame.
fn dispatch(manager: &Arc<SyncManager>, client: &ClientHandle, ctx: &CallerContext, text: &str) {
    let frame = match ClientFrame::decode(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(error = %e, code = e.error_code(), "Ignoring undecodable frame");
            return;
        }
    };

    match frame {
        ClientFrame::SubscribeEntity {
            request_id,
            model,
            key,
            last_seq,
        } => {
            let span = spans::subscribe(&request_id, &model, &key, last_seq);
            let manager = Arc::clone(manager);
            let client = client.clone();
            let ctx = ctx.clone();
            // A slow store read must not stall the read loop.
            tokio::spawn(
                async move {
                    if let Err(e) = manager
                        .subscribe_entity(&client, &ctx, &request_id, &model, &key, last_seq)
                        .await
                    {
                        warn!(error = %e, "Subscribe failed");
                    }
                }
                .instrument(span),
            );
        }
        ClientFrame::UnsubscribeEntity { subscription_id } => {
            match manager.unsubscribe(&subscription_id) {
                Ok(removed) => debug!(subscription_id = %subscription_id, removed, "Unsubscribe"),
                Err(e) => warn!(subscription_id = %subscription_id, error = %e, "Unsubscribe failed"),
            }
        }
    }
}
