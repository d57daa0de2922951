//! Test WebSocket client.
//!
//! Sends client frames and decodes server frames for assertions.

use entwatch_proto::{ClientFrame, ServerFrame};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// A test WebSocket client.
pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    /// Connect to a test server.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let (ws, _response) = connect_async(url).await?;
        Ok(Self { ws })
    }

    /// Send raw text.
    pub async fn send_raw(&mut self, text: &str) -> anyhow::Result<()> {
        self.ws.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    /// Send a client frame.
    pub async fn send(&mut self, frame: &ClientFrame) -> anyhow::Result<()> {
        let text = frame.encode()?;
        self.send_raw(&text).await
    }

    /// Send a `subscribe-entity` frame.
    pub async fn subscribe(
        &mut self,
        request_id: &str,
        model: &str,
        key: &str,
        last_seq: Option<u64>,
    ) -> anyhow::Result<()> {
        self.send(&ClientFrame::SubscribeEntity {
            request_id: request_id.to_string(),
            model: model.to_string(),
            key: key.to_string(),
            last_seq,
        })
        .await
    }

    /// Send an `unsubscribe-entity` frame.
    pub async fn unsubscribe(&mut self, subscription_id: &str) -> anyhow::Result<()> {
        self.send(&ClientFrame::UnsubscribeEntity {
            subscription_id: subscription_id.to_string(),
        })
        .await
    }

    /// Receive a single frame from the server.
    pub async fn recv(&mut self) -> anyhow::Result<ServerFrame> {
        self.recv_timeout(Duration::from_secs(5)).await
    }

    /// Receive a frame with a timeout. Non-text messages are skipped.
    pub async fn recv_timeout(&mut self, dur: Duration) -> anyhow::Result<ServerFrame> {
        loop {
            let msg = timeout(dur, self.ws.next())
                .await?
                .ok_or_else(|| anyhow::anyhow!("connection closed"))??;
            if let Message::Text(text) = msg {
                return ServerFrame::decode(&text)
                    .map_err(|e| anyhow::anyhow!("decode error: {e}: {text}"));
            }
        }
    }

    /// Receive frames until the predicate returns true.
    pub async fn recv_until<F>(&mut self, mut predicate: F) -> anyhow::Result<Vec<ServerFrame>>
    where
        F: FnMut(&ServerFrame) -> bool,
    {
        let mut frames = Vec::new();
        loop {
            let frame = self.recv().await?;
            let done = predicate(&frame);
            frames.push(frame);
            if done {
                return Ok(frames);
            }
        }
    }

    /// Assert nothing arrives within `dur`.
    pub async fn expect_silence(&mut self, dur: Duration) -> anyhow::Result<()> {
        match self.recv_timeout(dur).await {
            Ok(frame) => anyhow::bail!("unexpected frame: {frame:?}"),
            Err(_) => Ok(()),
        }
    }

    /// Close the connection.
    pub async fn close(mut self) -> anyhow::Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}
