//! The outbound half of each connection a bridge session owns.

use anyhow::Result;
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, stream::SplitSink};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, tungstenite::protocol::Message as WsMessage,
};

pub type UpstreamSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

/// A write handle to one side of the relay.
///
/// Only JSON text ever leaves the bridge, in either direction.
#[async_trait]
pub trait Leg: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Sends a close frame and shuts the sink down.
    async fn close(&mut self) -> Result<()>;
}

/// The browser connection.
pub struct DownstreamLeg(SplitSink<WebSocket, Message>);

impl DownstreamLeg {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self(sink)
    }
}

#[async_trait]
impl Leg for DownstreamLeg {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.0.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.0.close().await?;
        Ok(())
    }
}

/// The Gemini Live connection.
pub struct UpstreamLeg(UpstreamSink);

impl UpstreamLeg {
    pub fn new(sink: UpstreamSink) -> Self {
        Self(sink)
    }
}

#[async_trait]
impl Leg for UpstreamLeg {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.0.send(WsMessage::Text(text.into())).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.0.close().await?;
        Ok(())
    }
}
