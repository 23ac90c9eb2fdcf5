//! Resolves everything a session needs from configuration and dials Gemini Live.

use super::leg::{UpstreamLeg, UpstreamSink};
use crate::state::AppState;
use anyhow::{Context, Result, anyhow};
use futures_util::{StreamExt, stream::SplitStream};
use live_protocol::SetupConfig;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::handshake::client::Request,
};
use tracing::info;

pub type UpstreamStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// A fully resolved upstream target, ready to dial.
#[derive(Debug)]
pub struct UpstreamPlan {
    pub request: Request,
    pub setup: SetupConfig,
}

/// Builds the setup envelope and the authorized connection request.
///
/// Any error here is a configuration error: no connection has been attempted.
pub async fn plan(state: &AppState) -> Result<UpstreamPlan> {
    let config = &state.config;
    let model = config
        .live_model
        .as_deref()
        .ok_or_else(|| anyhow!("No upstream model configured (set LIVE_MODEL)"))?;
    let endpoint = config
        .live_endpoint
        .as_deref()
        .ok_or_else(|| anyhow!("No upstream endpoint configured (set LIVE_ENDPOINT)"))?;

    let credential = state.credentials.resolve().await?;
    let request = credential.authorize(endpoint)?;

    let setup = SetupConfig::new(
        model,
        config.temperature,
        config.max_output_tokens,
        &state.system_prompt,
        config.input_transcription,
        config.output_transcription,
    );
    Ok(UpstreamPlan { request, setup })
}

/// Opens the upstream WebSocket and splits it into the bridge's write leg and a read stream.
pub async fn connect(request: Request) -> Result<(UpstreamLeg, UpstreamStream)> {
    let (ws_stream, _) = connect_async(request)
        .await
        .context("Failed to connect to the upstream live endpoint")?;
    info!("Connected to upstream live endpoint.");
    let (sink, stream): (UpstreamSink, UpstreamStream) = ws_stream.split();
    Ok((UpstreamLeg::new(sink), stream))
}
