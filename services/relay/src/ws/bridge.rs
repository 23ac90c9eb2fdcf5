//! The per-connection state machine pairing one browser leg with one upstream leg.
//!
//! The session is the single writer of both legs. Everything that arrives
//! before the upstream acknowledges setup is dropped, never queued. Any
//! transport-level failure on either side tears down both.

use super::leg::Leg;
use live_protocol::{
    ControlEnvelope, ServerEvent, SessionHint, SetupConfig, UpstreamEvent, decode_upstream,
    encode_control, encode_setup, translate_upstream,
};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// Dialing the upstream.
    Connecting,
    /// Setup sent, waiting for `setupComplete`.
    AwaitingSetupAck,
    Ready,
    /// The upstream never acknowledged setup.
    SetupTimeout,
    Closed,
}

impl BridgeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, BridgeState::SetupTimeout | BridgeState::Closed)
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CloseReason {
    DownstreamClosed,
    DownstreamError(String),
    UpstreamClosed { code: u16, reason: String },
    UpstreamError(String),
    /// Configuration, connection or setup-send failure before the session was ready.
    SetupFailed(String),
    SetupTimeout(Duration),
}

/// A frame received from the browser.
#[derive(Debug, Clone, PartialEq)]
pub enum DownstreamPayload {
    Binary(Vec<u8>),
    Text(String),
}

pub struct BridgeSession<D: Leg, U: Leg> {
    state: BridgeState,
    downstream: Option<D>,
    upstream: Option<U>,
    hint: SessionHint,
}

impl<D: Leg, U: Leg> BridgeSession<D, U> {
    pub fn new(downstream: D, output_rate: u32) -> Self {
        Self {
            state: BridgeState::Connecting,
            downstream: Some(downstream),
            upstream: None,
            hint: SessionHint {
                model: String::new(),
                output_rate,
            },
        }
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    /// Adopts the freshly opened upstream and sends `setup` as its first message.
    pub async fn on_upstream_open(&mut self, mut upstream: U, setup: &SetupConfig) {
        if self.state != BridgeState::Connecting {
            warn!(state = ?self.state, "Upstream opened after session ended. Discarding it.");
            let _ = upstream.close().await;
            return;
        }

        self.hint.model = setup.model.clone();
        self.state = BridgeState::AwaitingSetupAck;
        let sent = match encode_setup(setup) {
            Ok(payload) => upstream.send_text(payload).await,
            Err(e) => Err(e.into()),
        };
        self.upstream = Some(upstream);

        match sent {
            Ok(()) => info!(model = %self.hint.model, "Setup sent upstream. Awaiting acknowledgment."),
            Err(e) => {
                self.close(CloseReason::SetupFailed(format!(
                    "Failed to send session setup: {e}"
                )))
                .await
            }
        }
    }

    /// Forwards a browser frame upstream. A no-op unless the session is ready.
    pub async fn on_downstream_message(&mut self, payload: DownstreamPayload) {
        if self.state != BridgeState::Ready {
            debug!(state = ?self.state, "Dropping client message received before ready.");
            return;
        }

        let envelope = match payload {
            DownstreamPayload::Binary(bytes) => ControlEnvelope::Audio(bytes),
            DownstreamPayload::Text(text) => match ControlEnvelope::from_json(&text) {
                Some(envelope) => envelope,
                None => {
                    debug!("Ignoring unrecognized client control message.");
                    return;
                }
            },
        };

        let payload = match encode_control(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to encode client message. Dropping it.");
                return;
            }
        };

        let Some(upstream) = self.upstream.as_mut() else {
            return;
        };
        if let Err(e) = upstream.send_text(payload).await {
            self.close(CloseReason::UpstreamError(e.to_string())).await;
        }
    }

    /// Translates one upstream frame and forwards the result to the browser.
    pub async fn on_upstream_message(&mut self, raw: &str) {
        if self.state.is_terminal() {
            return;
        }

        for event in decode_upstream(raw) {
            match &event {
                UpstreamEvent::SetupAck if self.state == BridgeState::AwaitingSetupAck => {
                    self.state = BridgeState::Ready;
                    info!(model = %self.hint.model, "Upstream session ready.");
                }
                UpstreamEvent::SetupAck => {
                    debug!(state = ?self.state, "Ignoring repeated setup acknowledgment.");
                    continue;
                }
                UpstreamEvent::Error { detail } => {
                    warn!(%detail, "Upstream reported an in-band error.");
                }
                UpstreamEvent::Unparseable { .. } => {
                    warn!("Received an unparseable upstream frame.");
                }
                _ if self.state != BridgeState::Ready => {
                    debug!(state = ?self.state, "Dropping upstream content received before ready.");
                    continue;
                }
                _ => {}
            }

            for out in translate_upstream(event, &self.hint) {
                if !self.emit(&out).await {
                    return;
                }
            }
        }
    }

    /// Ends the session. Only the first call has any effect.
    pub async fn close(&mut self, reason: CloseReason) {
        if self.state.is_terminal() {
            return;
        }
        info!(?reason, state = ?self.state, "Closing bridge session.");
        self.state = match reason {
            CloseReason::SetupTimeout(_) => BridgeState::SetupTimeout,
            _ => BridgeState::Closed,
        };

        let notice = match reason {
            CloseReason::DownstreamClosed | CloseReason::DownstreamError(_) => None,
            CloseReason::UpstreamClosed { code, reason } => {
                translate_upstream(UpstreamEvent::Closed { code, reason }, &self.hint)
                    .into_iter()
                    .next()
            }
            CloseReason::UpstreamError(e) => {
                Some(ServerEvent::error(format!("Upstream connection error: {e}")))
            }
            CloseReason::SetupFailed(message) => Some(ServerEvent::error(message)),
            CloseReason::SetupTimeout(after) => Some(ServerEvent::error(format!(
                "Upstream did not acknowledge setup within {after:?}"
            ))),
        };

        if let Some(mut downstream) = self.downstream.take() {
            if let Some(event) = notice
                && let Ok(text) = event.to_json()
            {
                let _ = downstream.send_text(text).await;
            }
            if let Err(e) = downstream.close().await {
                debug!(error = %e, "Ignoring error while closing client connection.");
            }
        }
        if let Some(mut upstream) = self.upstream.take()
            && let Err(e) = upstream.close().await
        {
            debug!(error = %e, "Ignoring error while closing upstream connection.");
        }
    }

    /// Sends one event to the browser. Returns false if the session had to close.
    async fn emit(&mut self, event: &ServerEvent) -> bool {
        let text = match event.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Failed to serialize client event. Dropping it.");
                return true;
            }
        };
        let Some(downstream) = self.downstream.as_mut() else {
            return false;
        };
        if let Err(e) = downstream.send_text(text).await {
            self.close(CloseReason::DownstreamError(e.to_string())).await;
            return false;
        }
        true
    }
}
