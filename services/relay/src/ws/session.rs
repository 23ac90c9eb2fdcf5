//! Drives one bridge session from the sockets' I/O events.

use super::{
    bridge::{BridgeSession, BridgeState, CloseReason, DownstreamPayload},
    leg::{DownstreamLeg, UpstreamLeg},
    upstream::{self, UpstreamStream},
};
use crate::state::AppState;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{StreamExt, stream::SplitStream};
use std::sync::Arc;
use tokio_tungstenite::tungstenite::{
    Error as WsError,
    protocol::{CloseFrame as WsCloseFrame, Message as WsMessage},
};
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Close code reported when the upstream vanishes without a close frame.
const ABNORMAL_CLOSURE: u16 = 1006;
/// Close code reported when a close frame carries no status.
const NO_STATUS: u16 = 1005;

type Session = BridgeSession<DownstreamLeg, UpstreamLeg>;

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Runs one relay session to completion.
#[instrument(name = "ws_session", skip_all, fields(session_id = %Uuid::new_v4()))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    info!("New client connection.");
    let (socket_tx, mut socket_rx) = socket.split();
    let mut session = Session::new(
        DownstreamLeg::new(socket_tx),
        state.config.output_sample_rate,
    );

    let deadline = tokio::time::sleep(state.config.setup_timeout);
    tokio::pin!(deadline);

    // Resolve config and dial while still draining (and dropping) client frames.
    let connecting = async {
        let plan = upstream::plan(&state).await?;
        let (leg, stream) = upstream::connect(plan.request).await?;
        anyhow::Ok((leg, stream, plan.setup))
    };
    tokio::pin!(connecting);

    let mut upstream_rx = loop {
        tokio::select! {
            result = &mut connecting => match result {
                Ok((leg, stream, setup)) => {
                    session.on_upstream_open(leg, &setup).await;
                    break stream;
                }
                Err(e) => {
                    session.close(CloseReason::SetupFailed(format!("{e:#}"))).await;
                    log_finished(&session);
                    return;
                }
            },
            msg = socket_rx.next() => on_client_frame(&mut session, msg).await,
            _ = &mut deadline => {
                session.close(CloseReason::SetupTimeout(state.config.setup_timeout)).await;
            }
        }
        if session.state().is_terminal() {
            log_finished(&session);
            return;
        }
    };

    run_bridge(
        &mut session,
        &mut socket_rx,
        &mut upstream_rx,
        deadline,
        &state,
    )
    .await;
    log_finished(&session);
}

async fn run_bridge(
    session: &mut Session,
    socket_rx: &mut SplitStream<WebSocket>,
    upstream_rx: &mut UpstreamStream,
    mut deadline: std::pin::Pin<&mut tokio::time::Sleep>,
    state: &AppState,
) {
    while !session.state().is_terminal() {
        tokio::select! {
            msg = socket_rx.next() => on_client_frame(session, msg).await,
            msg = upstream_rx.next() => on_upstream_frame(session, msg).await,
            _ = &mut deadline, if session.state() != BridgeState::Ready => {
                session.close(CloseReason::SetupTimeout(state.config.setup_timeout)).await;
            }
        }
    }
}

async fn on_client_frame(session: &mut Session, msg: Option<Result<Message, axum::Error>>) {
    match msg {
        Some(Ok(Message::Binary(data))) => {
            session
                .on_downstream_message(DownstreamPayload::Binary(data.to_vec()))
                .await
        }
        Some(Ok(Message::Text(text))) => {
            session
                .on_downstream_message(DownstreamPayload::Text(text.as_str().to_owned()))
                .await
        }
        Some(Ok(Message::Close(frame))) => {
            debug!(?frame, "Client sent close frame.");
            session.close(CloseReason::DownstreamClosed).await
        }
        Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
        Some(Err(e)) => session.close(CloseReason::DownstreamError(e.to_string())).await,
        None => session.close(CloseReason::DownstreamClosed).await,
    }
}

async fn on_upstream_frame(session: &mut Session, msg: Option<Result<WsMessage, WsError>>) {
    match msg {
        Some(Ok(WsMessage::Text(text))) => session.on_upstream_message(text.as_str()).await,
        // The live service delivers its JSON in binary frames.
        Some(Ok(WsMessage::Binary(data))) => {
            session
                .on_upstream_message(&String::from_utf8_lossy(&data))
                .await
        }
        Some(Ok(WsMessage::Close(frame))) => {
            let (code, reason) = match frame {
                Some(WsCloseFrame { code, reason }) => {
                    (u16::from(code), reason.as_str().to_owned())
                }
                None => (NO_STATUS, String::new()),
            };
            session
                .close(CloseReason::UpstreamClosed { code, reason })
                .await
        }
        Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => {}
        Some(Err(e)) => session.close(CloseReason::UpstreamError(e.to_string())).await,
        None => {
            session
                .close(CloseReason::UpstreamClosed {
                    code: ABNORMAL_CLOSURE,
                    reason: "connection ended without a close frame".to_string(),
                })
                .await
        }
    }
}

fn log_finished(session: &Session) {
    info!(state = ?session.state(), "Relay session finished.");
}
