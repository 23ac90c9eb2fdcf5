//! WebSocket Relay Sessions
//!
//! Each browser connection gets exactly one upstream Gemini Live connection.
//!
//! - `bridge`: the session state machine (handshake gating, teardown).
//! - `leg`: write handles for the two connections.
//! - `upstream`: configuration resolution and dialing.
//! - `session`: the axum handler and the I/O loop that drives the bridge.

pub mod bridge;
pub mod leg;
mod session;
pub mod upstream;

pub use session::ws_handler;
