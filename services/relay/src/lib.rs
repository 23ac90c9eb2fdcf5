//! Live Relay Library Crate
//!
//! Relays a browser voice conversation to a Gemini Live session: configuration,
//! credentials, model discovery, HTTP routing and the WebSocket bridge. The
//! `relay` binary is a thin wrapper around this library.

pub mod catalog;
pub mod config;
pub mod credentials;
pub mod handlers;
pub mod router;
pub mod state;
pub mod ws;
