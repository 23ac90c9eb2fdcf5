//! Live Relay Wire Protocol
//!
//! Types for both legs of the relay and the stateless translator between them:
//!
//! - `downstream`: the browser-facing vocabulary (binary audio plus small tagged JSON).
//! - `upstream`: the Gemini Live `BidiGenerateContent` envelopes.
//! - `translate`: pure mapping functions between the two.

pub mod audio;
pub mod downstream;
pub mod translate;
pub mod upstream;

pub use downstream::{ControlEnvelope, ServerEvent};
pub use translate::{
    ProtocolError, SessionHint, decode_upstream, encode_control, encode_setup, translate_upstream,
};
pub use upstream::{SetupConfig, UpstreamEvent};
