//! Defines the WebSocket message protocol between the browser client and the relay.

use serde::{Deserialize, Serialize};

/// An input from the browser that may be forwarded upstream.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEnvelope {
    /// A raw PCM16 mono 16 kHz chunk, received as a binary frame.
    Audio(Vec<u8>),
    /// Text the user typed instead of speaking.
    Text(String),
    /// The user stopped the microphone for this turn.
    StopAudio,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TaggedControl {
    Text { text: String },
    StopAudio,
}

impl ControlEnvelope {
    /// Parses a text frame from the client.
    ///
    /// Returns `None` for anything that is not exactly a `text` or `stop_audio`
    /// object; callers drop such frames without reporting them.
    pub fn from_json(text: &str) -> Option<Self> {
        match serde_json::from_str::<TaggedControl>(text).ok()? {
            TaggedControl::Text { text } => Some(Self::Text(text)),
            TaggedControl::StopAudio => Some(Self::StopAudio),
        }
    }
}

/// Messages sent from the relay to the client (browser).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// The upstream session acknowledged setup; audio may flow.
    Ready {
        model: String,
        #[serde(rename = "outputRate")]
        output_rate: u32,
    },
    /// Transcription of the user's speech.
    Transcript { text: String },
    /// Transcription of the model's speech.
    AiTranscript { text: String },
    /// A plain text part of the model's turn.
    AiText { text: String },
    /// A chunk of model audio, base64 exactly as the upstream sent it.
    Audio {
        #[serde(rename = "mimeType")]
        mime_type: String,
        data: String,
    },
    /// The user barged in and the model stopped its turn.
    Interrupted,
    /// The model finished its turn.
    TurnComplete,
    Error { message: String },
    /// The upstream transport closed.
    Closed { message: String },
    /// An upstream frame that could not be parsed, truncated.
    Debug { raw: String },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Serializes the event for a text frame.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
