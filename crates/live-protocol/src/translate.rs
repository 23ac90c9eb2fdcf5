//! Stateless mapping between the browser vocabulary and Gemini Live envelopes.
//!
//! Media is never decoded on the way down: upstream base64 is handed to the
//! client unchanged. Client audio is base64-encoded exactly once on the way up.

use crate::{
    audio::{DEFAULT_OUTPUT_MIME_TYPE, INPUT_MIME_TYPE},
    downstream::{ControlEnvelope, ServerEvent},
    upstream::{
        Blob, ClientMessage, InlineMedia, RealtimeInput, ServerMessage, SetupConfig,
        TranscriptSource, TurnMarker, UpstreamEvent,
    },
};
use base64::Engine;
use serde_json::Value;

/// Longest prefix of an unparseable upstream frame echoed to the client.
pub const DEBUG_PREFIX_CHARS: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Failed to encode upstream message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Session facts the translator needs to build a `ready` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHint {
    pub model: String,
    pub output_rate: u32,
}

/// Serializes the setup envelope.
pub fn encode_setup(setup: &SetupConfig) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(&ClientMessage::Setup(setup))?)
}

/// Serializes a client input as a `realtimeInput` envelope.
pub fn encode_control(envelope: &ControlEnvelope) -> Result<String, ProtocolError> {
    let input = match envelope {
        ControlEnvelope::Audio(bytes) => RealtimeInput {
            audio: Some(Blob {
                mime_type: INPUT_MIME_TYPE.to_string(),
                data: base64::engine::general_purpose::STANDARD.encode(bytes),
            }),
            ..Default::default()
        },
        ControlEnvelope::Text(text) => RealtimeInput {
            text: Some(text.clone()),
            ..Default::default()
        },
        ControlEnvelope::StopAudio => RealtimeInput {
            audio_stream_end: Some(true),
            ..Default::default()
        },
    };
    Ok(serde_json::to_string(&ClientMessage::RealtimeInput(input))?)
}

/// Classifies one upstream frame into zero or more events.
///
/// An `error` field short-circuits everything else in the frame, including
/// siblings that would not parse. Otherwise the order is: setup ack, input
/// transcript, output transcript, model turn parts, interrupted, turn complete.
pub fn decode_upstream(raw: &str) -> Vec<UpstreamEvent> {
    let unparseable = || {
        vec![UpstreamEvent::Unparseable {
            raw: raw.chars().take(DEBUG_PREFIX_CHARS).collect(),
        }]
    };
    let Ok(mut value) = serde_json::from_str::<Value>(raw) else {
        return unparseable();
    };

    if let Some(detail) = value
        .as_object_mut()
        .and_then(|fields| fields.remove("error"))
        .filter(|detail| !detail.is_null())
    {
        return vec![UpstreamEvent::Error { detail }];
    }

    let Ok(msg) = serde_json::from_value::<ServerMessage>(value) else {
        return unparseable();
    };

    let mut events = Vec::new();
    if msg.setup_complete.is_some() {
        events.push(UpstreamEvent::SetupAck);
    }

    let Some(content) = msg.server_content else {
        return events;
    };

    let transcripts = [
        (content.input_transcription, TranscriptSource::Input),
        (content.output_transcription, TranscriptSource::Output),
    ];
    for (transcription, source) in transcripts {
        if let Some(text) = transcription.and_then(|t| t.text).filter(|t| !t.is_empty()) {
            events.push(UpstreamEvent::Transcript { text, source });
        }
    }

    if let Some(turn) = content.model_turn {
        for part in turn.parts {
            let inline_media = part.inline_data.and_then(|blob| {
                blob.data.map(|data| InlineMedia {
                    mime_type: blob.mime_type,
                    data,
                })
            });
            let text = part.text.filter(|t| !t.is_empty());
            if text.is_some() || inline_media.is_some() {
                events.push(UpstreamEvent::ContentPart { text, inline_media });
            }
        }
    }

    if content.interrupted == Some(true) {
        events.push(UpstreamEvent::TurnMarker(TurnMarker::Interrupted));
    }
    if content.turn_complete == Some(true) {
        events.push(UpstreamEvent::TurnMarker(TurnMarker::Complete));
    }
    events
}

/// Maps one upstream event to the client-facing events it produces.
pub fn translate_upstream(event: UpstreamEvent, hint: &SessionHint) -> Vec<ServerEvent> {
    match event {
        UpstreamEvent::SetupAck => vec![ServerEvent::Ready {
            model: hint.model.clone(),
            output_rate: hint.output_rate,
        }],
        UpstreamEvent::Error { detail } => vec![ServerEvent::Error {
            message: stringify_detail(detail),
        }],
        UpstreamEvent::Transcript {
            text,
            source: TranscriptSource::Input,
        } => vec![ServerEvent::Transcript { text }],
        UpstreamEvent::Transcript {
            text,
            source: TranscriptSource::Output,
        } => vec![ServerEvent::AiTranscript { text }],
        UpstreamEvent::ContentPart { text, inline_media } => {
            let mut out = Vec::with_capacity(2);
            if let Some(text) = text {
                out.push(ServerEvent::AiText { text });
            }
            if let Some(media) = inline_media {
                out.push(ServerEvent::Audio {
                    mime_type: media
                        .mime_type
                        .unwrap_or_else(|| DEFAULT_OUTPUT_MIME_TYPE.to_string()),
                    data: media.data,
                });
            }
            out
        }
        UpstreamEvent::TurnMarker(TurnMarker::Interrupted) => vec![ServerEvent::Interrupted],
        UpstreamEvent::TurnMarker(TurnMarker::Complete) => vec![ServerEvent::TurnComplete],
        UpstreamEvent::Closed { code, reason } => {
            let message = if reason.is_empty() {
                format!("Upstream closed (code {code})")
            } else {
                format!("Upstream closed (code {code}): {reason}")
            };
            vec![ServerEvent::Closed { message }]
        }
        UpstreamEvent::Unparseable { raw } => vec![ServerEvent::Debug { raw }],
    }
}

fn stringify_detail(detail: Value) -> String {
    match detail {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
