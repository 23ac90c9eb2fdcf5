//! Gemini Live `BidiGenerateContent` envelopes.
//!
//! Outgoing types always serialize camelCase. Incoming types accept both the
//! camelCase and snake_case spelling of every field, so the rest of the relay
//! only ever sees one shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// --- Client -> Gemini ---

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) enum ClientMessage<'a> {
    Setup(&'a SetupConfig),
    RealtimeInput(RealtimeInput),
}

/// The one-time handshake payload. Sent as the first upstream message.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SetupConfig {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<AudioTranscriptionConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_transcription: Option<AudioTranscriptionConfig>,
}

impl SetupConfig {
    /// Builds an audio-response setup.
    ///
    /// `model` gains the `models/` prefix if it lacks one. An empty preamble
    /// omits `systemInstruction` entirely.
    pub fn new(
        model: &str,
        temperature: f64,
        max_output_tokens: u32,
        system_preamble: &str,
        transcribe_input: bool,
        transcribe_output: bool,
    ) -> Self {
        let model = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        };
        let system_instruction = (!system_preamble.trim().is_empty()).then(|| Content {
            role: None,
            parts: vec![Part {
                text: system_preamble.to_string(),
            }],
        });
        Self {
            model,
            generation_config: GenerationConfig {
                response_modalities: vec![ResponseModality::Audio],
                temperature,
                max_output_tokens,
            },
            system_instruction,
            input_audio_transcription: transcribe_input.then_some(AudioTranscriptionConfig {}),
            output_audio_transcription: transcribe_output.then_some(AudioTranscriptionConfig {}),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<ResponseModality>,
    pub temperature: f64,
    pub max_output_tokens: u32,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseModality {
    Text,
    Audio,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub parts: Vec<Part>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Part {
    pub text: String,
}

/// Presence enables transcription; the object itself carries no options.
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct AudioTranscriptionConfig {}

#[derive(Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RealtimeInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<Blob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_stream_end: Option<bool>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Blob {
    pub mime_type: String,
    pub data: String,
}

// --- Gemini -> Client ---

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ServerMessage {
    #[serde(alias = "setup_complete")]
    pub setup_complete: Option<Value>,
    #[serde(alias = "server_content")]
    pub server_content: Option<ServerContent>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ServerContent {
    #[serde(alias = "model_turn")]
    pub model_turn: Option<ModelTurn>,
    #[serde(alias = "input_transcription")]
    pub input_transcription: Option<Transcription>,
    #[serde(alias = "output_transcription")]
    pub output_transcription: Option<Transcription>,
    pub interrupted: Option<bool>,
    #[serde(alias = "turn_complete")]
    pub turn_complete: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<ServerPart>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ServerPart {
    pub text: Option<String>,
    #[serde(alias = "inline_data")]
    pub inline_data: Option<ServerBlob>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ServerBlob {
    #[serde(alias = "mime_type")]
    pub mime_type: Option<String>,
    pub data: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct Transcription {
    pub text: Option<String>,
}

/// Which side of the conversation a transcript belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptSource {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnMarker {
    Interrupted,
    Complete,
}

/// Base64 media carried inline in a model turn, untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineMedia {
    pub mime_type: Option<String>,
    pub data: String,
}

/// A normalized event observed on the upstream leg.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    SetupAck,
    Error {
        detail: Value,
    },
    Transcript {
        text: String,
        source: TranscriptSource,
    },
    ContentPart {
        text: Option<String>,
        inline_media: Option<InlineMedia>,
    },
    TurnMarker(TurnMarker),
    Closed {
        code: u16,
        reason: String,
    },
    Unparseable {
        raw: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_setup_serializes_camel_case() {
        let setup = SetupConfig::new("gemini-live", 0.5, 256, "Be brief.", true, false);
        let value = serde_json::to_value(ClientMessage::Setup(&setup)).unwrap();
        assert_eq!(
            value,
            json!({
                "setup": {
                    "model": "models/gemini-live",
                    "generationConfig": {
                        "responseModalities": ["AUDIO"],
                        "temperature": 0.5,
                        "maxOutputTokens": 256
                    },
                    "systemInstruction": {"parts": [{"text": "Be brief."}]},
                    "inputAudioTranscription": {}
                }
            })
        );
    }

    #[test]
    fn test_setup_keeps_existing_model_prefix_and_drops_empty_preamble() {
        let setup = SetupConfig::new("models/x", 1.0, 1, "  ", false, false);
        assert_eq!(setup.model, "models/x");
        assert!(setup.system_instruction.is_none());
        assert!(setup.input_audio_transcription.is_none());
        assert!(setup.output_audio_transcription.is_none());
    }

    #[test]
    fn test_server_message_accepts_both_casings() {
        let camel: ServerMessage = serde_json::from_value(json!({
            "serverContent": {"modelTurn": {"parts": [{"inlineData": {"mimeType": "a", "data": "b"}}]}, "turnComplete": true}
        }))
        .unwrap();
        let snake: ServerMessage = serde_json::from_value(json!({
            "server_content": {"model_turn": {"parts": [{"inline_data": {"mime_type": "a", "data": "b"}}]}, "turn_complete": true}
        }))
        .unwrap();

        for msg in [camel, snake] {
            let content = msg.server_content.unwrap();
            assert_eq!(content.turn_complete, Some(true));
            let part = &content.model_turn.unwrap().parts[0];
            let blob = part.inline_data.as_ref().unwrap();
            assert_eq!(blob.mime_type.as_deref(), Some("a"));
            assert_eq!(blob.data.as_deref(), Some("b"));
        }
    }
}
