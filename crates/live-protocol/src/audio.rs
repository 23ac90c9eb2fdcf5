// Audio formats on both legs. Payloads are never resampled by the relay.

/// Sample rate of the PCM16 mono audio the browser sends and the upstream accepts.
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Sample rate the upstream produces audio at unless it says otherwise.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// MIME type attached to every audio chunk forwarded upstream.
pub const INPUT_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// MIME type reported downstream when an inline media part omits one.
pub const DEFAULT_OUTPUT_MIME_TYPE: &str = "audio/pcm;rate=24000";
