//! Server event decoding
//!
//! Inbound frames are decoded once, at the boundary, into a tagged variant.
//! Anything the pipeline does not understand maps to [`ServerEvent::Ignored`]
//! rather than being silently skipped by nested field checks.

use serde::Deserialize;

use crate::audio::{codec, AudioChunk};
use crate::playback::PLAYBACK_SAMPLE_RATE;

/// One decoded event from the remote session
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// A chunk of model audio output, decoded to samples
    Audio(AudioChunk),
    /// Incremental fragment of the model's speech transcript
    OutputTranscript(String),
    /// Incremental fragment of the user's speech transcript
    InputTranscript(String),
    /// The current turn finished
    TurnComplete,
    /// The user barged in; pending model output is stale
    Interrupted,
    /// Setup acknowledgement or an unrecognized shape; explicit no-op
    Ignored,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerMessage {
    server_content: Option<ServerContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    model_turn: Option<ModelTurn>,
    input_transcription: Option<Transcription>,
    output_transcription: Option<Transcription>,
    #[serde(default)]
    turn_complete: bool,
    #[serde(default)]
    interrupted: bool,
}

#[derive(Debug, Deserialize)]
struct ModelTurn {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct Transcription {
    #[serde(default)]
    text: String,
}

/// Decode one raw frame into its events
///
/// A single frame may carry several events (transcript deltas alongside
/// audio, a final delta alongside `turnComplete`). Malformed JSON and
/// unrecognized shapes yield `[Ignored]`; a malformed audio part is dropped
/// with a log line while the rest of the frame still decodes; playback
/// continues with subsequent chunks.
#[must_use]
pub fn decode(frame: &str) -> Vec<ServerEvent> {
    let message: ServerMessage = match serde_json::from_str(frame) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!(error = %e, "unparseable server frame");
            return vec![ServerEvent::Ignored];
        }
    };

    let Some(content) = message.server_content else {
        return vec![ServerEvent::Ignored];
    };

    let mut events = Vec::new();

    if content.interrupted {
        events.push(ServerEvent::Interrupted);
    }

    if let Some(transcription) = content.input_transcription {
        if !transcription.text.is_empty() {
            events.push(ServerEvent::InputTranscript(transcription.text));
        }
    }

    if let Some(transcription) = content.output_transcription {
        if !transcription.text.is_empty() {
            events.push(ServerEvent::OutputTranscript(transcription.text));
        }
    }

    for part in content.model_turn.into_iter().flat_map(|t| t.parts) {
        let Some(inline) = part.inline_data else {
            continue;
        };
        if !inline.mime_type.starts_with("audio/pcm") {
            tracing::debug!(mime = %inline.mime_type, "ignoring non-PCM inline data");
            continue;
        }

        let rate = mime_rate(&inline.mime_type).unwrap_or(PLAYBACK_SAMPLE_RATE);
        match codec::decode_audio(&inline.data) {
            Ok(samples) => events.push(ServerEvent::Audio(AudioChunk::new(samples, rate))),
            Err(e) => {
                tracing::debug!(error = %e, "dropping malformed audio chunk");
            }
        }
    }

    if content.turn_complete {
        events.push(ServerEvent::TurnComplete);
    }

    if events.is_empty() {
        events.push(ServerEvent::Ignored);
    }

    events
}

/// Parse the sample rate from a mime type like `audio/pcm;rate=24000`
fn mime_rate(mime: &str) -> Option<u32> {
    mime.split(';')
        .find_map(|param| param.trim().strip_prefix("rate="))
        .and_then(|rate| rate.parse().ok())
}
