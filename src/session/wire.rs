//! Outbound wire messages
//!
//! Typed JSON frames for the bidirectional session: the connect-time setup
//! message and the realtime media chunks that follow it.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;

use crate::audio::CAPTURE_SAMPLE_RATE;
use crate::config::LiveConfig;

/// Connect-time session setup
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupMessage {
    setup: Setup,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Setup {
    model: String,
    generation_config: GenerationConfig,
    system_instruction: Content,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_audio_transcription: Option<Enabled>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_audio_transcription: Option<Enabled>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<String>,
    speech_config: SpeechConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig {
    voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig {
    prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig {
    voice_name: String,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
struct TextPart {
    text: String,
}

/// Marker for transcription flags: presence enables the event stream
#[derive(Debug, Serialize)]
struct Enabled {}

impl SetupMessage {
    /// Build the setup frame from connect-time options
    #[must_use]
    pub fn new(config: &LiveConfig) -> Self {
        Self {
            setup: Setup {
                model: config.model.clone(),
                generation_config: GenerationConfig {
                    response_modalities: vec![config.response_modality.clone()],
                    speech_config: SpeechConfig {
                        voice_config: VoiceConfig {
                            prebuilt_voice_config: PrebuiltVoiceConfig {
                                voice_name: config.voice.clone(),
                            },
                        },
                    },
                },
                system_instruction: Content {
                    parts: vec![TextPart {
                        text: config.system_instruction.clone(),
                    }],
                },
                input_audio_transcription: config.transcribe_input.then_some(Enabled {}),
                output_audio_transcription: config.transcribe_output.then_some(Enabled {}),
            },
        }
    }
}

/// A realtime media frame: one or more typed chunks
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputMessage {
    realtime_input: RealtimeInput,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeInput {
    media_chunks: Vec<MediaChunk>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MediaChunk {
    mime_type: String,
    data: String,
}

impl RealtimeInputMessage {
    /// Wrap base64-encoded PCM captured at [`CAPTURE_SAMPLE_RATE`]
    #[must_use]
    pub fn audio(encoded_pcm: String) -> Self {
        Self {
            realtime_input: RealtimeInput {
                media_chunks: vec![MediaChunk {
                    mime_type: format!("audio/pcm;rate={CAPTURE_SAMPLE_RATE}"),
                    data: encoded_pcm,
                }],
            },
        }
    }

    /// Wrap an encoded JPEG scene snapshot
    #[must_use]
    pub fn snapshot(jpeg: &[u8]) -> Self {
        Self {
            realtime_input: RealtimeInput {
                media_chunks: vec![MediaChunk {
                    mime_type: "image/jpeg".to_string(),
                    data: BASE64.encode(jpeg),
                }],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> LiveConfig {
        LiveConfig {
            model: "models/test-live".to_string(),
            response_modality: "AUDIO".to_string(),
            voice: "Zephyr".to_string(),
            system_instruction: "Be brief.".to_string(),
            transcribe_input: true,
            transcribe_output: true,
        }
    }

    #[test]
    fn setup_carries_connect_options() {
        let json = serde_json::to_value(SetupMessage::new(&test_config())).unwrap();

        assert_eq!(json["setup"]["model"], "models/test-live");
        assert_eq!(
            json["setup"]["generationConfig"]["responseModalities"][0],
            "AUDIO"
        );
        assert_eq!(
            json["setup"]["generationConfig"]["speechConfig"]["voiceConfig"]
                ["prebuiltVoiceConfig"]["voiceName"],
            "Zephyr"
        );
        assert_eq!(
            json["setup"]["systemInstruction"]["parts"][0]["text"],
            "Be brief."
        );
        assert!(json["setup"]["inputAudioTranscription"].is_object());
        assert!(json["setup"]["outputAudioTranscription"].is_object());
    }

    #[test]
    fn transcription_flags_are_absent_when_disabled() {
        let mut config = test_config();
        config.transcribe_input = false;
        config.transcribe_output = false;

        let json = serde_json::to_value(SetupMessage::new(&config)).unwrap();
        assert!(json["setup"].get("inputAudioTranscription").is_none());
        assert!(json["setup"].get("outputAudioTranscription").is_none());
    }

    #[test]
    fn audio_chunk_declares_capture_rate() {
        let json = serde_json::to_value(RealtimeInputMessage::audio("AAAA".to_string())).unwrap();
        let chunk = &json["realtimeInput"]["mediaChunks"][0];
        assert_eq!(chunk["mimeType"], "audio/pcm;rate=16000");
        assert_eq!(chunk["data"], "AAAA");
    }

    #[test]
    fn snapshot_chunk_is_jpeg_base64() {
        let json = serde_json::to_value(RealtimeInputMessage::snapshot(&[0xFF, 0xD8])).unwrap();
        let chunk = &json["realtimeInput"]["mediaChunks"][0];
        assert_eq!(chunk["mimeType"], "image/jpeg");
        assert_eq!(chunk["data"], BASE64.encode([0xFF, 0xD8]));
    }
}
