//! Configuration for the live pipeline
//!
//! Defaults, overlaid by the optional TOML file, overlaid by environment
//! variables. The API key only ever comes from the environment and is held
//! as a [`SecretString`].

pub mod file;

use std::time::Duration;

use secrecy::SecretString;

use crate::audio::CAPTURE_BLOCK_SIZE;
use crate::vision::DEFAULT_ATTENTION_THRESHOLD;
use crate::{Error, Result};

/// Environment variable carrying the endpoint API key
pub const API_KEY_ENV: &str = "APERTURE_API_KEY";

/// Default live endpoint URL
const DEFAULT_ENDPOINT: &str =
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Default model identifier
const DEFAULT_MODEL: &str = "models/gemini-2.0-flash-live-001";

/// Default prebuilt voice
const DEFAULT_VOICE: &str = "Zephyr";

/// Default system preamble
const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a realtime companion. You see the user's \
    surroundings through periodic snapshots and hear them when they are looking at the camera. \
    Treat the visual input as context for the conversation rather than something to describe; \
    react to the user's spoken words first.";

/// Resolved runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Connect-time session options
    pub live: LiveConfig,

    /// Audio capture options
    pub audio: AudioSettings,

    /// Attention gating options
    pub attention: AttentionSettings,

    /// Scene snapshot options
    pub snapshot: SnapshotSettings,

    /// Remote endpoint options
    pub endpoint: EndpointConfig,

    /// How long the final caption stays visible after a turn completes
    pub caption_hold: Duration,
}

/// Connect-time options for the remote session
#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// Model identifier
    pub model: String,

    /// Desired response modality (audio)
    pub response_modality: String,

    /// Prebuilt voice name
    pub voice: String,

    /// System preamble text
    pub system_instruction: String,

    /// Request input-transcription events
    pub transcribe_input: bool,

    /// Request output-transcription events
    pub transcribe_output: bool,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            response_modality: "AUDIO".to_string(),
            voice: DEFAULT_VOICE.to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            transcribe_input: true,
            transcribe_output: true,
        }
    }
}

/// Audio capture options
#[derive(Debug, Clone)]
pub struct AudioSettings {
    /// Samples accumulated before a capture block is emitted
    pub block_size: usize,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            block_size: CAPTURE_BLOCK_SIZE,
        }
    }
}

/// Attention gating options
#[derive(Debug, Clone)]
pub struct AttentionSettings {
    /// Nose-deviance threshold as a fraction of face width, in (0, 1)
    pub threshold: f32,
}

impl Default for AttentionSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_ATTENTION_THRESHOLD,
        }
    }
}

/// Scene snapshot options
#[derive(Debug, Clone)]
pub struct SnapshotSettings {
    /// Time between transmitted snapshots
    pub interval: Duration,

    /// JPEG quality, 1-100
    pub jpeg_quality: u8,
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            jpeg_quality: 80,
        }
    }
}

/// Remote endpoint options
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// WebSocket URL of the live endpoint
    pub url: String,

    /// API key sent with the connect request
    pub api_key: Option<SecretString>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            live: LiveConfig::default(),
            audio: AudioSettings::default(),
            attention: AttentionSettings::default(),
            snapshot: SnapshotSettings::default(),
            endpoint: EndpointConfig::default(),
            caption_hold: Duration::from_secs(2),
        }
    }
}

impl Config {
    /// Load configuration from the default file path and the environment
    ///
    /// # Errors
    ///
    /// Returns an error when the config file is unreadable or a value is
    /// out of range.
    pub fn load() -> Result<Self> {
        Self::load_from(&file::default_path())
    }

    /// Load configuration from an explicit file path and the environment
    ///
    /// # Errors
    ///
    /// Returns an error when the config file is unreadable or a value is
    /// out of range.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let mut config = Self::default();
        config.apply_file(file::ApertureConfigFile::load(path)?);
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, file: file::ApertureConfigFile) {
        if let Some(model) = file.live.model {
            self.live.model = model;
        }
        if let Some(voice) = file.live.voice {
            self.live.voice = voice;
        }
        if let Some(instruction) = file.live.system_instruction {
            self.live.system_instruction = instruction;
        }
        if let Some(flag) = file.live.transcribe_input {
            self.live.transcribe_input = flag;
        }
        if let Some(flag) = file.live.transcribe_output {
            self.live.transcribe_output = flag;
        }
        if let Some(block_size) = file.audio.block_size {
            self.audio.block_size = block_size;
        }
        if let Some(threshold) = file.attention.threshold {
            self.attention.threshold = threshold;
        }
        if let Some(interval_ms) = file.snapshot.interval_ms {
            self.snapshot.interval = Duration::from_millis(interval_ms);
        }
        if let Some(quality) = file.snapshot.jpeg_quality {
            self.snapshot.jpeg_quality = quality;
        }
        if let Some(url) = file.endpoint.url {
            self.endpoint.url = url;
        }
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.is_empty() {
                self.endpoint.api_key = Some(SecretString::from(key));
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.attention.threshold) || self.attention.threshold <= 0.0 {
            return Err(Error::Config(format!(
                "attention.threshold must be in (0, 1), got {}",
                self.attention.threshold
            )));
        }
        if self.audio.block_size == 0 {
            return Err(Error::Config("audio.block_size must be positive".to_string()));
        }
        if self.snapshot.jpeg_quality == 0 || self.snapshot.jpeg_quality > 100 {
            return Err(Error::Config(format!(
                "snapshot.jpeg_quality must be 1-100, got {}",
                self.snapshot.jpeg_quality
            )));
        }
        Ok(())
    }
}
