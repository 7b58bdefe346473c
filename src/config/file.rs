//! TOML configuration file loading
//!
//! Supports `~/.config/aperture/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of
//! defaults.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ApertureConfigFile {
    /// Live session options
    #[serde(default)]
    pub live: LiveFileConfig,

    /// Audio capture/playback options
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Attention gating options
    #[serde(default)]
    pub attention: AttentionFileConfig,

    /// Scene snapshot options
    #[serde(default)]
    pub snapshot: SnapshotFileConfig,

    /// Remote endpoint options
    #[serde(default)]
    pub endpoint: EndpointFileConfig,
}

/// Live session configuration
#[derive(Debug, Default, Deserialize)]
pub struct LiveFileConfig {
    /// Model identifier (e.g. "models/gemini-2.0-flash-live-001")
    pub model: Option<String>,

    /// Prebuilt voice name (e.g. "Zephyr")
    pub voice: Option<String>,

    /// System preamble text
    pub system_instruction: Option<String>,

    /// Request input-transcription events
    pub transcribe_input: Option<bool>,

    /// Request output-transcription events
    pub transcribe_output: Option<bool>,
}

/// Audio configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Samples accumulated before a capture block is emitted
    pub block_size: Option<usize>,
}

/// Attention gating configuration
#[derive(Debug, Default, Deserialize)]
pub struct AttentionFileConfig {
    /// Nose-deviance threshold as a fraction of face width, in (0, 1)
    pub threshold: Option<f32>,
}

/// Scene snapshot configuration
#[derive(Debug, Default, Deserialize)]
pub struct SnapshotFileConfig {
    /// Milliseconds between transmitted snapshots
    pub interval_ms: Option<u64>,

    /// JPEG quality, 1-100
    pub jpeg_quality: Option<u8>,
}

/// Remote endpoint configuration
#[derive(Debug, Default, Deserialize)]
pub struct EndpointFileConfig {
    /// WebSocket URL of the live endpoint
    pub url: Option<String>,
}

/// Default config file path: `~/.config/aperture/config.toml`
#[must_use]
pub fn default_path() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".config/aperture/config.toml"),
        |d| d.config_dir().join("aperture").join("config.toml"),
    )
}

impl ApertureConfigFile {
    /// Load the file at `path`, or defaults when it does not exist
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load(path: &std::path::Path) -> crate::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_parses() {
        let file: ApertureConfigFile = toml::from_str(
            r#"
            [attention]
            threshold = 0.30

            [snapshot]
            interval_ms = 750
            "#,
        )
        .unwrap();

        assert_eq!(file.attention.threshold, Some(0.30));
        assert_eq!(file.snapshot.interval_ms, Some(750));
        assert!(file.live.model.is_none());
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let file: ApertureConfigFile = toml::from_str("").unwrap();
        assert!(file.endpoint.url.is_none());
        assert!(file.audio.block_size.is_none());
    }
}
