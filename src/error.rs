//! Error types for the Aperture live pipeline

use thiserror::Error;

/// Result type alias for Aperture operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the live pipeline
///
/// Failures are caught at the boundary where they occur and converted to a
/// status update; none propagate as uncaught faults that would terminate the
/// pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// Camera/microphone permission denied or device absent
    #[error("media access error: {0}")]
    MediaAccess(String),

    /// Remote session failed to open or closed unexpectedly
    #[error("connection error: {0}")]
    Connection(String),

    /// Malformed inbound audio payload
    #[error("decode error: {0}")]
    Decode(String),

    /// Vision provider error
    #[error("vision error: {0}")]
    Vision(String),

    /// Audio device or stream error
    #[error("audio error: {0}")]
    Audio(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal channel closed
    #[error("channel error: {0}")]
    Channel(String),

    /// Operation attempted in the wrong session state
    #[error("session state error: {0}")]
    SessionState(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// WebSocket transport error
    #[error("websocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(e))
    }
}
