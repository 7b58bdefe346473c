//! Aperture - live multimodal perception client for AI assistants
//!
//! Streams microphone audio and periodic scene snapshots to a remote
//! generative session, gates spoken input on whether the user is looking at
//! the camera, and plays the model's audio replies gaplessly.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     Capture Manager                       │
//! │    Camera frames │ Snapshot timer │ Microphone blocks    │
//! └───────┬────────────────┬───────────────────┬─────────────┘
//!         │                │                   │
//!   ┌─────▼──────┐         │                   │
//!   │ Attention  │── gate ─┼───────────────────┤
//!   │ Detector   │         │                   │
//!   └────────────┘   ┌─────▼───────────────────▼─────┐
//!                    │       Streaming Session        │◄──── remote
//!                    └─────┬───────────────────┬──────┘      endpoint
//!                          │                   │
//!                ┌─────────▼────────┐  ┌───────▼────────┐
//!                │ Playback         │  │ Turn           │
//!                │ Scheduler        │  │ Aggregator     │──► chat log
//!                └──────────────────┘  └────────────────┘
//! ```
//!
//! Every event source pushes into one internal channel consumed by a single
//! logical loop ([`pipeline::LivePipeline`]); teardown is one cancellation
//! token that every producer is gated on.

pub mod audio;
pub mod chat;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod playback;
pub mod session;
pub mod turn;
pub mod vision;

pub use chat::{ChatLog, ChatTurn, MemoryChatLog};
pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::{LivePipeline, PipelineEvent, PipelineHandles, Status};
pub use session::{ServerEvent, SessionState, StreamingSession};
pub use turn::{Caption, CompletedTurn, TurnAggregator};
pub use vision::{
    AttentionState, FaceLandmarks, FrameSource, LandmarkDetector, MediaFrame, Point,
};
