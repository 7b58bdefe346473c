//! Audio capture, shared sample types, and the PCM transport codec

pub mod codec;

mod capture;

pub use capture::{rms, samples_to_wav, MicCapture, CAPTURE_BLOCK_SIZE, CAPTURE_SAMPLE_RATE};

use std::time::Duration;

/// A fixed-size buffer of PCM samples at a declared sample rate
///
/// Immutable after creation; ownership transfers once enqueued.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioChunk {
    /// Wrap samples captured or decoded at `sample_rate`
    #[must_use]
    pub const fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// The samples, `f32` in [-1.0, 1.0]
    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Consume the chunk, yielding its samples
    #[must_use]
    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    /// Declared sample rate in Hz
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Playback duration of the chunk
    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }

    /// Whether the chunk carries no samples
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
