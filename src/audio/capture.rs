//! Microphone capture
//!
//! Continuous capture from the default input device, delivered as fixed-size
//! blocks at the 16 kHz transmission rate. Capture runs regardless of
//! attention state (the gate sits at the send boundary, not here) so the
//! stream has no discontinuities and the level meter stays live.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::Stream;
use tokio::sync::watch;

use crate::audio::codec;
use crate::{Error, Result};

/// Sample rate audio is transmitted at (16 kHz for speech)
pub const CAPTURE_SAMPLE_RATE: u32 = 16000;

/// Samples of device audio accumulated before a block is emitted
pub const CAPTURE_BLOCK_SIZE: usize = 4096;

/// Captures microphone audio in fixed blocks
pub struct MicCapture {
    stream: Option<Stream>,
    meter_rx: watch::Receiver<f32>,
}

impl MicCapture {
    /// Acquire the default input device and start capturing
    ///
    /// `on_block` is invoked from the audio callback with each full block of
    /// mono samples, already resampled to [`CAPTURE_SAMPLE_RATE`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::MediaAccess`] when no input device exists or the
    /// stream cannot be opened; the caller must not proceed to connect.
    pub fn start(on_block: impl FnMut(Vec<f32>) + Send + 'static) -> Result<Self> {
        Self::start_with_block_size(CAPTURE_BLOCK_SIZE, on_block)
    }

    /// [`Self::start`] with an explicit accumulation block size
    ///
    /// # Errors
    ///
    /// Returns [`Error::MediaAccess`] when no input device exists or the
    /// stream cannot be opened.
    pub fn start_with_block_size(
        block_size: usize,
        mut on_block: impl FnMut(Vec<f32>) + Send + 'static,
    ) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::MediaAccess("no input device available".to_string()))?;

        let supported = device
            .default_input_config()
            .map_err(|e| Error::MediaAccess(e.to_string()))?;

        let device_rate = supported.sample_rate().0;
        let config = supported.config();
        let channels = config.channels as usize;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            device_rate,
            channels,
            "audio capture initialized"
        );

        let (meter_tx, meter_rx) = watch::channel(0.0f32);

        let mut block = Vec::with_capacity(block_size);
        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    for frame in data.chunks(channels) {
                        #[allow(clippy::cast_precision_loss)]
                        let mono = frame.iter().sum::<f32>() / frame.len() as f32;
                        block.push(mono);

                        if block.len() >= block_size {
                            let raw = std::mem::replace(
                                &mut block,
                                Vec::with_capacity(block_size),
                            );
                            meter_tx.send_replace(rms(&raw));
                            on_block(codec::resample(&raw, device_rate, CAPTURE_SAMPLE_RATE));
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::MediaAccess(e.to_string()))?;

        stream
            .play()
            .map_err(|e| Error::MediaAccess(e.to_string()))?;

        tracing::debug!("audio capture started");

        Ok(Self {
            stream: Some(stream),
            meter_rx,
        })
    }

    /// Stop capturing and release the device
    ///
    /// Idempotent; safe to call after the stream is already gone.
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }

    /// Check if currently capturing
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    /// Read side of the per-block RMS level meter
    #[must_use]
    pub fn meter(&self) -> watch::Receiver<f32> {
        self.meter_rx.clone()
    }
}

impl Drop for MicCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// RMS energy of a sample block
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Convert `f32` samples to WAV bytes for debug capture dumps
///
/// # Errors
///
/// Returns [`Error::Audio`] if WAV encoding fails.
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
