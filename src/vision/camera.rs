//! Camera frame loop and snapshot encoding
//!
//! Polls the frame source, feeds each frame to the landmark provider and the
//! attention detector, and emits a scaled-down JPEG snapshot of the latest
//! frame on a fixed cadence for scene-context transmission. Snapshots are
//! sent regardless of attention state; only spoken input is gated.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::pipeline::PipelineEvent;
use crate::vision::{AttentionDetector, FrameSource, LandmarkDetector, MediaFrame};
use crate::{Error, Result};

/// Longest edge of a transmitted snapshot, in pixels
pub const SNAPSHOT_MAX_EDGE: u32 = 640;

/// Frame poll cadence (~30 fps)
const FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Drives gaze classification and periodic snapshots until cancelled
pub struct CameraLoop {
    source: Box<dyn FrameSource>,
    landmarker: Option<Box<dyn LandmarkDetector>>,
    attention: AttentionDetector,
    snapshot_interval: Duration,
    jpeg_quality: u8,
}

impl CameraLoop {
    /// Create the loop
    ///
    /// `landmarker` is `None` when the vision provider failed to initialize;
    /// the loop then pins the attention gate open and keeps emitting
    /// snapshots, so a vision failure never blocks streaming.
    #[must_use]
    pub fn new(
        source: Box<dyn FrameSource>,
        landmarker: Option<Box<dyn LandmarkDetector>>,
        attention: AttentionDetector,
        snapshot_interval: Duration,
        jpeg_quality: u8,
    ) -> Self {
        Self {
            source,
            landmarker,
            attention,
            snapshot_interval,
            jpeg_quality,
        }
    }

    /// Run until the token is cancelled
    ///
    /// Publishes one attention classification per polled frame and one
    /// encoded snapshot per interval into the pipeline channel.
    pub async fn run(mut self, events: mpsc::Sender<PipelineEvent>, cancel: CancellationToken) {
        if self.landmarker.is_none() {
            tracing::warn!("no landmark provider - attention gate pinned open");
            self.attention.pin_focused();
        }

        let mut frame_tick = tokio::time::interval(FRAME_INTERVAL);
        frame_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut snapshot_tick = tokio::time::interval(self.snapshot_interval);
        snapshot_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let epoch = tokio::time::Instant::now();
        let mut latest_frame: Option<MediaFrame> = None;

        loop {
            tokio::select! {
                _ = frame_tick.tick() => {
                    match self.source.next_frame() {
                        Ok(Some(frame)) => {
                            self.classify(&frame, epoch.elapsed());
                            latest_frame = Some(frame);
                        }
                        Ok(None) => {}
                        Err(e) => {
                            tracing::warn!(error = %e, "camera frame grab failed");
                        }
                    }
                }
                _ = snapshot_tick.tick() => {
                    if let Some(frame) = &latest_frame {
                        match encode_snapshot(frame, self.jpeg_quality) {
                            Ok(jpeg) => {
                                if events.send(PipelineEvent::Snapshot(jpeg)).await.is_err() {
                                    return;
                                }
                            }
                            Err(e) => tracing::warn!(error = %e, "snapshot encode failed"),
                        }
                    }
                }
                () = cancel.cancelled() => {
                    tracing::debug!("camera loop shutting down");
                    return;
                }
            }
        }
    }

    fn classify(&mut self, frame: &MediaFrame, timestamp: Duration) {
        let Some(landmarker) = self.landmarker.as_mut() else {
            return;
        };

        match landmarker.detect(frame, timestamp) {
            Ok(landmarks) => {
                self.attention.observe(landmarks.as_ref());
            }
            Err(e) => {
                // Inference hiccup: keep the last classification
                tracing::trace!(error = %e, "landmark inference failed");
            }
        }
    }
}

/// Scale a frame down and encode it as JPEG for transmission
///
/// The longest edge is capped at [`SNAPSHOT_MAX_EDGE`] to bound bandwidth.
///
/// # Errors
///
/// Returns [`Error::Vision`] if the pixel buffer does not match the frame
/// dimensions or encoding fails.
pub fn encode_snapshot(frame: &MediaFrame, quality: u8) -> Result<Vec<u8>> {
    let image = image::RgbImage::from_raw(frame.width, frame.height, frame.pixels.clone())
        .ok_or_else(|| Error::Vision("frame buffer does not match dimensions".to_string()))?;

    let max_edge = frame.width.max(frame.height);
    let image = if max_edge > SNAPSHOT_MAX_EDGE {
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let scale = f64::from(SNAPSHOT_MAX_EDGE) / f64::from(max_edge);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let width = (f64::from(frame.width) * scale).round().max(1.0) as u32;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let height = (f64::from(frame.height) * scale).round().max(1.0) as u32;
        image::imageops::resize(&image, width, height, image::imageops::FilterType::Triangle)
    } else {
        image
    };

    let mut jpeg = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, quality)
        .encode_image(&image)
        .map_err(|e| Error::Vision(e.to_string()))?;

    Ok(jpeg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32) -> MediaFrame {
        MediaFrame {
            width,
            height,
            pixels: vec![0x40; (width * height * 3) as usize],
        }
    }

    #[test]
    fn snapshot_is_jpeg() {
        let jpeg = encode_snapshot(&solid_frame(320, 240), 80).unwrap();
        assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn snapshot_scales_down_large_frames() {
        let jpeg = encode_snapshot(&solid_frame(1280, 720), 80).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.width(), 640);
        assert_eq!(decoded.height(), 360);
    }

    #[test]
    fn snapshot_keeps_small_frames() {
        let jpeg = encode_snapshot(&solid_frame(320, 240), 80).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.width(), 320);
        assert_eq!(decoded.height(), 240);
    }

    #[test]
    fn mismatched_buffer_is_rejected() {
        let bad = MediaFrame {
            width: 100,
            height: 100,
            pixels: vec![0; 10],
        };
        assert!(encode_snapshot(&bad, 80).is_err());
    }
}
