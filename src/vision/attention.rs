//! Attention detection from face landmarks
//!
//! Derives a binary looking/not-looking signal from the nose tip and ear
//! tragion positions, once per processed frame. Only the latest
//! classification matters: the result is published through a watch channel,
//! so a slow consumer simply observes the most recent value.

use tokio::sync::watch;

use crate::vision::FaceLandmarks;

/// Default nose-deviance threshold as a fraction of face width
pub const DEFAULT_ATTENTION_THRESHOLD: f32 = 0.25;

/// Attention classification for the current frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttentionState {
    /// No frame has been classified yet
    #[default]
    Initializing,
    /// The user is looking at the camera
    Focused,
    /// The user is looking away, or no face is visible
    Distracted,
}

/// Classifies per-frame landmarks into an [`AttentionState`]
///
/// Sole writer of the attention channel; the streaming session's gate and
/// the UI read it.
pub struct AttentionDetector {
    threshold: f32,
    tx: watch::Sender<AttentionState>,
}

impl AttentionDetector {
    /// Create a detector and the read side of its state channel
    ///
    /// The channel starts at [`AttentionState::Initializing`].
    #[must_use]
    pub fn new(threshold: f32) -> (Self, watch::Receiver<AttentionState>) {
        let (tx, rx) = watch::channel(AttentionState::Initializing);
        (Self { threshold, tx }, rx)
    }

    /// Classify one frame's landmarks and publish the result
    ///
    /// `None` (no face detected) always classifies as Distracted.
    pub fn observe(&self, landmarks: Option<&FaceLandmarks>) -> AttentionState {
        let state = landmarks.map_or(AttentionState::Distracted, |lm| self.classify(lm));
        self.tx.send_replace(state);
        state
    }

    /// Pin the published state open
    ///
    /// Used when the vision provider fails: streaming continues without gaze
    /// gating rather than going silent.
    pub fn pin_focused(&self) {
        self.tx.send_replace(AttentionState::Focused);
    }

    fn classify(&self, lm: &FaceLandmarks) -> AttentionState {
        let ear_mid_x = (lm.left_ear.x + lm.right_ear.x) / 2.0;
        let face_width = (lm.left_ear.x - lm.right_ear.x).abs();
        let deviance = (lm.nose.x - ear_mid_x).abs();

        // Strict comparison: deviance exactly at the threshold is Distracted
        if deviance < self.threshold * face_width {
            AttentionState::Focused
        } else {
            AttentionState::Distracted
        }
    }

    /// The most recently published state
    #[must_use]
    pub fn state(&self) -> AttentionState {
        *self.tx.borrow()
    }

    /// The configured deviance threshold
    #[must_use]
    pub const fn threshold(&self) -> f32 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::Point;

    // Ear positions picked so every derived quantity is exactly
    // representable: width 0.5, midpoint 0.5, threshold crossing at 0.125
    fn landmarks(nose_x: f32) -> FaceLandmarks {
        FaceLandmarks {
            nose: Point { x: nose_x, y: 0.5 },
            left_ear: Point { x: 0.75, y: 0.5 },
            right_ear: Point { x: 0.25, y: 0.5 },
        }
    }

    #[test]
    fn centered_nose_is_focused() {
        let (detector, _rx) = AttentionDetector::new(0.25);
        assert_eq!(
            detector.observe(Some(&landmarks(0.5))),
            AttentionState::Focused
        );
    }

    #[test]
    fn deviant_nose_is_distracted() {
        let (detector, _rx) = AttentionDetector::new(0.25);
        // Deviance 0.3125, far past the 0.125 crossing
        assert_eq!(
            detector.observe(Some(&landmarks(0.8125))),
            AttentionState::Distracted
        );
    }

    #[test]
    fn exact_threshold_boundary_is_distracted() {
        let (detector, _rx) = AttentionDetector::new(0.25);
        // deviance == 0.25 * face_width (0.125 == 0.25 * 0.5)
        assert_eq!(
            detector.observe(Some(&landmarks(0.625))),
            AttentionState::Distracted
        );
    }

    #[test]
    fn just_inside_threshold_is_focused() {
        let (detector, _rx) = AttentionDetector::new(0.25);
        // Deviance 0.0625 < 0.125
        assert_eq!(
            detector.observe(Some(&landmarks(0.5625))),
            AttentionState::Focused
        );
    }

    #[test]
    fn no_face_is_distracted() {
        let (detector, _rx) = AttentionDetector::new(0.25);
        assert_eq!(detector.observe(None), AttentionState::Distracted);
    }

    #[test]
    fn zero_face_width_is_distracted() {
        let (detector, _rx) = AttentionDetector::new(0.25);
        let degenerate = FaceLandmarks {
            nose: Point { x: 0.5, y: 0.5 },
            left_ear: Point { x: 0.5, y: 0.5 },
            right_ear: Point { x: 0.5, y: 0.5 },
        };
        assert_eq!(
            detector.observe(Some(&degenerate)),
            AttentionState::Distracted
        );
    }

    #[test]
    fn wider_threshold_admits_more_deviance() {
        let (detector, _rx) = AttentionDetector::new(0.30);
        // Deviance 0.140625: Distracted at threshold 0.25, Focused at 0.30
        assert_eq!(
            detector.observe(Some(&landmarks(0.640625))),
            AttentionState::Focused
        );
    }

    #[test]
    fn watch_channel_tracks_latest_state() {
        let (detector, rx) = AttentionDetector::new(0.25);
        assert_eq!(*rx.borrow(), AttentionState::Initializing);

        detector.observe(Some(&landmarks(0.5)));
        assert_eq!(*rx.borrow(), AttentionState::Focused);
        assert_eq!(detector.state(), AttentionState::Focused);

        detector.observe(None);
        assert_eq!(*rx.borrow(), AttentionState::Distracted);
    }

    #[test]
    fn pin_focused_overrides_state() {
        let (detector, rx) = AttentionDetector::new(0.25);
        detector.pin_focused();
        assert_eq!(*rx.borrow(), AttentionState::Focused);
    }
}
