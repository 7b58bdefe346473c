//! Per-turn transcript aggregation
//!
//! Accumulates partial transcripts for the in-progress exchange, mirrors
//! them to a UI caption channel, and emits one completed (user, model) pair
//! per turn that had content. An interruption discards the model side
//! without emitting: the model was cut off, the user's utterance stands.

use tokio::sync::watch;

/// Live caption state mirrored to the UI
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caption {
    /// What the user has said so far this turn
    pub user: String,
    /// What the model has said so far this turn
    pub model: String,
}

/// A completed exchange ready for the chat log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedTurn {
    pub user: String,
    pub model: String,
}

/// Accumulates transcript deltas for the current turn
pub struct TurnAggregator {
    user: String,
    model: String,
    caption_tx: watch::Sender<Caption>,
}

impl TurnAggregator {
    /// Create an aggregator and the read side of its caption channel
    #[must_use]
    pub fn new() -> (Self, watch::Receiver<Caption>) {
        let (caption_tx, caption_rx) = watch::channel(Caption::default());
        (
            Self {
                user: String::new(),
                model: String::new(),
                caption_tx,
            },
            caption_rx,
        )
    }

    /// Append an input-transcription delta (arrival order)
    pub fn push_user(&mut self, delta: &str) {
        self.user.push_str(delta);
        self.mirror();
    }

    /// Append an output-transcription delta (arrival order)
    pub fn push_model(&mut self, delta: &str) {
        self.model.push_str(delta);
        self.mirror();
    }

    /// Complete the turn
    ///
    /// Returns the pair to append to the chat log, or `None` when both
    /// buffers are empty. Empty turns emit nothing, so repeated
    /// turn-complete events cannot produce duplicates. Buffers reset either
    /// way; the caption is left showing the final line until
    /// [`Self::clear_caption`].
    pub fn complete(&mut self) -> Option<CompletedTurn> {
        if self.user.is_empty() && self.model.is_empty() {
            return None;
        }

        let turn = CompletedTurn {
            user: std::mem::take(&mut self.user),
            model: std::mem::take(&mut self.model),
        };
        tracing::debug!(
            user_len = turn.user.len(),
            model_len = turn.model.len(),
            "turn completed"
        );
        Some(turn)
    }

    /// Interruption: discard the model buffer without emitting
    ///
    /// The user buffer is preserved for the eventual turn completion.
    pub fn interrupt(&mut self) {
        self.model.clear();
        self.mirror();
    }

    /// Clear the UI caption (called after the post-turn display delay)
    pub fn clear_caption(&self) {
        self.caption_tx.send_replace(Caption::default());
    }

    /// Whether both buffers are empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.user.is_empty() && self.model.is_empty()
    }

    fn mirror(&self) {
        self.caption_tx.send_replace(Caption {
            user: self.user.clone(),
            model: self.model.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deltas_append_in_arrival_order() {
        let (mut turns, rx) = TurnAggregator::new();
        turns.push_user("what ");
        turns.push_user("is this");
        turns.push_model("It looks ");
        turns.push_model("like a guitar.");

        let caption = rx.borrow().clone();
        assert_eq!(caption.user, "what is this");
        assert_eq!(caption.model, "It looks like a guitar.");
    }

    #[test]
    fn complete_emits_once_then_resets() {
        let (mut turns, _rx) = TurnAggregator::new();
        turns.push_user("hello");
        turns.push_model("hi there");

        let turn = turns.complete().unwrap();
        assert_eq!(turn.user, "hello");
        assert_eq!(turn.model, "hi there");
        assert!(turns.is_empty());

        // Second completion with nothing accumulated emits nothing
        assert!(turns.complete().is_none());
    }

    #[test]
    fn empty_turns_emit_nothing() {
        let (mut turns, _rx) = TurnAggregator::new();
        assert!(turns.complete().is_none());
        assert!(turns.complete().is_none());
    }

    #[test]
    fn one_sided_turn_still_emits() {
        let (mut turns, _rx) = TurnAggregator::new();
        turns.push_model("unprompted remark");

        let turn = turns.complete().unwrap();
        assert_eq!(turn.user, "");
        assert_eq!(turn.model, "unprompted remark");
    }

    #[test]
    fn interruption_discards_model_keeps_user() {
        let (mut turns, rx) = TurnAggregator::new();
        turns.push_user("wait, actually");
        turns.push_model("The answer is forty");
        turns.interrupt();

        let caption = rx.borrow().clone();
        assert_eq!(caption.user, "wait, actually");
        assert_eq!(caption.model, "");

        let turn = turns.complete().unwrap();
        assert_eq!(turn.user, "wait, actually");
        assert_eq!(turn.model, "");
    }

    #[test]
    fn caption_clears_on_request() {
        let (mut turns, rx) = TurnAggregator::new();
        turns.push_user("hello");
        let _ = turns.complete();

        // Final line remains visible until the delayed clear
        assert_eq!(rx.borrow().user, "hello");
        turns.clear_caption();
        assert_eq!(*rx.borrow(), Caption::default());
    }
}
