//! Gapless audio playback scheduling
//!
//! Decoded model audio arrives as discrete chunks; playback must be strictly
//! ordered with no gap and no overlap. A FIFO queue plus a monotonic
//! `next_start` cursor fixes when each chunk begins, and a drain task hands
//! scheduled samples to the output sink. Interruption flushes the pending
//! queue and resets the cursor to the current clock; a brief tail of
//! already-submitted audio may still sound.

mod output;

pub use output::{AudioOutput, PLAYBACK_SAMPLE_RATE};

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::audio::AudioChunk;

/// Clock the scheduler measures start times against
pub trait AudioClock: Send + 'static {
    /// Monotonic time since the clock's epoch
    fn now(&self) -> Duration;
}

/// Wall clock backed by [`Instant`]
#[derive(Debug)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioClock for SystemClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }
}

/// Where scheduled samples go once their start time is fixed
pub trait PlaybackSink: Send + 'static {
    /// Accept samples whose playback begins at `start` on the scheduler's
    /// clock; submissions arrive in start-time order
    fn submit(&mut self, start: Duration, chunk: &AudioChunk);

    /// Drop any submitted-but-unplayed samples
    fn clear(&mut self);
}

/// Pending chunks plus the monotonic start-time cursor
///
/// Invariants: chunk start times never overlap and never decrease, and the
/// cursor never trails the clock value passed in.
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    pending: VecDeque<AudioChunk>,
    next_start: Duration,
}

impl PlaybackQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk to the pending queue
    pub fn enqueue(&mut self, chunk: AudioChunk) {
        self.pending.push_back(chunk);
    }

    /// Pop the head chunk and fix its start time against `now`
    ///
    /// The start is `max(now, next_start)`, so nothing begins in the past
    /// and nothing overlaps the previous chunk; the cursor advances by the
    /// chunk's duration.
    pub fn pop_scheduled(&mut self, now: Duration) -> Option<(Duration, AudioChunk)> {
        let chunk = self.pending.pop_front()?;
        let start = self.next_start.max(now);
        self.next_start = start + chunk.duration();
        Some((start, chunk))
    }

    /// Drop all pending chunks and reset the cursor to `now`
    pub fn flush(&mut self, now: Duration) {
        self.pending.clear();
        self.next_start = now;
    }

    /// Number of pending chunks
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether the queue holds no pending chunks
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Where the next chunk would start, absent a later clock
    #[must_use]
    pub const fn next_start(&self) -> Duration {
        self.next_start
    }
}

enum Command {
    Enqueue(AudioChunk),
    Flush,
}

/// Handle to the playback drain task
///
/// The queue and cursor are owned by the task alone; this handle only sends
/// commands, so enqueue/flush never block on the audio path.
#[derive(Clone)]
pub struct PlaybackScheduler {
    tx: mpsc::UnboundedSender<Command>,
}

impl PlaybackScheduler {
    /// Spawn the drain task over the given clock and sink
    ///
    /// The cursor is seeded from the clock's current time. The task exits
    /// when the token is cancelled or the handle is dropped.
    pub fn spawn<C, S>(clock: C, sink: S, cancel: CancellationToken) -> Self
    where
        C: AudioClock,
        S: PlaybackSink,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(drain_loop(clock, sink, rx, cancel));
        Self { tx }
    }

    /// Queue a decoded chunk for gapless playback
    pub fn enqueue(&self, chunk: AudioChunk) {
        if self.tx.send(Command::Enqueue(chunk)).is_err() {
            tracing::debug!("playback task gone, chunk dropped");
        }
    }

    /// Interruption: drop pending chunks and reset the cursor
    pub fn flush(&self) {
        if self.tx.send(Command::Flush).is_err() {
            tracing::debug!("playback task gone, flush ignored");
        }
    }
}

async fn drain_loop<C: AudioClock, S: PlaybackSink>(
    clock: C,
    mut sink: S,
    mut rx: mpsc::UnboundedReceiver<Command>,
    cancel: CancellationToken,
) {
    let mut queue = PlaybackQueue::new();
    queue.flush(clock.now());

    loop {
        // Pending commands drain before cancellation is observed, so a
        // flush sent just before teardown still lands
        let command = tokio::select! {
            biased;
            cmd = rx.recv() => cmd,
            () = cancel.cancelled() => {
                tracing::debug!("playback scheduler shutting down");
                sink.clear();
                return;
            }
        };

        match command {
            Some(Command::Enqueue(chunk)) => {
                queue.enqueue(chunk);
                while let Some((start, chunk)) = queue.pop_scheduled(clock.now()) {
                    sink.submit(start, &chunk);
                }
            }
            Some(Command::Flush) => {
                queue.flush(clock.now());
                sink.clear();
            }
            None => {
                sink.clear();
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_ms(ms: u64) -> AudioChunk {
        // 1 kHz rate makes one sample one millisecond
        #[allow(clippy::cast_possible_truncation)]
        AudioChunk::new(vec![0.0; ms as usize], 1000)
    }

    #[test]
    fn playback_order_is_fifo_and_gapless() {
        let mut queue = PlaybackQueue::new();
        let now = Duration::from_millis(10);
        queue.flush(now);

        queue.enqueue(chunk_ms(100));
        queue.enqueue(chunk_ms(50));
        queue.enqueue(chunk_ms(200));

        let (start_a, a) = queue.pop_scheduled(now).unwrap();
        let (start_b, b) = queue.pop_scheduled(now).unwrap();
        let (start_c, c) = queue.pop_scheduled(now).unwrap();

        assert_eq!(start_a, now);
        assert_eq!(start_b, start_a + a.duration());
        assert_eq!(start_c, start_b + b.duration());
        assert_eq!(c.duration(), Duration::from_millis(200));
        assert!(queue.is_empty());
    }

    #[test]
    fn chunks_never_start_in_the_past() {
        let mut queue = PlaybackQueue::new();
        queue.flush(Duration::from_millis(0));

        queue.enqueue(chunk_ms(10));
        let (start, _) = queue.pop_scheduled(Duration::from_millis(500)).unwrap();
        assert_eq!(start, Duration::from_millis(500));
    }

    #[test]
    fn clock_behind_cursor_keeps_schedule() {
        let mut queue = PlaybackQueue::new();
        queue.flush(Duration::from_millis(0));

        queue.enqueue(chunk_ms(100));
        queue.enqueue(chunk_ms(100));
        let (first, _) = queue.pop_scheduled(Duration::from_millis(0)).unwrap();
        // Second chunk popped while the first is still playing
        let (second, _) = queue.pop_scheduled(Duration::from_millis(30)).unwrap();
        assert_eq!(first, Duration::ZERO);
        assert_eq!(second, Duration::from_millis(100));
    }

    #[test]
    fn flush_clears_queue_and_resets_cursor() {
        let mut queue = PlaybackQueue::new();
        queue.flush(Duration::from_millis(0));

        queue.enqueue(chunk_ms(100));
        queue.enqueue(chunk_ms(50));
        queue.enqueue(chunk_ms(200));
        let _ = queue.pop_scheduled(Duration::from_millis(0));

        let flush_time = Duration::from_millis(40);
        queue.flush(flush_time);

        assert!(queue.is_empty());
        assert_eq!(queue.next_start(), flush_time);

        // The next chunk starts no earlier than the flush-time clock
        queue.enqueue(chunk_ms(10));
        let (start, _) = queue.pop_scheduled(flush_time).unwrap();
        assert_eq!(start, flush_time);
    }

    #[test]
    fn empty_queue_pops_nothing() {
        let mut queue = PlaybackQueue::new();
        assert!(queue.pop_scheduled(Duration::ZERO).is_none());
        assert_eq!(queue.len(), 0);
    }
}
