//! Audio output to speakers
//!
//! A dedicated thread owns the cpal stream (cpal streams are not `Send`);
//! the handle shares a sample queue with the device callback, which pads
//! with silence when the queue runs dry. Sequential submission through the
//! queue is what makes scheduled playback gapless.

use std::collections::VecDeque;
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleRate;

use crate::audio::{codec, AudioChunk};
use crate::playback::PlaybackSink;
use crate::{Error, Result};

/// Sample rate for playback (matches the remote model's audio output)
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Plays submitted samples on the default output device
pub struct AudioOutput {
    queue: Arc<Mutex<VecDeque<f32>>>,
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl AudioOutput {
    /// Open the default output device at 24 kHz
    ///
    /// # Errors
    ///
    /// Returns [`Error::Audio`] if no output device exists or the stream
    /// cannot be opened.
    pub fn new() -> Result<Self> {
        let queue = Arc::new(Mutex::new(VecDeque::new()));
        let callback_queue = Arc::clone(&queue);

        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || run_output_stream(&callback_queue, &ready_tx, &stop_rx))
            .map_err(|e| Error::Audio(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(e) => return Err(Error::Audio(e.to_string())),
        }

        Ok(Self {
            queue,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    /// Stop playback and release the device
    ///
    /// Idempotent; safe to call after the stream is already gone.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
            tracing::debug!("audio output stopped");
        }
        if let Ok(mut queue) = self.queue.lock() {
            queue.clear();
        }
    }

    /// Samples queued but not yet consumed by the device
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

impl PlaybackSink for AudioOutput {
    fn submit(&mut self, _start: Duration, chunk: &AudioChunk) {
        let samples = if chunk.sample_rate() == PLAYBACK_SAMPLE_RATE {
            chunk.samples().to_vec()
        } else {
            codec::resample(chunk.samples(), chunk.sample_rate(), PLAYBACK_SAMPLE_RATE)
        };

        if let Ok(mut queue) = self.queue.lock() {
            queue.extend(samples);
        }
    }

    fn clear(&mut self) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.clear();
        }
    }
}

/// Build and hold the output stream until told to stop
fn run_output_stream(
    queue: &Arc<Mutex<VecDeque<f32>>>,
    ready_tx: &std_mpsc::Sender<Result<()>>,
    stop_rx: &std_mpsc::Receiver<()>,
) {
    let stream = match build_stream(Arc::clone(queue)) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(Error::Audio(e.to_string())));
        return;
    }

    let _ = ready_tx.send(Ok(()));

    // Hold the stream alive until stop is signalled or the handle is dropped
    let _ = stop_rx.recv();
    drop(stream);
}

fn build_stream(queue: Arc<Mutex<VecDeque<f32>>>) -> Result<cpal::Stream> {
    let host = cpal::default_host();

    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

    let supported = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
        })
        .or_else(|| {
            // Fallback: stereo
            device.supported_output_configs().ok()?.find(|c| {
                c.channels() == 2
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
        })
        .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

    let config = supported
        .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
        .config();
    let channels = config.channels as usize;

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate = PLAYBACK_SAMPLE_RATE,
        channels,
        "audio output initialized"
    );

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut queue = match queue.lock() {
                    Ok(queue) => queue,
                    Err(_) => return,
                };
                for frame in data.chunks_mut(channels) {
                    let sample = queue.pop_front().unwrap_or(0.0);
                    for out in frame.iter_mut() {
                        *out = sample;
                    }
                }
            },
            |err| {
                tracing::error!(error = %err, "audio output error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    Ok(stream)
}
