//! Live pipeline wiring
//!
//! Every event source (microphone blocks, camera frames, the snapshot
//! timer, server events) is a producer pushing into one internal channel,
//! consumed by a single logical loop. Producers and deferred completions are
//! gated on one cancellation token, so a completion arriving after teardown
//! has begun performs no further work.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::audio::{AudioChunk, MicCapture, CAPTURE_SAMPLE_RATE};
use crate::chat::{ChatLog, ChatTurn};
use crate::config::Config;
use crate::playback::{AudioClock, PlaybackScheduler, PlaybackSink};
use crate::session::{
    decode, ServerEvent, SetupMessage, StreamingSession, TransportRx, TransportTx,
};
use crate::turn::{Caption, TurnAggregator};
use crate::vision::{AttentionDetector, AttentionState, CameraLoop, FrameSource, LandmarkDetector};
use crate::{Error, Result};

/// Capacity of the internal event channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Future yielded by a transport connector
pub type ConnectFuture<R> = std::pin::Pin<
    Box<dyn std::future::Future<Output = Result<(Box<dyn TransportTx>, R)>> + Send>,
>;

/// Pipeline status surfaced to the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// Media is flowing
    Live,
    /// The remote session failed or dropped; no automatic reconnect
    ConnectionLost(String),
    /// Torn down by request
    Closed,
}

/// One unit of work for the consumer loop
#[derive(Debug)]
pub enum PipelineEvent {
    /// A full block of microphone samples at the capture rate
    MicBlock(Vec<f32>),
    /// An encoded JPEG scene snapshot
    Snapshot(Vec<u8>),
    /// A decoded server event
    Server(ServerEvent),
    /// The server side of the channel is gone
    ServerClosed(Option<String>),
    /// The post-turn caption hold elapsed
    CaptionExpired,
}

/// Read side of the pipeline for a UI
pub struct PipelineHandles {
    /// Latest attention classification
    pub attention: watch::Receiver<AttentionState>,
    /// Live caption for the in-progress turn
    pub caption: watch::Receiver<Caption>,
    /// Microphone RMS level
    pub meter: watch::Receiver<f32>,
    /// Pipeline lifecycle status
    pub status: watch::Receiver<Status>,
    /// Cancelling this token tears the pipeline down
    pub cancel: CancellationToken,
}

/// The live pipeline, from device acquisition to teardown
pub struct LivePipeline {
    session: StreamingSession,
    scheduler: PlaybackScheduler,
    turns: TurnAggregator,
    chat: Arc<dyn ChatLog>,
    mic: Option<MicCapture>,
    events: mpsc::Receiver<PipelineEvent>,
    loopback: mpsc::Sender<PipelineEvent>,
    status_tx: watch::Sender<Status>,
    cancel: CancellationToken,
    caption_hold: Duration,
}

impl LivePipeline {
    /// Acquire the default devices, connect the remote endpoint, and
    /// assemble the pipeline
    ///
    /// Media acquisition runs first: a denied or missing device aborts
    /// before any connect is attempted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MediaAccess`] when the microphone cannot be
    /// acquired, [`Error::Audio`] when the output device cannot be opened,
    /// and [`Error::Connection`] when the remote endpoint fails.
    pub async fn start(
        config: &Config,
        camera: Box<dyn FrameSource>,
        landmarker: Option<Box<dyn LandmarkDetector>>,
        chat: Arc<dyn ChatLog>,
    ) -> Result<(Self, PipelineHandles)> {
        let output = crate::playback::AudioOutput::new()?;

        let endpoint = config.endpoint.clone();
        let live = config.live.clone();
        let block_size = config.audio.block_size;
        Self::assemble(
            config,
            move |events, cancel| {
                Ok(Some(MicCapture::start_with_block_size(block_size, move |block| {
                    if cancel.is_cancelled() {
                        return;
                    }
                    if events.try_send(PipelineEvent::MicBlock(block)).is_err() {
                        tracing::trace!("event channel full, mic block dropped");
                    }
                })?))
            },
            camera,
            landmarker,
            move || -> ConnectFuture<crate::session::WsRx> {
                Box::pin(async move {
                    let (tx, rx) = crate::session::ws_connect(&endpoint).await?;
                    Ok((Box::new(tx) as Box<dyn TransportTx>, rx))
                })
            },
            &SetupMessage::new(&live),
            output,
            crate::playback::SystemClock::new(),
            chat,
        )
        .await
    }

    /// Assemble the pipeline over explicit collaborators
    ///
    /// [`Self::start`] acquires real devices and the websocket endpoint and
    /// delegates here; embedders can wire their own transports, sinks, and
    /// clocks. The microphone factory runs before the transport connects so
    /// media failures prevent the connect.
    ///
    /// # Errors
    ///
    /// Propagates microphone acquisition and connect failures.
    #[allow(clippy::too_many_arguments)]
    pub async fn assemble<R, F, C, S, K>(
        config: &Config,
        mic_factory: F,
        camera: Box<dyn FrameSource>,
        landmarker: Option<Box<dyn LandmarkDetector>>,
        connect: C,
        setup: &SetupMessage,
        sink: S,
        clock: K,
        chat: Arc<dyn ChatLog>,
    ) -> Result<(Self, PipelineHandles)>
    where
        R: TransportRx + 'static,
        F: FnOnce(mpsc::Sender<PipelineEvent>, CancellationToken) -> Result<Option<MicCapture>>,
        C: FnOnce() -> ConnectFuture<R>,
        S: PlaybackSink,
        K: AudioClock,
    {
        let cancel = CancellationToken::new();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        // Media first
        let mic = mic_factory(event_tx.clone(), cancel.clone())?;
        let meter = mic
            .as_ref()
            .map_or_else(|| watch::channel(0.0).1, MicCapture::meter);

        let (attention, attention_rx) = AttentionDetector::new(config.attention.threshold);
        let camera_loop = CameraLoop::new(
            camera,
            landmarker,
            attention,
            config.snapshot.interval,
            config.snapshot.jpeg_quality,
        );
        tokio::spawn(camera_loop.run(event_tx.clone(), cancel.child_token()));

        // Connect only once media acquisition has succeeded
        let (transport_tx, transport_rx) = connect().await?;
        let mut session = StreamingSession::new(attention_rx.clone());
        session.connect(transport_tx, setup).await?;

        tokio::spawn(pump_server_events(
            transport_rx,
            event_tx.clone(),
            cancel.child_token(),
        ));

        let scheduler = PlaybackScheduler::spawn(clock, sink, cancel.child_token());
        let (turns, caption_rx) = TurnAggregator::new();
        let (status_tx, status_rx) = watch::channel(Status::Live);

        let handles = PipelineHandles {
            attention: attention_rx,
            caption: caption_rx,
            meter,
            status: status_rx,
            cancel: cancel.clone(),
        };

        Ok((
            Self {
                session,
                scheduler,
                turns,
                chat,
                mic,
                events: event_rx,
                loopback: event_tx,
                status_tx,
                cancel,
                caption_hold: config.caption_hold,
            },
            handles,
        ))
    }

    /// Drive the consumer loop until cancelled or the server goes away,
    /// then tear down
    pub async fn run(mut self) {
        loop {
            let event = tokio::select! {
                () = self.cancel.cancelled() => break,
                event = self.events.recv() => event,
            };
            let Some(event) = event else { break };
            self.handle(event).await;
        }
        self.shutdown().await;
    }

    /// Tear the pipeline down
    ///
    /// Cancels every producer (snapshot timer, frame loop, event pump,
    /// playback drain), releases the microphone, and closes the session.
    /// Idempotent: repeated calls are no-ops.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(mic) = self.mic.as_mut() {
            mic.stop();
        }
        self.session.close().await;

        let closed = self.status_tx.send_if_modified(|status| {
            if *status == Status::Live {
                *status = Status::Closed;
                true
            } else {
                false
            }
        });
        if closed {
            tracing::info!("live pipeline stopped");
        }
    }

    async fn handle(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::MicBlock(samples) => {
                let chunk = AudioChunk::new(samples, CAPTURE_SAMPLE_RATE);
                match self.session.send_audio(&chunk).await {
                    // A block arriving after close is stale, not fatal
                    Ok(_) | Err(Error::SessionState(_)) => {}
                    Err(e) => self.fail(&e),
                }
            }
            PipelineEvent::Snapshot(jpeg) => match self.session.send_snapshot(&jpeg).await {
                Ok(()) | Err(Error::SessionState(_)) => {}
                Err(e) => self.fail(&e),
            },
            PipelineEvent::Server(event) => self.handle_server_event(event).await,
            PipelineEvent::ServerClosed(error) => {
                match error {
                    Some(message) => self.fail(&Error::Connection(message)),
                    None => {
                        tracing::info!("server closed the session");
                        self.cancel.cancel();
                    }
                }
            }
            PipelineEvent::CaptionExpired => self.turns.clear_caption(),
        }
    }

    async fn handle_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Audio(chunk) => self.scheduler.enqueue(chunk),
            ServerEvent::OutputTranscript(delta) => self.turns.push_model(&delta),
            ServerEvent::InputTranscript(delta) => self.turns.push_user(&delta),
            ServerEvent::TurnComplete => {
                if let Some(turn) = self.turns.complete() {
                    self.chat.append_turn(ChatTurn::new(turn)).await;
                }
                self.hold_caption();
            }
            ServerEvent::Interrupted => {
                tracing::debug!("barge-in, flushing playback");
                self.scheduler.flush();
                self.turns.interrupt();
            }
            ServerEvent::Ignored => {}
        }
    }

    /// Keep the final caption visible briefly, then clear it
    fn hold_caption(&self) {
        let loopback = self.loopback.clone();
        let guard = self.cancel.clone();
        let hold = self.caption_hold;
        tokio::spawn(async move {
            tokio::select! {
                () = guard.cancelled() => {}
                () = tokio::time::sleep(hold) => {
                    let _ = loopback.send(PipelineEvent::CaptionExpired).await;
                }
            }
        });
    }

    fn fail(&self, error: &Error) {
        tracing::error!(error = %error, "pipeline failure");
        self.status_tx
            .send_replace(Status::ConnectionLost(error.to_string()));
        self.cancel.cancel();
    }
}

/// Decode inbound frames into pipeline events until the channel ends
async fn pump_server_events<R: TransportRx>(
    mut rx: R,
    events: mpsc::Sender<PipelineEvent>,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => return,
            frame = rx.next_frame() => frame,
        };

        match frame {
            Some(Ok(text)) => {
                for event in decode(&text) {
                    if events.send(PipelineEvent::Server(event)).await.is_err() {
                        return;
                    }
                }
            }
            Some(Err(e)) => {
                let _ = events
                    .send(PipelineEvent::ServerClosed(Some(e.to_string())))
                    .await;
                return;
            }
            None => {
                let _ = events.send(PipelineEvent::ServerClosed(None)).await;
                return;
            }
        }
    }
}
