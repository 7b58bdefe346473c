//! Streaming session lifecycle and media gating
//!
//! Owns the outbound half of the remote bidirectional channel and the
//! attention gate. Capture runs continuously elsewhere; this is the single
//! point where audio captured while the user is not looking gets dropped,
//! a privacy/context policy rather than a performance optimization. Snapshots are
//! never gated: visual context is considered always relevant.

mod events;
mod wire;

pub use events::{decode, ServerEvent};
pub use wire::{RealtimeInputMessage, SetupMessage};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use secrecy::ExposeSecret as _;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::audio::{codec, AudioChunk};
use crate::config::EndpointConfig;
use crate::vision::AttentionState;
use crate::{Error, Result};

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not yet connected
    Idle,
    /// Setup in flight
    Connecting,
    /// Media may flow
    Open,
    /// Torn down, by request or error
    Closed,
}

/// Outbound half of the remote channel
#[async_trait]
pub trait TransportTx: Send {
    /// Send one JSON frame
    ///
    /// # Errors
    ///
    /// Returns an error when the channel is gone.
    async fn send(&mut self, frame: String) -> Result<()>;

    /// Close the channel; must tolerate repeated calls
    ///
    /// # Errors
    ///
    /// Returns an error when the close handshake fails.
    async fn close(&mut self) -> Result<()>;
}

/// Inbound half of the remote channel
#[async_trait]
pub trait TransportRx: Send {
    /// Next raw frame; `None` once the peer has closed
    async fn next_frame(&mut self) -> Option<Result<String>>;
}

/// The bidirectional remote interaction, from connect to teardown
///
/// Sole owner of the outbound transport; other components interact only
/// through the send/receive contract exposed here and by the event pump.
pub struct StreamingSession {
    transport: Option<Box<dyn TransportTx>>,
    state: SessionState,
    attention: watch::Receiver<AttentionState>,
}

impl StreamingSession {
    /// Create an idle session reading the given attention gate
    #[must_use]
    pub fn new(attention: watch::Receiver<AttentionState>) -> Self {
        Self {
            transport: None,
            state: SessionState::Idle,
            attention,
        }
    }

    /// Open the session: send setup over the transport
    ///
    /// Transitions Idle → Connecting → Open, or to Closed on failure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionState`] unless Idle, [`Error::Connection`]
    /// when the setup frame cannot be delivered.
    pub async fn connect(
        &mut self,
        mut transport: Box<dyn TransportTx>,
        setup: &SetupMessage,
    ) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(Error::SessionState(format!(
                "connect from {:?}",
                self.state
            )));
        }

        self.state = SessionState::Connecting;
        match transport.send(serde_json::to_string(setup)?).await {
            Ok(()) => {
                self.transport = Some(transport);
                self.state = SessionState::Open;
                tracing::info!("live session open");
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Closed;
                Err(Error::Connection(e.to_string()))
            }
        }
    }

    /// Transmit one captured audio block, subject to the attention gate
    ///
    /// Returns whether the block was actually transmitted. Audio captured
    /// while the latest attention state is not `Focused` is dropped, never
    /// buffered for a later send.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionState`] unless Open, [`Error::Connection`]
    /// when the send fails (the session then moves to Closed).
    pub async fn send_audio(&mut self, chunk: &AudioChunk) -> Result<bool> {
        if self.state != SessionState::Open {
            return Err(Error::SessionState(format!(
                "send_audio while {:?}",
                self.state
            )));
        }

        if *self.attention.borrow() != AttentionState::Focused {
            tracing::trace!(samples = chunk.samples().len(), "audio gated, dropped");
            return Ok(false);
        }

        let message = RealtimeInputMessage::audio(codec::encode_audio(chunk.samples()));
        self.send_frame(serde_json::to_string(&message)?).await?;
        Ok(true)
    }

    /// Transmit a scene snapshot; sent regardless of attention state
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionState`] unless Open, [`Error::Connection`]
    /// when the send fails.
    pub async fn send_snapshot(&mut self, jpeg: &[u8]) -> Result<()> {
        if self.state != SessionState::Open {
            return Err(Error::SessionState(format!(
                "send_snapshot while {:?}",
                self.state
            )));
        }

        let message = RealtimeInputMessage::snapshot(jpeg);
        self.send_frame(serde_json::to_string(&message)?).await
    }

    /// Close the session and release the remote handle
    ///
    /// Idempotent: closing an already-Closed session is a no-op.
    pub async fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                tracing::debug!(error = %e, "transport close failed");
            }
        }
        if self.state != SessionState::Closed {
            self.state = SessionState::Closed;
            tracing::info!("live session closed");
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    async fn send_frame(&mut self, frame: String) -> Result<()> {
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| Error::SessionState("no transport".to_string()))?;

        if let Err(e) = transport.send(frame).await {
            self.state = SessionState::Closed;
            self.transport = None;
            return Err(Error::Connection(e.to_string()));
        }
        Ok(())
    }
}

/// WebSocket transport halves
pub struct WsTx {
    sink: futures::stream::SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>,
}

/// Inbound websocket frames
pub struct WsRx {
    stream: futures::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
}

/// Open the websocket to the remote endpoint
///
/// The API key, when configured, travels as a query parameter.
///
/// # Errors
///
/// Returns [`Error::Connection`] when the URL is invalid or the websocket
/// handshake fails.
pub async fn ws_connect(endpoint: &EndpointConfig) -> Result<(WsTx, WsRx)> {
    let mut url =
        Url::parse(&endpoint.url).map_err(|e| Error::Connection(format!("bad endpoint: {e}")))?;

    if let Some(key) = &endpoint.api_key {
        url.query_pairs_mut().append_pair("key", key.expose_secret());
    }

    tracing::debug!(host = ?url.host_str(), "connecting live endpoint");

    let (socket, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| Error::Connection(e.to_string()))?;

    let (sink, stream) = socket.split();
    Ok((WsTx { sink }, WsRx { stream }))
}

#[async_trait]
impl TransportTx for WsTx {
    async fn send(&mut self, frame: String) -> Result<()> {
        self.sink.send(Message::Text(frame)).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.sink.close().await?;
        Ok(())
    }
}

#[async_trait]
impl TransportRx for WsRx {
    async fn next_frame(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Binary(bytes)) => {
                    // Some servers deliver JSON frames as binary
                    match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => return Some(Ok(text)),
                        Err(e) => {
                            tracing::debug!(error = %e, "non-utf8 binary frame dropped");
                        }
                    }
                }
                Ok(Message::Close(_)) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use crate::config::LiveConfig;

    #[derive(Default)]
    struct MockTx {
        sent: Arc<Mutex<Vec<String>>>,
        fail: bool,
        closed: Arc<Mutex<usize>>,
    }

    #[async_trait]
    impl TransportTx for MockTx {
        async fn send(&mut self, frame: String) -> Result<()> {
            if self.fail {
                return Err(Error::Connection("wire down".to_string()));
            }
            self.sent.lock().unwrap().push(frame);
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            *self.closed.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn setup_message() -> SetupMessage {
        SetupMessage::new(&LiveConfig::default())
    }

    async fn open_session() -> (
        StreamingSession,
        watch::Sender<AttentionState>,
        Arc<Mutex<Vec<String>>>,
    ) {
        let (attention_tx, attention_rx) = watch::channel(AttentionState::Initializing);
        let mut session = StreamingSession::new(attention_rx);

        let tx = MockTx::default();
        let sent = Arc::clone(&tx.sent);
        session
            .connect(Box::new(tx), &setup_message())
            .await
            .unwrap();
        (session, attention_tx, sent)
    }

    #[tokio::test]
    async fn connect_sends_setup_and_opens() {
        let (session, _attention, sent) = open_session().await;
        assert_eq!(session.state(), SessionState::Open);

        let frames = sent.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].contains("\"setup\""));
    }

    #[tokio::test]
    async fn connect_twice_is_a_state_error() {
        let (mut session, _attention, _sent) = open_session().await;
        let err = session
            .connect(Box::new(MockTx::default()), &setup_message())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SessionState(_)));
    }

    #[tokio::test]
    async fn connect_failure_reaches_closed() {
        let (_tx, attention_rx) = watch::channel(AttentionState::Focused);
        let mut session = StreamingSession::new(attention_rx);

        let transport = MockTx {
            fail: true,
            ..MockTx::default()
        };
        let err = session
            .connect(Box::new(transport), &setup_message())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn audio_transmits_iff_focused_in_order() {
        let (mut session, attention, sent) = open_session().await;
        let baseline = sent.lock().unwrap().len();

        // (state, marker sample) pairs; only Focused ones may go out
        let schedule = [
            (AttentionState::Focused, 0.1f32),
            (AttentionState::Distracted, 0.2),
            (AttentionState::Focused, 0.3),
            (AttentionState::Initializing, 0.4),
            (AttentionState::Distracted, 0.5),
            (AttentionState::Focused, 0.6),
        ];

        let mut expected = Vec::new();
        for (state, marker) in schedule {
            attention.send_replace(state);
            let chunk = AudioChunk::new(vec![marker; 4], 16000);
            let transmitted = session.send_audio(&chunk).await.unwrap();
            assert_eq!(transmitted, state == AttentionState::Focused);
            if transmitted {
                expected.push(codec::encode_audio(chunk.samples()));
            }
        }

        let frames = sent.lock().unwrap();
        let transmitted: Vec<_> = frames[baseline..].to_vec();
        assert_eq!(transmitted.len(), expected.len());
        for (frame, payload) in transmitted.iter().zip(&expected) {
            assert!(frame.contains(payload.as_str()));
        }
    }

    #[tokio::test]
    async fn snapshots_ignore_the_gate() {
        let (mut session, attention, sent) = open_session().await;
        attention.send_replace(AttentionState::Distracted);

        session.send_snapshot(&[0xFF, 0xD8, 0x01]).await.unwrap();

        let frames = sent.lock().unwrap();
        assert!(frames.last().unwrap().contains("image/jpeg"));
    }

    #[tokio::test]
    async fn send_before_connect_is_a_state_error() {
        let (_tx, attention_rx) = watch::channel(AttentionState::Focused);
        let mut session = StreamingSession::new(attention_rx);

        let chunk = AudioChunk::new(vec![0.0; 4], 16000);
        assert!(matches!(
            session.send_audio(&chunk).await,
            Err(Error::SessionState(_))
        ));
    }

    #[tokio::test]
    async fn send_failure_closes_the_session() {
        let (attention_tx, attention_rx) = watch::channel(AttentionState::Focused);
        let _keep = attention_tx;
        let mut session = StreamingSession::new(attention_rx);

        // Transport that accepts setup, then fails
        struct FlakyTx {
            sends: usize,
        }
        #[async_trait]
        impl TransportTx for FlakyTx {
            async fn send(&mut self, _frame: String) -> Result<()> {
                self.sends += 1;
                if self.sends > 1 {
                    return Err(Error::Connection("reset by peer".to_string()));
                }
                Ok(())
            }
            async fn close(&mut self) -> Result<()> {
                Ok(())
            }
        }

        session
            .connect(Box::new(FlakyTx { sends: 0 }), &setup_message())
            .await
            .unwrap();

        let chunk = AudioChunk::new(vec![0.0; 4], 16000);
        assert!(session.send_audio(&chunk).await.is_err());
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (mut session, _attention, _sent) = open_session().await;

        session.close().await;
        assert_eq!(session.state(), SessionState::Closed);
        session.close().await;
        assert_eq!(session.state(), SessionState::Closed);
    }
}
