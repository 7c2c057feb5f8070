//! Session lifecycle controller.
//!
//! `RealtimeClient` owns everything a live session needs: the transport
//! handles, the protocol engine, the capture gate and the activity indicator.
//! All mutation happens through `&mut self`, so handlers never share state
//! implicitly.
//!
//! Connection sequence:
//!
//! ```text
//! acquire credential -> capture microphone -> create peer -> attach tracks
//!   -> open data channel -> create offer -> negotiate -> apply answer
//!   -> (channel open) -> session.update
//! ```
//!
//! Any failing step releases what was acquired so far and reports one error.
//! Every await is tied to a session generation: `disconnect` or an
//! [`AbortHandle`] invalidates it, in-flight requests are cancelled and late
//! results are discarded.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::base::{ConnectionState, DisplaySink, RealtimeError, RealtimeResult};
use super::config::SessionOptions;
use super::conversation::Conversation;
use super::engine::{EngineStats, ProtocolEngine};
use super::negotiation::Negotiator;
use super::token::TokenService;
use super::transport::{
    DataChannel, LocalMediaStream, MediaDevices, PeerConnection, PeerConnectionState,
    PeerConnector, PeerHandle, TransportError, TransportEvent,
};
use crate::core::audio::{ActivityIndicator, AudioCapture, CaptureStats, is_valid_frame_size};

/// External services a client depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub token_service: Arc<dyn TokenService>,
    pub negotiator: Arc<dyn Negotiator>,
    pub media: Arc<dyn MediaDevices>,
    pub connector: Arc<dyn PeerConnector>,
    pub display: Arc<dyn DisplaySink>,
}

// =============================================================================
// Liveness
// =============================================================================

struct Liveness {
    generation: AtomicU64,
    cancel: Mutex<CancellationToken>,
}

impl Liveness {
    fn new() -> Self {
        Self {
            generation: AtomicU64::new(0),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Start a new generation, cancelling the previous one.
    fn begin(self: &Arc<Self>) -> LivenessToken {
        let mut cancel = self.cancel.lock();
        cancel.cancel();
        *cancel = CancellationToken::new();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        LivenessToken {
            liveness: self.clone(),
            generation,
            cancel: cancel.clone(),
        }
    }

    fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cancel.lock().cancel();
    }

    fn cancellation(&self) -> CancellationToken {
        self.cancel.lock().clone()
    }
}

/// Ties a connection attempt to the generation that started it.
struct LivenessToken {
    liveness: Arc<Liveness>,
    generation: u64,
    cancel: CancellationToken,
}

impl LivenessToken {
    fn is_live(&self) -> bool {
        !self.cancel.is_cancelled()
            && self.liveness.generation.load(Ordering::SeqCst) == self.generation
    }

    fn check(&self) -> RealtimeResult<()> {
        if self.is_live() {
            Ok(())
        } else {
            Err(RealtimeError::Cancelled)
        }
    }

    /// Await `fut` unless the generation is cancelled first.
    async fn run<T>(&self, fut: impl Future<Output = RealtimeResult<T>>) -> RealtimeResult<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(RealtimeError::Cancelled),
            result = fut => result,
        }
    }
}

/// Cancels the current connection attempt or live session from anywhere.
#[derive(Clone)]
pub struct AbortHandle {
    liveness: Arc<Liveness>,
}

impl AbortHandle {
    pub fn abort(&self) {
        debug!("Abort requested");
        self.liveness.invalidate();
    }
}

async fn with_timeout<T>(
    limit: Option<Duration>,
    what: &str,
    fut: impl Future<Output = RealtimeResult<T>>,
) -> RealtimeResult<T> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| RealtimeError::Timeout(format!("{what} exceeded {limit:?}")))?,
        None => fut.await,
    }
}

fn transport_failed(e: TransportError) -> RealtimeError {
    RealtimeError::TransportFailed(e.0)
}

// =============================================================================
// Session
// =============================================================================

/// Transport handles of one session. Released on drop.
#[derive(Default)]
struct Session {
    media: Option<Arc<dyn LocalMediaStream>>,
    peer: Option<Arc<dyn PeerConnection>>,
    channel: Option<Arc<dyn DataChannel>>,
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
}

impl Session {
    fn release(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.close();
        }
        if let Some(peer) = self.peer.take() {
            peer.close();
        }
        if let Some(media) = self.media.take() {
            media.stop();
        }
        if let Some(mut events) = self.events.take() {
            events.close();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release();
    }
}

// =============================================================================
// Client
// =============================================================================

/// Realtime voice session client.
pub struct RealtimeClient {
    options: SessionOptions,
    collaborators: Collaborators,
    liveness: Arc<Liveness>,
    session: Option<Session>,
    engine: ProtocolEngine,
    capture: AudioCapture,
    indicator: ActivityIndicator,
    state: ConnectionState,
    muted: bool,
}

impl RealtimeClient {
    pub fn new(options: SessionOptions, collaborators: Collaborators) -> RealtimeResult<Self> {
        if !is_valid_frame_size(options.frame_size) {
            return Err(RealtimeError::InvalidConfiguration(format!(
                "Frame size {} must be a power of two between 256 and 16384",
                options.frame_size
            )));
        }
        if options.data_channel_label.is_empty() {
            return Err(RealtimeError::InvalidConfiguration(
                "Data channel label must not be empty".to_string(),
            ));
        }

        let display = collaborators.display.clone();
        let indicator = ActivityIndicator::new(display.clone(), options.activity_hold);
        let engine = ProtocolEngine::new(display, indicator.clone());
        let capture = AudioCapture::new(options.frame_size, options.activity_threshold);

        Ok(Self {
            options,
            collaborators,
            liveness: Arc::new(Liveness::new()),
            session: None,
            engine,
            capture,
            indicator,
            state: ConnectionState::Disconnected,
            muted: false,
        })
    }

    // ===== Lifecycle =====

    /// Run the full connection sequence.
    ///
    /// A live session is torn down first. On failure every resource acquired
    /// by this attempt is released before the error is returned.
    pub async fn connect(&mut self) -> RealtimeResult<()> {
        if self.session.is_some() {
            self.disconnect();
        }

        self.state = ConnectionState::Connecting;
        let token = self.liveness.begin();
        info!(
            "Connecting realtime session (model={}, voice={})",
            self.options.model, self.options.voice
        );

        match self.establish(&token).await {
            Ok(session) => {
                self.session = Some(session);
                self.state = ConnectionState::Connected;
                info!("Realtime session connected");
                Ok(())
            }
            Err(e) => {
                self.engine.detach();
                self.capture.reset();
                self.indicator.reset();
                self.state = match e {
                    RealtimeError::Cancelled => ConnectionState::Disconnected,
                    _ => ConnectionState::Failed,
                };
                match e {
                    RealtimeError::Cancelled => info!("Connection attempt cancelled"),
                    _ => error!("Connection attempt failed: {}", e),
                }
                Err(e)
            }
        }
    }

    async fn establish(&mut self, token: &LivenessToken) -> RealtimeResult<Session> {
        let Collaborators {
            token_service,
            negotiator,
            media,
            connector,
            ..
        } = self.collaborators.clone();
        let model = self.options.model;
        let mut session = Session::default();

        let credential = token
            .run(token_service.acquire(model, self.options.voice))
            .await?;
        token.check()?;
        credential.validate()?;

        let stream: Arc<dyn LocalMediaStream> = token
            .run(async {
                media
                    .capture_microphone(&self.options.audio_constraints)
                    .await
                    .map(Arc::from)
                    .map_err(|e| RealtimeError::MediaAcquisitionFailed(e.0))
            })
            .await?;
        session.media = Some(stream.clone());
        token.check()?;
        stream.set_enabled(!self.muted);
        debug!("Microphone captured");

        let PeerHandle { connection, events } = token
            .run(async {
                connector
                    .create_peer(&self.options.ice_servers)
                    .await
                    .map_err(transport_failed)
            })
            .await?;
        let peer: Arc<dyn PeerConnection> = Arc::from(connection);
        session.peer = Some(peer.clone());
        session.events = Some(events);
        token.check()?;

        token
            .run(async {
                peer.add_local_stream(stream.as_ref())
                    .await
                    .map_err(transport_failed)
            })
            .await?;
        token.check()?;

        let channel = token
            .run(async {
                peer.create_data_channel(&self.options.data_channel_label)
                    .await
                    .map_err(transport_failed)
            })
            .await?;
        session.channel = Some(channel.clone());
        token.check()?;
        self.engine.attach(channel);

        let offer = token
            .run(async { peer.create_offer().await.map_err(transport_failed) })
            .await?;
        token.check()?;
        token
            .run(async {
                peer.set_local_description(offer.clone())
                    .await
                    .map_err(transport_failed)
            })
            .await?;
        token.check()?;

        debug!("Negotiating session");
        let answer = token
            .run(with_timeout(
                self.options.negotiation_timeout,
                "negotiation",
                negotiator.negotiate(&offer, &credential, model),
            ))
            .await?;
        token.check()?;
        drop(credential);

        token
            .run(async {
                peer.set_remote_description(answer)
                    .await
                    .map_err(transport_failed)
            })
            .await?;
        token.check()?;

        self.await_channel_open(token, &mut session).await?;
        token.check()?;
        self.engine.on_channel_open(&self.options);
        Ok(session)
    }

    /// Handle transport events until the data channel opens.
    async fn await_channel_open(
        &mut self,
        token: &LivenessToken,
        session: &mut Session,
    ) -> RealtimeResult<()> {
        let Some(events) = session.events.as_mut() else {
            return Err(RealtimeError::TransportFailed(
                "Transport event stream missing".to_string(),
            ));
        };
        let limit = self.options.channel_open_timeout;

        let wait = async {
            loop {
                match events.recv().await {
                    Some(TransportEvent::ChannelOpen) => return Ok(()),
                    Some(TransportEvent::ChannelClosed) => {
                        return Err(RealtimeError::TransportFailed(
                            "Data channel closed before opening".to_string(),
                        ));
                    }
                    Some(TransportEvent::ConnectionStateChanged(
                        state @ (PeerConnectionState::Failed | PeerConnectionState::Closed),
                    )) => {
                        return Err(RealtimeError::TransportFailed(format!(
                            "Peer connection {state:?} before data channel opened"
                        )));
                    }
                    Some(other) => self.apply_event(other),
                    None => {
                        return Err(RealtimeError::TransportFailed(
                            "Transport event stream ended".to_string(),
                        ));
                    }
                }
            }
        };

        token
            .run(with_timeout(limit, "data channel open", wait))
            .await
    }

    /// Tear the session down. Safe to call in any state, any number of times.
    pub fn disconnect(&mut self) {
        self.liveness.invalidate();

        let had_session = self.session.is_some();
        if let Some(mut session) = self.session.take() {
            session.release();
        }
        self.engine.detach();
        self.capture.reset();

        let was_shown = self.indicator.is_shown();
        self.indicator.reset();
        self.state = ConnectionState::Disconnected;
        self.muted = false;

        if had_session {
            if was_shown {
                self.collaborators.display.on_activity(false);
            }
            self.collaborators.display.on_connection_state(false);
            info!("Realtime session disconnected");
        }
    }

    /// Handle to cancel this client's connection attempt or session.
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            liveness: self.liveness.clone(),
        }
    }

    // ===== Event loop =====

    /// Wait for the next transport event and handle it.
    ///
    /// Returns `false` once no session remains: after teardown, after the
    /// event stream ends, or when the session was aborted.
    pub async fn pump(&mut self) -> bool {
        let cancel = self.liveness.cancellation();
        let Some(events) = self.session.as_mut().and_then(|s| s.events.as_mut()) else {
            return false;
        };

        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            event = events.recv() => event,
        };

        match event {
            Some(event) => {
                self.handle_transport_event(event);
                self.session.is_some()
            }
            None => {
                if !cancel.is_cancelled() {
                    warn!("Transport event stream ended");
                }
                self.disconnect();
                false
            }
        }
    }

    /// Apply one transport notification to a live session.
    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::ConnectionStateChanged(
                state @ (PeerConnectionState::Failed | PeerConnectionState::Closed),
            ) => {
                warn!("Peer connection {:?}, tearing down", state);
                self.disconnect();
            }
            TransportEvent::ChannelOpen => {
                let Some(channel) = self.session.as_ref().and_then(|s| s.channel.clone()) else {
                    return;
                };
                self.engine.rebind(channel);
                self.engine.on_channel_open(&self.options);
            }
            TransportEvent::ChannelClosed => {
                warn!("Data channel closed");
                self.engine.detach();
            }
            other => self.apply_event(other),
        }
    }

    fn apply_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::ChannelMessage(raw) => self.engine.receive(&raw),
            TransportEvent::ConnectionStateChanged(PeerConnectionState::Connected) => {
                info!("Peer connection established");
                self.collaborators.display.on_connection_state(true);
            }
            TransportEvent::ConnectionStateChanged(PeerConnectionState::Disconnected) => {
                warn!("Peer connection lost");
                self.collaborators.display.on_connection_state(false);
                self.capture.set_recording(false, &mut self.engine);
            }
            TransportEvent::ConnectionStateChanged(state) => {
                debug!("Peer connection state: {:?}", state);
            }
            TransportEvent::RemoteTrack | TransportEvent::PlaybackStarted => {
                self.indicator.set_playing(true);
            }
            TransportEvent::PlaybackStopped => self.indicator.set_playing(false),
            TransportEvent::ChannelOpen | TransportEvent::ChannelClosed => {}
        }
    }

    // ===== Audio and messages =====

    /// Feed one microphone frame. Returns whether it was transmitted.
    pub fn process_audio_frame(&mut self, samples: &[f32]) -> bool {
        self.capture.process_frame(samples, &mut self.engine)
    }

    /// Open or close the recording gate.
    pub fn set_recording(&mut self, enabled: bool) {
        self.capture.set_recording(enabled, &mut self.engine);
    }

    /// Mute or unmute the microphone, closing or opening the gate with it.
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        if let Some(media) = self.session.as_ref().and_then(|s| s.media.as_ref()) {
            media.set_enabled(!muted);
        }
        self.set_recording(!muted);
    }

    /// Send a typed user message and request a response.
    pub fn send_text(&mut self, text: &str) -> RealtimeResult<String> {
        self.engine.send_text(text, &self.options)
    }

    // ===== Accessors =====

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected && self.session.is_some()
    }

    /// Whether any transport handle is still held.
    pub fn has_live_handles(&self) -> bool {
        self.session.is_some()
    }

    pub fn recording_enabled(&self) -> bool {
        self.capture.is_recording()
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn conversation(&self) -> &Conversation {
        self.engine.conversation()
    }

    pub fn remote_session_id(&self) -> Option<&str> {
        self.engine.remote_session_id()
    }

    pub fn engine_stats(&self) -> EngineStats {
        self.engine.stats()
    }

    pub fn capture_stats(&self) -> CaptureStats {
        self.capture.stats()
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }
}
