//! In-memory platform transport for integration tests.
//!
//! Implements every transport seam plus the token service and negotiator,
//! recording what the client does through a shared [`CallLog`]:
//! - acquisition order of each connection step
//! - every payload written to the data channel
//! - how often media, peer and channel were released
//!
//! By default applying the remote answer reports the peer as connected and
//! opens the data channel, like a real stack does shortly after negotiation.

// Not every test binary uses every helper
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

use voicewire::core::realtime::negotiation::Negotiator;
use voicewire::core::realtime::transport::TransportResult;
use voicewire::core::realtime::{
    AudioConstraints, Collaborators, DataChannel, DataChannelState, DisplaySink,
    EphemeralCredential, IceServer, ItemRole, LocalMediaStream, MediaDevices, PeerConnection,
    PeerConnectionState, PeerConnector, PeerHandle, RealtimeError, RealtimeModel, RealtimeResult,
    RealtimeVoice, SessionDescription, TokenService, TransportError, TransportEvent,
};

pub const MOCK_OFFER: &str = "v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\ns=offer\r\n";
pub const MOCK_ANSWER: &str = "v=0\r\no=- 2 2 IN IP4 127.0.0.1\r\ns=answer\r\n";

/// Knobs for failure injection.
#[derive(Debug, Clone, Default)]
pub struct MockBehavior {
    pub fail_token: bool,
    pub fail_media: bool,
    pub fail_peer: bool,
    /// Negotiation fails with this HTTP status
    pub negotiation_status: Option<u16>,
    pub token_delay: Option<Duration>,
    pub negotiation_delay: Option<Duration>,
    /// Never open the data channel after the answer is applied
    pub hold_channel_closed: bool,
}

/// Everything the mock transport observed.
pub struct CallLog {
    pub behavior: MockBehavior,
    pub steps: Mutex<Vec<&'static str>>,
    pub sent: Mutex<Vec<String>>,
    pub channel_state: Mutex<DataChannelState>,
    pub events_tx: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
    pub track_enabled: Mutex<Option<bool>>,
    pub bearer_tokens: Mutex<Vec<String>>,
    pub media_stopped: AtomicUsize,
    pub peer_closed: AtomicUsize,
    pub channel_closed: AtomicUsize,
}

impl CallLog {
    fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            steps: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            channel_state: Mutex::new(DataChannelState::Connecting),
            events_tx: Mutex::new(None),
            track_enabled: Mutex::new(None),
            bearer_tokens: Mutex::new(Vec::new()),
            media_stopped: AtomicUsize::new(0),
            peer_closed: AtomicUsize::new(0),
            channel_closed: AtomicUsize::new(0),
        }
    }

    fn step(&self, name: &'static str) {
        self.steps.lock().push(name);
    }

    pub fn steps(&self) -> Vec<&'static str> {
        self.steps.lock().clone()
    }

    /// Deliver a transport event to the client.
    pub fn push(&self, event: TransportEvent) {
        if let Some(tx) = self.events_tx.lock().as_ref() {
            let _ = tx.send(event);
        }
    }

    /// Deliver a raw inbound data channel message.
    pub fn push_message(&self, raw: &str) {
        self.push(TransportEvent::ChannelMessage(raw.to_string()));
    }

    pub fn set_channel_state(&self, state: DataChannelState) {
        *self.channel_state.lock() = state;
    }

    pub fn sent_json(&self) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .map(|s| serde_json::from_str(s).expect("sent payload is JSON"))
            .collect()
    }

    pub fn sent_types(&self) -> Vec<String> {
        self.sent_json()
            .iter()
            .map(|v| v["type"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn count_sent(&self, event_type: &str) -> usize {
        self.sent_types().iter().filter(|t| *t == event_type).count()
    }

    pub fn media_stopped(&self) -> usize {
        self.media_stopped.load(Ordering::SeqCst)
    }

    pub fn peer_closed(&self) -> usize {
        self.peer_closed.load(Ordering::SeqCst)
    }

    pub fn channel_closed(&self) -> usize {
        self.channel_closed.load(Ordering::SeqCst)
    }
}

// ===== Media =====

struct MockStream {
    calls: Arc<CallLog>,
}

impl LocalMediaStream for MockStream {
    fn set_enabled(&self, enabled: bool) {
        *self.calls.track_enabled.lock() = Some(enabled);
    }

    fn stop(&self) {
        self.calls.media_stopped.fetch_add(1, Ordering::SeqCst);
    }
}

struct MockMedia {
    calls: Arc<CallLog>,
}

#[async_trait]
impl MediaDevices for MockMedia {
    async fn capture_microphone(
        &self,
        constraints: &AudioConstraints,
    ) -> TransportResult<Box<dyn LocalMediaStream>> {
        assert!(constraints.echo_cancellation);
        if self.calls.behavior.fail_media {
            return Err(TransportError::new("Permission denied"));
        }
        self.calls.step("capture_microphone");
        Ok(Box::new(MockStream {
            calls: self.calls.clone(),
        }))
    }
}

// ===== Peer and channel =====

struct MockChannel {
    calls: Arc<CallLog>,
}

impl DataChannel for MockChannel {
    fn ready_state(&self) -> DataChannelState {
        *self.calls.channel_state.lock()
    }

    fn send_text(&self, payload: &str) -> TransportResult<()> {
        if self.ready_state() != DataChannelState::Open {
            return Err(TransportError::new("InvalidStateError"));
        }
        self.calls.sent.lock().push(payload.to_string());
        Ok(())
    }

    fn close(&self) {
        self.calls.channel_closed.fetch_add(1, Ordering::SeqCst);
        self.calls.set_channel_state(DataChannelState::Closed);
    }
}

struct MockPeer {
    calls: Arc<CallLog>,
}

#[async_trait]
impl PeerConnection for MockPeer {
    async fn add_local_stream(&self, _stream: &dyn LocalMediaStream) -> TransportResult<()> {
        self.calls.step("add_local_stream");
        Ok(())
    }

    async fn create_data_channel(&self, label: &str) -> TransportResult<Arc<dyn DataChannel>> {
        assert_eq!(label, "oai-events");
        self.calls.step("create_data_channel");
        self.calls.set_channel_state(DataChannelState::Connecting);
        Ok(Arc::new(MockChannel {
            calls: self.calls.clone(),
        }))
    }

    async fn create_offer(&self) -> TransportResult<SessionDescription> {
        self.calls.step("create_offer");
        Ok(SessionDescription::offer(MOCK_OFFER))
    }

    async fn set_local_description(&self, _description: SessionDescription) -> TransportResult<()> {
        self.calls.step("set_local_description");
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> TransportResult<()> {
        assert_eq!(description.sdp, MOCK_ANSWER);
        self.calls.step("set_remote_description");
        if !self.calls.behavior.hold_channel_closed {
            self.calls
                .push(TransportEvent::ConnectionStateChanged(PeerConnectionState::Connected));
            self.calls.set_channel_state(DataChannelState::Open);
            self.calls.push(TransportEvent::ChannelOpen);
        }
        Ok(())
    }

    fn close(&self) {
        self.calls.peer_closed.fetch_add(1, Ordering::SeqCst);
    }
}

struct MockConnector {
    calls: Arc<CallLog>,
}

#[async_trait]
impl PeerConnector for MockConnector {
    async fn create_peer(&self, ice_servers: &[IceServer]) -> TransportResult<PeerHandle> {
        assert!(!ice_servers.is_empty());
        if self.calls.behavior.fail_peer {
            return Err(TransportError::new("ICE configuration rejected"));
        }
        self.calls.step("create_peer");
        let (tx, rx) = mpsc::unbounded_channel();
        *self.calls.events_tx.lock() = Some(tx);
        Ok(PeerHandle {
            connection: Box::new(MockPeer {
                calls: self.calls.clone(),
            }),
            events: rx,
        })
    }
}

// ===== Token service and negotiator =====

struct MockTokenService {
    calls: Arc<CallLog>,
}

#[async_trait]
impl TokenService for MockTokenService {
    async fn acquire(
        &self,
        _model: RealtimeModel,
        _voice: RealtimeVoice,
    ) -> RealtimeResult<EphemeralCredential> {
        if let Some(delay) = self.calls.behavior.token_delay {
            tokio::time::sleep(delay).await;
        }
        if self.calls.behavior.fail_token {
            return Err(RealtimeError::CredentialMissingOrInvalid(
                "API key is required".to_string(),
            ));
        }
        self.calls.step("acquire_credential");
        Ok(EphemeralCredential::new("ek_mock", None))
    }
}

struct MockNegotiator {
    calls: Arc<CallLog>,
}

#[async_trait]
impl Negotiator for MockNegotiator {
    async fn negotiate(
        &self,
        offer: &SessionDescription,
        credential: &EphemeralCredential,
        _model: RealtimeModel,
    ) -> RealtimeResult<SessionDescription> {
        assert_eq!(offer.sdp, MOCK_OFFER);
        self.calls
            .bearer_tokens
            .lock()
            .push(credential.secret().to_string());
        if let Some(delay) = self.calls.behavior.negotiation_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(status) = self.calls.behavior.negotiation_status {
            return Err(RealtimeError::NegotiationFailed {
                status: Some(status),
                message: "Unauthorized".to_string(),
            });
        }
        self.calls.step("negotiate");
        Ok(SessionDescription::answer(MOCK_ANSWER))
    }
}

// ===== Display =====

/// Display collaborator that records every callback.
#[derive(Default)]
pub struct RecordingDisplay {
    pub items: Mutex<Vec<(String, ItemRole, String, bool)>>,
    pub activity: Mutex<Vec<bool>>,
    pub connection: Mutex<Vec<bool>>,
    pub speech: Mutex<Vec<bool>>,
    pub errors: Mutex<Vec<RealtimeError>>,
}

impl RecordingDisplay {
    /// Latest text shown for an item.
    pub fn text_of(&self, item_id: &str) -> Option<(String, bool)> {
        self.items
            .lock()
            .iter()
            .rev()
            .find(|(id, ..)| id == item_id)
            .map(|(_, _, text, is_final)| (text.clone(), *is_final))
    }
}

impl DisplaySink for RecordingDisplay {
    fn on_item_update(&self, item_id: &str, role: ItemRole, text: &str, is_final: bool) {
        self.items
            .lock()
            .push((item_id.to_string(), role, text.to_string(), is_final));
    }

    fn on_activity(&self, active: bool) {
        self.activity.lock().push(active);
    }

    fn on_connection_state(&self, connected: bool) {
        self.connection.lock().push(connected);
    }

    fn on_speech(&self, active: bool) {
        self.speech.lock().push(active);
    }

    fn on_error(&self, error: &RealtimeError) {
        self.errors.lock().push(error.clone());
    }
}

/// Build mock collaborators sharing one call log.
pub fn mock_collaborators(behavior: MockBehavior) -> (Collaborators, Arc<CallLog>, Arc<RecordingDisplay>) {
    let calls = Arc::new(CallLog::new(behavior));
    let display = Arc::new(RecordingDisplay::default());
    let collaborators = Collaborators {
        token_service: Arc::new(MockTokenService {
            calls: calls.clone(),
        }),
        negotiator: Arc::new(MockNegotiator {
            calls: calls.clone(),
        }),
        media: Arc::new(MockMedia {
            calls: calls.clone(),
        }),
        connector: Arc::new(MockConnector {
            calls: calls.clone(),
        }),
        display: display.clone(),
    };
    (collaborators, calls, display)
}

/// Transport-only collaborators; token service and negotiator are supplied by the caller.
pub fn mock_transport(
    token_service: Arc<dyn TokenService>,
    negotiator: Arc<dyn Negotiator>,
) -> (Collaborators, Arc<CallLog>, Arc<RecordingDisplay>) {
    let (mut collaborators, calls, display) = mock_collaborators(MockBehavior::default());
    collaborators.token_service = token_service;
    collaborators.negotiator = negotiator;
    (collaborators, calls, display)
}
