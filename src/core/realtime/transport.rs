//! Platform transport seams.
//!
//! The peer-to-peer media stack (microphone capture, peer connection, data
//! channel) is provided by the host platform. The session controller only
//! talks to it through these traits, so the same engine runs against a
//! browser bridge, a native WebRTC stack or the in-memory transport used in
//! tests.
//!
//! Asynchronous notifications (channel open, inbound messages, connection
//! state, playback) are delivered in arrival order on the
//! [`PeerHandle::events`] receiver.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Error reported by the platform transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

// =============================================================================
// Descriptions and settings
// =============================================================================

/// Whether a session description is an offer or an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// A session description in the transport's native text format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// ICE server entry handed to the peer connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            urls,
            username: None,
            credential: None,
        }
    }
}

/// Microphone processing requested from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

// =============================================================================
// States and events
// =============================================================================

/// Ready state of the data channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataChannelState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl fmt::Display for DataChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataChannelState::Connecting => write!(f, "connecting"),
            DataChannelState::Open => write!(f, "open"),
            DataChannelState::Closing => write!(f, "closing"),
            DataChannelState::Closed => write!(f, "closed"),
        }
    }
}

/// Aggregate state of the peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Notification from the platform transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The data channel reached the open state
    ChannelOpen,
    /// The data channel closed
    ChannelClosed,
    /// A text message arrived on the data channel
    ChannelMessage(String),
    /// The peer connection changed state
    ConnectionStateChanged(PeerConnectionState),
    /// A remote audio track was attached
    RemoteTrack,
    /// Remote audio started playing
    PlaybackStarted,
    /// Remote audio paused or ended
    PlaybackStopped,
}

// =============================================================================
// Traits
// =============================================================================

/// Local microphone stream.
pub trait LocalMediaStream: Send + Sync {
    /// Enable or disable the audio tracks (mute).
    fn set_enabled(&self, enabled: bool);

    /// Stop every track. Must be safe to call more than once.
    fn stop(&self);
}

/// Reliable, ordered out-of-band channel carrying the JSON event protocol.
pub trait DataChannel: Send + Sync {
    fn ready_state(&self) -> DataChannelState;

    /// Transmit one text message.
    fn send_text(&self, payload: &str) -> TransportResult<()>;

    /// Close the channel. Must be safe to call more than once.
    fn close(&self);
}

/// Peer connection negotiated with the remote service.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Attach the local stream's tracks.
    async fn add_local_stream(&self, stream: &dyn LocalMediaStream) -> TransportResult<()>;

    /// Create the event data channel.
    async fn create_data_channel(&self, label: &str) -> TransportResult<Arc<dyn DataChannel>>;

    async fn create_offer(&self) -> TransportResult<SessionDescription>;

    async fn set_local_description(&self, description: SessionDescription)
    -> TransportResult<()>;

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> TransportResult<()>;

    /// Close the connection. Must be safe to call more than once.
    fn close(&self);
}

/// A new peer connection together with its event stream.
pub struct PeerHandle {
    pub connection: Box<dyn PeerConnection>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Factory for peer connections.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn create_peer(&self, ice_servers: &[IceServer]) -> TransportResult<PeerHandle>;
}

/// Access to the local microphone.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn capture_microphone(
        &self,
        constraints: &AudioConstraints,
    ) -> TransportResult<Box<dyn LocalMediaStream>>;
}
