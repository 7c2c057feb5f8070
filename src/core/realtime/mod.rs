//! Realtime voice session engine.
//!
//! A session streams microphone audio to a remote conversational model over a
//! peer connection and exchanges JSON events with it over an ordered data
//! channel. The remote side answers with synthesized speech on the media
//! track and with transcripts and text on the data channel.
//!
//! # Architecture
//!
//! - [`RealtimeClient`] owns the session lifecycle: credential, media,
//!   peer connection, negotiation and teardown
//! - [`ProtocolEngine`] is the only reader and writer of the data channel
//! - [`Conversation`] rebuilds per-turn text from streamed item events
//! - The platform media stack sits behind the traits in [`transport`]
//!
//! # Audio Format
//!
//! PCM 16-bit signed little-endian, base64 encoded in
//! `input_audio_buffer.append` events.
//!
//! # Example
//!
//! ```rust,ignore
//! use voicewire::core::realtime::{Collaborators, RealtimeClient, SessionOptions};
//!
//! let mut client = RealtimeClient::new(SessionOptions::default(), collaborators)?;
//! client.connect().await?;
//! client.set_recording(true);
//!
//! while client.pump().await {}
//! ```

mod base;
pub mod config;
pub mod conversation;
pub mod engine;
pub mod messages;
pub mod negotiation;
pub mod session;
pub mod token;
pub mod transport;

pub use base::{
    ConnectionState, DisplaySink, ItemRole, RealtimeError, RealtimeResult,
};
pub use config::{
    DATA_CHANNEL_LABEL, DEFAULT_TOKEN_SERVICE_URL, REALTIME_NEGOTIATION_URL, RealtimeModel,
    RealtimeVoice, SessionOptions, TurnDetectionSettings,
};
pub use conversation::{Conversation, ConversationItem, ItemKind, ItemState};
pub use engine::{EngineStats, ProtocolEngine};
pub use messages::{ClientEvent, ServerEvent};
pub use negotiation::{NegotiationClient, Negotiator};
pub use session::{AbortHandle, Collaborators, RealtimeClient};
pub use token::{EphemeralCredential, HttpTokenService, StaticTokenService, TokenService};
pub use transport::{
    AudioConstraints, DataChannel, DataChannelState, IceServer, LocalMediaStream, MediaDevices,
    PeerConnection, PeerConnectionState, PeerConnector, PeerHandle, SessionDescription,
    TransportError, TransportEvent,
};
