//! Base types shared by the realtime session engine.
//!
//! This module defines the error taxonomy, connection state, conversation
//! roles and the display collaborator trait that the engine reports to.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during a realtime session.
///
/// `CredentialMissingOrInvalid`, `NegotiationFailed`, `MediaAcquisitionFailed`,
/// `TransportFailed`, `Timeout` and `Cancelled` abort a connection attempt.
/// The remaining variants are recorded where they occur and never tear the
/// session down.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RealtimeError {
    /// Credential could not be obtained, or the one obtained is unusable
    #[error("Credential missing or invalid: {0}")]
    CredentialMissingOrInvalid(String),

    /// Offer/answer exchange with the negotiation endpoint failed
    #[error("Negotiation failed{}: {message}", status.map(|s| format!(" ({s})")).unwrap_or_default())]
    NegotiationFailed {
        /// HTTP status, if a response was received
        status: Option<u16>,
        /// Response body or transport error message
        message: String,
    },

    /// Microphone capture could not be started
    #[error("Media acquisition failed: {0}")]
    MediaAcquisitionFailed(String),

    /// Peer connection or data channel setup failed
    #[error("Transport failed: {0}")]
    TransportFailed(String),

    /// An outbound event was dropped because the data channel is not open
    #[error("Channel not open, dropped {event_type}")]
    ChannelSendWhileClosed {
        /// Wire type of the dropped event
        event_type: &'static str,
    },

    /// An inbound message could not be parsed
    #[error("Message parse failed: {0}")]
    MessageParseFailed(String),

    /// The remote service reported an error event
    #[error("Remote error{}: {message}", code.as_ref().map(|c| format!(" [{c}]")).unwrap_or_default())]
    RemoteProtocolError {
        /// Provider error code, if any
        code: Option<String>,
        /// Provider error message
        message: String,
    },

    /// Operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The connection attempt was superseded by a disconnect
    #[error("Connection attempt cancelled")]
    Cancelled,

    /// No live session
    #[error("Not connected")]
    NotConnected,

    /// Invalid configuration or argument
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl RealtimeError {
    /// Whether this error aborts a connection attempt.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RealtimeError::CredentialMissingOrInvalid(_)
                | RealtimeError::NegotiationFailed { .. }
                | RealtimeError::MediaAcquisitionFailed(_)
                | RealtimeError::TransportFailed(_)
                | RealtimeError::Timeout(_)
                | RealtimeError::Cancelled
        )
    }
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle state of the realtime client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No session
    #[default]
    Disconnected,
    /// Connection attempt in progress
    Connecting,
    /// Session live, data channel open and configured
    Connected,
    /// Last connection attempt failed
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Failed => write!(f, "Failed"),
        }
    }
}

// =============================================================================
// Conversation Roles
// =============================================================================

/// Speaker of a conversation item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemRole {
    /// User speech or typed text
    User,
    /// Assistant response
    Assistant,
}

impl ItemRole {
    /// Parse a wire role. Roles other than user and assistant are not displayed.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(ItemRole::User),
            "assistant" => Some(ItemRole::Assistant),
            _ => None,
        }
    }
}

impl fmt::Display for ItemRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemRole::User => write!(f, "user"),
            ItemRole::Assistant => write!(f, "assistant"),
        }
    }
}

// =============================================================================
// Display Collaborator
// =============================================================================

/// Surface that renders the conversation and status indicators.
///
/// Implementations must be cheap and non-blocking: they are invoked from
/// event handling and from the audio frame path.
pub trait DisplaySink: Send + Sync {
    /// Text for a logical turn was appended to or replaced.
    fn on_item_update(&self, item_id: &str, role: ItemRole, text: &str, is_final: bool);

    /// Audio activity indicator changed.
    fn on_activity(&self, active: bool);

    /// Peer connection became connected or was lost.
    fn on_connection_state(&self, connected: bool);

    /// Server-side voice activity detection started or stopped.
    fn on_speech(&self, _active: bool) {}

    /// A non-fatal error worth showing to the user.
    fn on_error(&self, _error: &RealtimeError) {}
}
