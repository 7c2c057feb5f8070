//! Realtime session configuration types.
//!
//! This module contains the negotiated session parameters:
//! - Model selection
//! - Voice selection
//! - Audio format
//! - Turn detection settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::audio::{DEFAULT_ACTIVITY_HOLD, DEFAULT_ACTIVITY_THRESHOLD};
use crate::core::realtime::transport::{AudioConstraints, IceServer};

/// Negotiation endpoint for the realtime service.
pub const REALTIME_NEGOTIATION_URL: &str = "https://api.openai.com/v1/realtime";

/// Default location of the ephemeral credential service.
pub const DEFAULT_TOKEN_SERVICE_URL: &str = "http://localhost:3000/session";

/// Label of the out-of-band event channel.
pub const DATA_CHANNEL_LABEL: &str = "oai-events";

/// Capture frame size in samples.
pub const DEFAULT_FRAME_SIZE: usize = 4096;

/// Transcription model for inbound user audio.
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";

/// Default wait for the data channel to open after the answer is applied.
pub const DEFAULT_CHANNEL_OPEN_TIMEOUT: Duration = Duration::from_secs(15);

/// Default public STUN servers.
pub const DEFAULT_STUN_URLS: [&str; 2] = [
    "stun:stun.l.google.com:19302",
    "stun:stun1.l.google.com:19302",
];

// =============================================================================
// Models
// =============================================================================

/// Supported realtime models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RealtimeModel {
    /// GPT-4o Realtime Preview model
    #[serde(rename = "gpt-4o-realtime-preview")]
    Gpt4oRealtimePreview,
    /// GPT-4o Realtime Preview 2024-10-01
    #[serde(rename = "gpt-4o-realtime-preview-2024-10-01")]
    Gpt4oRealtimePreview20241001,
    /// GPT-4o Realtime Preview 2024-12-17
    #[default]
    #[serde(rename = "gpt-4o-realtime-preview-2024-12-17")]
    Gpt4oRealtimePreview20241217,
    /// GPT-4o Mini Realtime Preview
    #[serde(rename = "gpt-4o-mini-realtime-preview")]
    Gpt4oMiniRealtimePreview,
    /// GPT-4o Mini Realtime Preview 2024-12-17
    #[serde(rename = "gpt-4o-mini-realtime-preview-2024-12-17")]
    Gpt4oMiniRealtimePreview20241217,
}

impl RealtimeModel {
    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gpt4oRealtimePreview => "gpt-4o-realtime-preview",
            Self::Gpt4oRealtimePreview20241001 => "gpt-4o-realtime-preview-2024-10-01",
            Self::Gpt4oRealtimePreview20241217 => "gpt-4o-realtime-preview-2024-12-17",
            Self::Gpt4oMiniRealtimePreview => "gpt-4o-mini-realtime-preview",
            Self::Gpt4oMiniRealtimePreview20241217 => "gpt-4o-mini-realtime-preview-2024-12-17",
        }
    }

    /// Parse a model identifier.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "gpt-4o-realtime-preview" => Some(Self::Gpt4oRealtimePreview),
            "gpt-4o-realtime-preview-2024-10-01" => Some(Self::Gpt4oRealtimePreview20241001),
            "gpt-4o-realtime-preview-2024-12-17" => Some(Self::Gpt4oRealtimePreview20241217),
            "gpt-4o-mini-realtime-preview" => Some(Self::Gpt4oMiniRealtimePreview),
            "gpt-4o-mini-realtime-preview-2024-12-17" => {
                Some(Self::Gpt4oMiniRealtimePreview20241217)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for RealtimeModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Voices
// =============================================================================

/// Available output voices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RealtimeVoice {
    Alloy,
    Ash,
    Ballad,
    Coral,
    Echo,
    Sage,
    Shimmer,
    #[default]
    Verse,
}

impl RealtimeVoice {
    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alloy => "alloy",
            Self::Ash => "ash",
            Self::Ballad => "ballad",
            Self::Coral => "coral",
            Self::Echo => "echo",
            Self::Sage => "sage",
            Self::Shimmer => "shimmer",
            Self::Verse => "verse",
        }
    }

    /// Parse a voice name.
    pub fn parse(s: &str) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
    }

    /// Get all available voices.
    pub fn all() -> &'static [RealtimeVoice] {
        &[
            Self::Alloy,
            Self::Ash,
            Self::Ballad,
            Self::Coral,
            Self::Echo,
            Self::Sage,
            Self::Shimmer,
            Self::Verse,
        ]
    }
}

impl std::fmt::Display for RealtimeVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Audio Format
// =============================================================================

/// Wire audio format. Only linear PCM is carried.
pub const AUDIO_FORMAT_PCM16: &str = "pcm16";

// =============================================================================
// Turn Detection
// =============================================================================

/// Server-side voice activity segmentation parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurnDetectionSettings {
    /// Activation threshold (0.0 to 1.0)
    pub threshold: f32,
    /// Trailing silence before the turn is considered ended
    pub silence_duration_ms: u32,
    /// Whether ending a turn triggers a response automatically
    pub create_response: bool,
}

impl Default for TurnDetectionSettings {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            silence_duration_ms: 500,
            create_response: true,
        }
    }
}

// =============================================================================
// Session Options
// =============================================================================

/// Everything a connection attempt needs apart from its collaborators.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub model: RealtimeModel,
    pub voice: RealtimeVoice,
    pub instructions: Option<String>,
    pub transcription_model: String,
    pub turn_detection: TurnDetectionSettings,
    pub frame_size: usize,
    pub activity_threshold: f32,
    pub activity_hold: Duration,
    pub ice_servers: Vec<IceServer>,
    pub audio_constraints: AudioConstraints,
    pub data_channel_label: String,
    /// No limit when `None`
    pub negotiation_timeout: Option<Duration>,
    /// No limit when `None`
    pub channel_open_timeout: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            model: RealtimeModel::default(),
            voice: RealtimeVoice::default(),
            instructions: None,
            transcription_model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
            turn_detection: TurnDetectionSettings::default(),
            frame_size: DEFAULT_FRAME_SIZE,
            activity_threshold: DEFAULT_ACTIVITY_THRESHOLD,
            activity_hold: DEFAULT_ACTIVITY_HOLD,
            ice_servers: vec![IceServer::new(
                DEFAULT_STUN_URLS.iter().map(|u| u.to_string()).collect(),
            )],
            audio_constraints: AudioConstraints::default(),
            data_channel_label: DATA_CHANNEL_LABEL.to_string(),
            negotiation_timeout: None,
            channel_open_timeout: Some(DEFAULT_CHANNEL_OPEN_TIMEOUT),
        }
    }
}
