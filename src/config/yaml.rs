use serde::Deserialize;
use std::path::PathBuf;

use super::ConfigError;
use crate::core::realtime::IceServer;

/// Complete YAML configuration structure
///
/// This structure represents the full configuration that can be loaded from a YAML file.
/// All fields are optional to allow partial configuration. Values given here
/// override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// providers:
///   api_key: "sk-..."
///
/// endpoints:
///   token_service_url: "http://localhost:3000/session"
///   realtime_url: "https://api.openai.com/v1/realtime"
///
/// session:
///   model: "gpt-4o-realtime-preview-2024-12-17"
///   voice: "verse"
///   instructions: "You are a helpful assistant."
///   transcription_model: "whisper-1"
///   turn_detection:
///     threshold: 0.5
///     silence_duration_ms: 500
///     create_response: true
///
/// audio:
///   frame_size: 4096
///   activity_threshold: 0.01
///   activity_hold_ms: 1000
///
/// timeouts:
///   negotiation_ms: 10000
///   channel_open_ms: 15000
///
/// ice_servers:
///   - urls: ["stun:stun.l.google.com:19302"]
///   - urls: ["turn:turn.example.com:3478"]
///     username: "user"
///     credential: "pass"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub providers: Option<ProvidersYaml>,
    pub endpoints: Option<EndpointsYaml>,
    pub session: Option<SessionYaml>,
    pub audio: Option<AudioYaml>,
    pub timeouts: Option<TimeoutsYaml>,
    pub ice_servers: Option<Vec<IceServer>>,
}

/// Provider credentials from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersYaml {
    /// Long-lived API key handed to the token service
    pub api_key: Option<String>,
}

/// Service endpoints from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct EndpointsYaml {
    pub token_service_url: Option<String>,
    pub realtime_url: Option<String>,
}

/// Session parameters from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SessionYaml {
    pub model: Option<String>,
    pub voice: Option<String>,
    pub instructions: Option<String>,
    pub transcription_model: Option<String>,
    pub turn_detection: Option<TurnDetectionYaml>,
}

/// Server-side turn detection from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TurnDetectionYaml {
    pub threshold: Option<f32>,
    pub silence_duration_ms: Option<u32>,
    pub create_response: Option<bool>,
}

/// Capture settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AudioYaml {
    pub frame_size: Option<usize>,
    pub activity_threshold: Option<f32>,
    pub activity_hold_ms: Option<u64>,
}

/// Timeouts from YAML, in milliseconds. Zero disables a timeout.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TimeoutsYaml {
    pub negotiation_ms: Option<u64>,
    pub channel_open_ms: Option<u64>,
}

impl YamlConfig {
    /// Load YAML configuration from a file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Required fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::Io(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        serde_yaml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML config: {e}")))
    }
}
