//! Client configuration
//!
//! Configuration comes from environment variables (with `.env` loaded by the
//! binary at startup) and an optional YAML file.
//! Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Example
//! ```rust,no_run
//! use voicewire::config::ClientConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ClientConfig::from_env()?;
//!
//! // Load from YAML file with environment variable base
//! let config = ClientConfig::from_file(&PathBuf::from("voicewire.yaml"))?;
//! let options = config.session_options();
//! # Ok(())
//! # }
//! ```

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

mod yaml;

pub use yaml::YamlConfig;

use crate::core::audio::{
    DEFAULT_ACTIVITY_HOLD, DEFAULT_ACTIVITY_THRESHOLD, MAX_FRAME_SIZE, MIN_FRAME_SIZE,
    is_valid_frame_size,
};
use crate::core::realtime::config::{
    DEFAULT_CHANNEL_OPEN_TIMEOUT, DEFAULT_FRAME_SIZE, DEFAULT_STUN_URLS,
    DEFAULT_TRANSCRIPTION_MODEL,
};
use crate::core::realtime::{
    DEFAULT_TOKEN_SERVICE_URL, IceServer, REALTIME_NEGOTIATION_URL, RealtimeModel, RealtimeVoice,
    SessionOptions, TurnDetectionSettings,
};
use crate::utils::{validate_negotiation_url, validate_token_service_url};

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Io(String),

    #[error("{0}")]
    Parse(String),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
}

fn invalid(key: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        message: message.into(),
    }
}

/// Client configuration
#[derive(Clone)]
pub struct ClientConfig {
    /// Long-lived API key passed to the token service. Zeroized on drop.
    pub api_key: Option<String>,
    pub token_service_url: String,
    pub realtime_url: String,
    pub model: RealtimeModel,
    pub voice: RealtimeVoice,
    pub instructions: Option<String>,
    pub transcription_model: String,
    pub turn_detection: TurnDetectionSettings,
    pub frame_size: usize,
    pub activity_threshold: f32,
    pub activity_hold: Duration,
    pub negotiation_timeout: Option<Duration>,
    pub channel_open_timeout: Option<Duration>,
    pub ice_servers: Vec<IceServer>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            token_service_url: DEFAULT_TOKEN_SERVICE_URL.to_string(),
            realtime_url: REALTIME_NEGOTIATION_URL.to_string(),
            model: RealtimeModel::default(),
            voice: RealtimeVoice::default(),
            instructions: None,
            transcription_model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
            turn_detection: TurnDetectionSettings::default(),
            frame_size: DEFAULT_FRAME_SIZE,
            activity_threshold: DEFAULT_ACTIVITY_THRESHOLD,
            activity_hold: DEFAULT_ACTIVITY_HOLD,
            negotiation_timeout: None,
            channel_open_timeout: Some(DEFAULT_CHANNEL_OPEN_TIMEOUT),
            ice_servers: vec![IceServer::new(
                DEFAULT_STUN_URLS.iter().map(|u| u.to_string()).collect(),
            )],
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("token_service_url", &self.token_service_url)
            .field("realtime_url", &self.realtime_url)
            .field("model", &self.model)
            .field("voice", &self.voice)
            .field("transcription_model", &self.transcription_model)
            .field("frame_size", &self.frame_size)
            .field("negotiation_timeout", &self.negotiation_timeout)
            .field("channel_open_timeout", &self.channel_open_timeout)
            .finish_non_exhaustive()
    }
}

/// Implement Drop to zeroize the API key when ClientConfig is dropped.
impl Drop for ClientConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.api_key {
            key.zeroize();
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables and defaults
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `REALTIME_API_KEY` | none |
    /// | `TOKEN_SERVICE_URL` | `http://localhost:3000/session` |
    /// | `REALTIME_URL` | `https://api.openai.com/v1/realtime` |
    /// | `REALTIME_MODEL` | `gpt-4o-realtime-preview-2024-12-17` |
    /// | `REALTIME_VOICE` | `verse` |
    /// | `REALTIME_INSTRUCTIONS` | none |
    /// | `TRANSCRIPTION_MODEL` | `whisper-1` |
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::merge(None)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        // .env is loaded in main.rs at application startup
        let yaml_config = YamlConfig::from_file(path)?;
        let config = Self::merge(Some(yaml_config))?;
        config.validate()?;
        Ok(config)
    }

    fn merge(yaml: Option<YamlConfig>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let yaml = yaml.unwrap_or_default();

        // ===== Providers =====
        config.api_key = yaml
            .providers
            .and_then(|p| p.api_key)
            .or_else(|| env_var("REALTIME_API_KEY"));

        // ===== Endpoints =====
        let endpoints = yaml.endpoints.unwrap_or_default();
        if let Some(url) = endpoints
            .token_service_url
            .or_else(|| env_var("TOKEN_SERVICE_URL"))
        {
            config.token_service_url = url;
        }
        if let Some(url) = endpoints.realtime_url.or_else(|| env_var("REALTIME_URL")) {
            config.realtime_url = url;
        }

        // ===== Session =====
        let session = yaml.session.unwrap_or_default();
        if let Some(model) = session.model.or_else(|| env_var("REALTIME_MODEL")) {
            config.model = RealtimeModel::parse(&model)
                .ok_or_else(|| invalid("model", format!("unsupported model '{model}'")))?;
        }
        if let Some(voice) = session.voice.or_else(|| env_var("REALTIME_VOICE")) {
            config.voice = RealtimeVoice::parse(&voice)
                .ok_or_else(|| invalid("voice", format!("unsupported voice '{voice}'")))?;
        }
        config.instructions = session
            .instructions
            .or_else(|| env_var("REALTIME_INSTRUCTIONS"));
        if let Some(model) = session
            .transcription_model
            .or_else(|| env_var("TRANSCRIPTION_MODEL"))
        {
            config.transcription_model = model;
        }
        if let Some(td) = session.turn_detection {
            if let Some(threshold) = td.threshold {
                config.turn_detection.threshold = threshold;
            }
            if let Some(silence) = td.silence_duration_ms {
                config.turn_detection.silence_duration_ms = silence;
            }
            if let Some(create) = td.create_response {
                config.turn_detection.create_response = create;
            }
        }

        // ===== Audio =====
        if let Some(audio) = yaml.audio {
            if let Some(frame_size) = audio.frame_size {
                config.frame_size = frame_size;
            }
            if let Some(threshold) = audio.activity_threshold {
                config.activity_threshold = threshold;
            }
            if let Some(hold) = audio.activity_hold_ms {
                config.activity_hold = Duration::from_millis(hold);
            }
        }

        // ===== Timeouts =====
        if let Some(timeouts) = yaml.timeouts {
            if let Some(ms) = timeouts.negotiation_ms {
                config.negotiation_timeout = millis_or_none(ms);
            }
            if let Some(ms) = timeouts.channel_open_ms {
                config.channel_open_timeout = millis_or_none(ms);
            }
        }

        if let Some(ice_servers) = yaml.ice_servers {
            config.ice_servers = ice_servers;
        }

        Ok(config)
    }

    /// Validate the merged configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_token_service_url(&self.token_service_url)
            .map_err(|e| invalid("token_service_url", e.to_string()))?;
        validate_negotiation_url(&self.realtime_url)
            .map_err(|e| invalid("realtime_url", e.to_string()))?;

        if !is_valid_frame_size(self.frame_size) {
            return Err(invalid(
                "audio.frame_size",
                format!(
                    "{} is not a power of two between {MIN_FRAME_SIZE} and {MAX_FRAME_SIZE}",
                    self.frame_size
                ),
            ));
        }
        if !(0.0..=1.0).contains(&self.activity_threshold) {
            return Err(invalid(
                "audio.activity_threshold",
                "must be between 0.0 and 1.0",
            ));
        }
        if !(0.0..=1.0).contains(&self.turn_detection.threshold) {
            return Err(invalid(
                "session.turn_detection.threshold",
                "must be between 0.0 and 1.0",
            ));
        }
        if self.transcription_model.trim().is_empty() {
            return Err(invalid("session.transcription_model", "must not be empty"));
        }
        if self.ice_servers.iter().any(|s| s.urls.is_empty()) {
            return Err(invalid("ice_servers", "every entry needs at least one url"));
        }
        Ok(())
    }

    /// Session options derived from this configuration
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            model: self.model,
            voice: self.voice,
            instructions: self.instructions.clone(),
            transcription_model: self.transcription_model.clone(),
            turn_detection: self.turn_detection,
            frame_size: self.frame_size,
            activity_threshold: self.activity_threshold,
            activity_hold: self.activity_hold,
            ice_servers: self.ice_servers.clone(),
            negotiation_timeout: self.negotiation_timeout,
            channel_open_timeout: self.channel_open_timeout,
            ..SessionOptions::default()
        }
    }
}

fn env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn millis_or_none(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    // Helper to clean up environment variables
    fn cleanup_env_vars() {
        unsafe {
            env::remove_var("REALTIME_API_KEY");
            env::remove_var("TOKEN_SERVICE_URL");
            env::remove_var("REALTIME_URL");
            env::remove_var("REALTIME_MODEL");
            env::remove_var("REALTIME_VOICE");
            env::remove_var("REALTIME_INSTRUCTIONS");
            env::remove_var("TRANSCRIPTION_MODEL");
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        cleanup_env_vars();

        let config = ClientConfig::from_env().unwrap();
        assert!(config.api_key.is_none());
        assert_eq!(config.token_service_url, "http://localhost:3000/session");
        assert_eq!(config.realtime_url, "https://api.openai.com/v1/realtime");
        assert_eq!(config.model, RealtimeModel::Gpt4oRealtimePreview20241217);
        assert_eq!(config.voice, RealtimeVoice::Verse);
        assert_eq!(config.transcription_model, "whisper-1");
        assert_eq!(config.frame_size, 4096);
        assert_eq!(config.channel_open_timeout, Some(Duration::from_secs(15)));
        assert!(config.negotiation_timeout.is_none());
    }

    #[test]
    #[serial]
    fn test_from_env_values() {
        cleanup_env_vars();
        unsafe {
            env::set_var("REALTIME_API_KEY", "sk-env");
            env::set_var("REALTIME_VOICE", "coral");
            env::set_var("REALTIME_MODEL", "gpt-4o-mini-realtime-preview");
            env::set_var("REALTIME_INSTRUCTIONS", "Be brief.");
        }

        let config = ClientConfig::from_env().unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.voice, RealtimeVoice::Coral);
        assert_eq!(config.model, RealtimeModel::Gpt4oMiniRealtimePreview);
        assert_eq!(config.instructions.as_deref(), Some("Be brief."));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_voice() {
        cleanup_env_vars();
        unsafe {
            env::set_var("REALTIME_VOICE", "robot");
        }

        let err = ClientConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("voice"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_plain_http_remote_endpoint() {
        cleanup_env_vars();
        unsafe {
            env::set_var("REALTIME_URL", "http://api.example.com/v1/realtime");
        }

        let err = ClientConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("realtime_url"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_overrides_env() {
        cleanup_env_vars();
        unsafe {
            env::set_var("REALTIME_API_KEY", "sk-env");
            env::set_var("REALTIME_VOICE", "coral");
        }

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        let yaml_content = r#"
providers:
  api_key: "sk-yaml"
session:
  voice: "sage"
  turn_detection:
    silence_duration_ms: 800
audio:
  frame_size: 2048
timeouts:
  negotiation_ms: 5000
  channel_open_ms: 0
"#;
        fs::write(&config_path, yaml_content).unwrap();

        let config = ClientConfig::from_file(&config_path).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-yaml"));
        assert_eq!(config.voice, RealtimeVoice::Sage);
        assert_eq!(config.turn_detection.silence_duration_ms, 800);
        assert_eq!(config.turn_detection.threshold, 0.5);
        assert_eq!(config.frame_size, 2048);
        assert_eq!(config.negotiation_timeout, Some(Duration::from_millis(5000)));
        assert!(config.channel_open_timeout.is_none());

        let options = config.session_options();
        assert_eq!(options.frame_size, 2048);
        assert_eq!(options.data_channel_label, "oai-events");

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_env_fills_missing_yaml() {
        cleanup_env_vars();
        unsafe {
            env::set_var("TRANSCRIPTION_MODEL", "gpt-4o-transcribe");
        }

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "session:\n  voice: \"ash\"\n").unwrap();

        let config = ClientConfig::from_file(&config_path).unwrap();
        assert_eq!(config.transcription_model, "gpt-4o-transcribe");
        assert_eq!(config.voice, RealtimeVoice::Ash);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_invalid_frame_size() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "audio:\n  frame_size: 1000\n").unwrap();

        let err = ClientConfig::from_file(&config_path).unwrap_err();
        assert!(err.to_string().contains("audio.frame_size"));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let mut config = ClientConfig::default();
        config.api_key = Some("sk-secret".to_string());
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-secret"));
    }
}
