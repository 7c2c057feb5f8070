//! Event channel protocol engine.
//!
//! Single point of entry and exit for JSON events on the data channel.
//! Outbound events are transmitted only while the channel is open; anything
//! sent while it is closed is dropped and logged. Inbound messages are parsed
//! one at a time and a malformed message never affects the next one.

use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use super::base::{DisplaySink, ItemRole, RealtimeError, RealtimeResult};
use super::config::{AUDIO_FORMAT_PCM16, SessionOptions};
use super::conversation::{
    Conversation, CreatedContent, ItemChange, ItemEvent, ItemKind,
};
use super::messages::{
    CONTENT_INPUT_AUDIO, ClientEvent, ConversationItem as WireItem, InputAudioTranscription,
    OutboundEvent, ResponseConfig, ServerEvent, SessionConfig, TurnDetection,
};
use super::transport::{DataChannel, DataChannelState};
use crate::core::audio::ActivityIndicator;

/// Prefix of locally generated message item ids.
pub const LOCAL_ITEM_PREFIX: &str = "msg_";

/// Response modalities requested by this client.
pub const RESPONSE_MODALITIES: [&str; 2] = ["text", "audio"];

/// Counters kept by the protocol engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Events written to the channel
    pub events_sent: u64,
    /// Events dropped because the channel was not open or rejected the write
    pub sends_dropped: u64,
    /// Inbound messages received
    pub messages_received: u64,
    /// Inbound messages that could not be parsed
    pub parse_failures: u64,
    /// Inbound messages with a type this client does not consume
    pub ignored: u64,
}

/// Used only to name unknown inbound types in logs.
#[derive(Deserialize)]
struct TypeTag {
    #[serde(rename = "type", default)]
    event_type: String,
}

/// Protocol engine bound to at most one data channel.
pub struct ProtocolEngine {
    channel: Option<Arc<dyn DataChannel>>,
    next_event_id: u64,
    conversation: Conversation,
    display: Arc<dyn DisplaySink>,
    indicator: ActivityIndicator,
    last_item_id: Option<String>,
    remote_session_id: Option<String>,
    last_error: Option<RealtimeError>,
    stats: EngineStats,
}

impl ProtocolEngine {
    pub fn new(display: Arc<dyn DisplaySink>, indicator: ActivityIndicator) -> Self {
        Self {
            channel: None,
            next_event_id: 0,
            conversation: Conversation::new(),
            display,
            indicator,
            last_item_id: None,
            remote_session_id: None,
            last_error: None,
            stats: EngineStats::default(),
        }
    }

    // ===== Channel binding =====

    /// Bind the engine to a fresh channel and reset per-session state.
    pub fn attach(&mut self, channel: Arc<dyn DataChannel>) {
        self.channel = Some(channel);
        self.conversation.clear();
        self.last_item_id = None;
        self.remote_session_id = None;
        self.last_error = None;
    }

    /// Bind the channel again after it re-opened, keeping the conversation.
    pub fn rebind(&mut self, channel: Arc<dyn DataChannel>) {
        self.channel = Some(channel);
    }

    /// Drop the channel reference. Later sends are dropped.
    pub fn detach(&mut self) -> Option<Arc<dyn DataChannel>> {
        self.channel.take()
    }

    /// Whether the bound channel reports the open state.
    pub fn is_open(&self) -> bool {
        self.channel
            .as_ref()
            .is_some_and(|c| c.ready_state() == DataChannelState::Open)
    }

    // ===== Outbound =====

    /// Serialize and transmit one event.
    ///
    /// Returns `false` if the event was dropped. Dropping is not an error for
    /// the caller: nothing is queued and nothing is retried.
    pub fn send(&mut self, event: ClientEvent) -> bool {
        let Some(channel) = self
            .channel
            .as_ref()
            .filter(|c| c.ready_state() == DataChannelState::Open)
        else {
            self.stats.sends_dropped += 1;
            let err = RealtimeError::ChannelSendWhileClosed {
                event_type: event.type_name(),
            };
            warn!("{}", err);
            return false;
        };

        self.next_event_id += 1;
        let event_type = event.type_name();
        let outbound = OutboundEvent::new(format!("event_{}", self.next_event_id), event);
        let payload = match outbound.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                self.stats.sends_dropped += 1;
                warn!("Failed to serialize {}: {}", event_type, e);
                return false;
            }
        };

        match channel.send_text(&payload) {
            Ok(()) => {
                self.stats.events_sent += 1;
                trace!("Sent {} ({})", event_type, outbound.event_id);
                true
            }
            Err(e) => {
                self.stats.sends_dropped += 1;
                warn!("Data channel rejected {}: {}", event_type, e);
                false
            }
        }
    }

    /// Send the session configuration. Called once per channel open.
    pub fn on_channel_open(&mut self, options: &SessionOptions) -> bool {
        info!(
            "Data channel open, configuring session (voice={}, transcription={})",
            options.voice, options.transcription_model
        );
        self.send(ClientEvent::SessionUpdate {
            session: session_config(options),
        })
    }

    /// Send a typed user message followed by a response request.
    ///
    /// Returns the locally generated item id. Nothing is sent and no
    /// conversation state changes unless the channel is open.
    pub fn send_text(&mut self, text: &str, options: &SessionOptions) -> RealtimeResult<String> {
        if text.trim().is_empty() {
            return Err(RealtimeError::InvalidConfiguration(
                "Message text must not be empty".to_string(),
            ));
        }
        if !self.is_open() {
            warn!("Data channel not open, message not sent");
            return Err(RealtimeError::NotConnected);
        }

        let item_id = local_item_id();
        let create = ClientEvent::user_text(item_id.clone(), text, self.last_item_id.clone());
        if !self.send(create) {
            return Err(RealtimeError::NotConnected);
        }

        let change = self.conversation.apply(ItemEvent::LocalMessage {
            item_id: item_id.clone(),
            text: text.to_string(),
        });
        self.publish(change);

        self.send(ClientEvent::ResponseCreate {
            response: Some(ResponseConfig {
                modalities: Some(RESPONSE_MODALITIES.iter().map(|m| m.to_string()).collect()),
                voice: Some(options.voice.as_str().to_string()),
            }),
        });
        Ok(item_id)
    }

    // ===== Inbound =====

    /// Parse and dispatch one raw inbound message.
    pub fn receive(&mut self, raw: &str) {
        self.stats.messages_received += 1;
        match serde_json::from_str::<ServerEvent>(raw) {
            Ok(event) => self.dispatch(event, raw),
            Err(e) => {
                self.stats.parse_failures += 1;
                let err = RealtimeError::MessageParseFailed(e.to_string());
                warn!("{}", err);
                self.last_error = Some(err);
            }
        }
    }

    fn dispatch(&mut self, event: ServerEvent, raw: &str) {
        match event {
            ServerEvent::Error { error } => {
                let err = RealtimeError::from(error);
                warn!("{}", err);
                self.display.on_error(&err);
                self.last_error = Some(err);
            }
            ServerEvent::SessionCreated { session } => {
                info!("Realtime session created: {}", session.id);
                self.remote_session_id = Some(session.id);
            }
            ServerEvent::SessionUpdated { session } => {
                debug!("Realtime session updated: {}", session.id);
                if !session.id.is_empty() {
                    self.remote_session_id = Some(session.id);
                }
            }
            ServerEvent::SpeechStarted { audio_start_ms, .. } => {
                debug!("Speech started at {}ms", audio_start_ms);
                self.display.on_speech(true);
            }
            ServerEvent::SpeechStopped { audio_end_ms, .. } => {
                debug!("Speech stopped at {}ms", audio_end_ms);
                self.display.on_speech(false);
            }
            ServerEvent::InputAudioBufferCommitted { item_id, .. } => {
                debug!("Audio buffer committed, awaiting transcription ({:?})", item_id);
            }
            ServerEvent::InputAudioBufferCleared => {
                debug!("Audio buffer cleared");
            }
            ServerEvent::ConversationItemCreated { item, .. } => self.on_item_created(item),
            ServerEvent::TranscriptionCompleted {
                item_id,
                transcript,
                ..
            } => {
                debug!("User transcript for {}: {}", item_id, transcript);
                let change = self.conversation.apply(ItemEvent::TranscriptionCompleted {
                    item_id,
                    transcript,
                });
                self.publish(change);
            }
            ServerEvent::TranscriptionFailed { item_id, error, .. } => {
                let change = self
                    .conversation
                    .apply(ItemEvent::TranscriptionFailed { item_id });
                self.publish(change);
                let err = RealtimeError::from(error);
                warn!("Transcription failed: {}", err);
                self.display.on_error(&err);
                self.last_error = Some(err);
            }
            ServerEvent::TextDelta { item_id, delta, .. } => {
                self.apply_delta(item_id, ItemKind::Text, delta)
            }
            ServerEvent::TextDone { item_id, text, .. } => {
                self.apply_done(item_id, ItemKind::Text, text)
            }
            ServerEvent::AudioTranscriptDelta { item_id, delta, .. } => {
                self.apply_delta(item_id, ItemKind::Transcript, delta)
            }
            ServerEvent::AudioTranscriptDone {
                item_id,
                transcript,
                ..
            } => self.apply_done(item_id, ItemKind::Transcript, transcript),
            ServerEvent::ResponseCreated { response } => {
                debug!("Response created: {}", response.id);
            }
            ServerEvent::ResponseDone { response } => {
                debug!(
                    "Response done: {} ({})",
                    response.id,
                    response.status.as_deref().unwrap_or("unknown")
                );
            }
            ServerEvent::AudioDelta => self.indicator.pulse(),
            ServerEvent::Unknown => {
                self.stats.ignored += 1;
                let tag = serde_json::from_str::<TypeTag>(raw)
                    .map(|t| t.event_type)
                    .unwrap_or_default();
                debug!("Ignoring event type {}", tag);
            }
        }
    }

    fn on_item_created(&mut self, item: WireItem) {
        let Some(item_id) = item.id else {
            debug!("Conversation item without id, ignoring");
            return;
        };
        self.last_item_id = Some(item_id.clone());

        let Some(role) = item.role.as_deref().and_then(ItemRole::parse) else {
            trace!("Conversation item {} has no displayable role", item_id);
            return;
        };

        let content = match item.content.into_iter().next() {
            Some(part) if part.content_type == CONTENT_INPUT_AUDIO || part.content_type == "audio" => {
                CreatedContent::Audio {
                    transcript: part.transcript.filter(|t| !t.is_empty()),
                }
            }
            Some(part) => match part.text {
                Some(text) => CreatedContent::Text(text),
                None => CreatedContent::Other,
            },
            None => CreatedContent::Other,
        };

        let change = self.conversation.apply(ItemEvent::Created {
            item_id,
            role,
            content,
        });
        self.publish(change);
    }

    fn apply_delta(&mut self, item_id: String, kind: ItemKind, delta: String) {
        let change = self.conversation.apply(ItemEvent::Delta {
            item_id,
            kind,
            delta,
        });
        self.publish(change);
    }

    fn apply_done(&mut self, item_id: String, kind: ItemKind, final_text: Option<String>) {
        let change = self.conversation.apply(ItemEvent::Done {
            item_id,
            kind,
            final_text,
        });
        self.publish(change);
    }

    fn publish(&self, change: Option<ItemChange>) {
        if let Some(change) = change {
            self.display
                .on_item_update(&change.item_id, change.role, &change.text, change.is_final);
        }
    }

    // ===== Accessors =====

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Id of the most recent item announced by the server.
    pub fn last_item_id(&self) -> Option<&str> {
        self.last_item_id.as_deref()
    }

    pub fn remote_session_id(&self) -> Option<&str> {
        self.remote_session_id.as_deref()
    }

    /// Most recent non-fatal error recorded by the engine.
    pub fn last_error(&self) -> Option<&RealtimeError> {
        self.last_error.as_ref()
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn indicator(&self) -> &ActivityIndicator {
        &self.indicator
    }
}

/// Build the `session.update` payload for the given options.
pub fn session_config(options: &SessionOptions) -> SessionConfig {
    SessionConfig {
        modalities: Some(RESPONSE_MODALITIES.iter().map(|m| m.to_string()).collect()),
        instructions: options.instructions.clone(),
        voice: Some(options.voice.as_str().to_string()),
        input_audio_format: Some(AUDIO_FORMAT_PCM16.to_string()),
        output_audio_format: Some(AUDIO_FORMAT_PCM16.to_string()),
        input_audio_transcription: Some(InputAudioTranscription {
            model: options.transcription_model.clone(),
        }),
        turn_detection: Some(TurnDetection::ServerVad {
            threshold: Some(options.turn_detection.threshold),
            silence_duration_ms: Some(options.turn_detection.silence_duration_ms),
            create_response: Some(options.turn_detection.create_response),
        }),
    }
}

/// Generate a 32 character message item id.
fn local_item_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("{}{}", LOCAL_ITEM_PREFIX, &hex[..28])
}
