//! JSON events exchanged over the data channel.
//!
//! Every event is an object tagged by `type`. Outbound events are the five
//! this client emits; inbound events are limited to the ones that drive the
//! session log and the conversation. Any other inbound `type` decodes to
//! [`ServerEvent::Unknown`] and is skipped.

use base64::prelude::*;
use serde::{Deserialize, Serialize};

use super::base::{RealtimeError, RealtimeResult};

/// Payload of `session.update`, built from [`SessionOptions`](super::SessionOptions).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    /// Always `pcm16`, matching what the capture pipeline encodes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_format: Option<String>,
    /// Enables the user-side transcripts that replace the placeholder text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<InputAudioTranscription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<TurnDetection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputAudioTranscription {
    pub model: String,
}

/// Turn segmentation mode. Only server-side detection is requested.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum TurnDetection {
    #[serde(rename = "server_vad")]
    ServerVad {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        threshold: Option<f32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        silence_duration_ms: Option<u32>,
        /// Let the service answer as soon as a user turn ends
        #[serde(default, skip_serializing_if = "Option::is_none")]
        create_response: Option<bool>,
    },
}

/// Item as it appears on the wire, both in `conversation.item.create` and in
/// `conversation.item.created`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConversationItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub item_type: String,
    /// `user` items are shown on the user side of the transcript; anything
    /// else is rendered as the assistant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Only the first part is looked at when rebuilding the conversation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContentPart {
    #[serde(rename = "type", default)]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Present on audio parts when the service already transcribed them.
    /// Such a transcript is provisional until transcription completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

/// Content part type for captured user audio.
pub const CONTENT_INPUT_AUDIO: &str = "input_audio";

/// Content part type for typed user text.
pub const CONTENT_INPUT_TEXT: &str = "input_text";

/// Per-response overrides for `response.create`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResponseConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
}

/// Everything this client writes to the data channel.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Sent once per channel open
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },

    /// One captured frame, base64 PCM16
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },

    /// Closes the user turn when recording stops
    #[serde(rename = "input_audio_buffer.commit")]
    InputAudioBufferCommit,

    /// Typed user message, chained after the last known item
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate {
        /// Serialized as `null` when there is no previous item
        previous_item_id: Option<String>,
        item: ConversationItem,
    },

    /// Asks for an answer to a typed message
    #[serde(rename = "response.create")]
    ResponseCreate {
        #[serde(skip_serializing_if = "Option::is_none")]
        response: Option<ResponseConfig>,
    },
}

impl ClientEvent {
    pub fn audio_append(data: &[u8]) -> Self {
        ClientEvent::InputAudioBufferAppend {
            audio: BASE64_STANDARD.encode(data),
        }
    }

    pub fn user_text(item_id: String, text: &str, previous_item_id: Option<String>) -> Self {
        ClientEvent::ConversationItemCreate {
            previous_item_id,
            item: ConversationItem {
                id: Some(item_id),
                item_type: "message".to_string(),
                role: Some("user".to_string()),
                content: vec![ContentPart {
                    content_type: CONTENT_INPUT_TEXT.to_string(),
                    text: Some(text.to_string()),
                    ..Default::default()
                }],
            },
        }
    }

    /// Wire `type` tag of this event.
    pub fn type_name(&self) -> &'static str {
        match self {
            ClientEvent::SessionUpdate { .. } => "session.update",
            ClientEvent::InputAudioBufferAppend { .. } => "input_audio_buffer.append",
            ClientEvent::InputAudioBufferCommit => "input_audio_buffer.commit",
            ClientEvent::ConversationItemCreate { .. } => "conversation.item.create",
            ClientEvent::ResponseCreate { .. } => "response.create",
        }
    }
}

/// A client event stamped with its locally traceable `event_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundEvent {
    pub event_id: String,
    pub event: ClientEvent,
}

impl OutboundEvent {
    pub fn new(event_id: String, event: ClientEvent) -> Self {
        Self { event_id, event }
    }

    /// Serialize to the wire JSON object.
    pub fn to_json(&self) -> RealtimeResult<String> {
        let mut value = serde_json::to_value(&self.event)
            .map_err(|e| RealtimeError::InvalidConfiguration(e.to_string()))?;
        if let Some(map) = value.as_object_mut() {
            map.insert(
                "event_id".to_string(),
                serde_json::Value::String(self.event_id.clone()),
            );
        }
        serde_json::to_string(&value).map_err(|e| RealtimeError::InvalidConfiguration(e.to_string()))
    }
}

/// Inbound events the engine acts on or logs.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Surfaced to the display, never fatal
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        error: ApiError,
    },

    #[serde(rename = "session.created")]
    SessionCreated {
        #[serde(default)]
        session: SessionInfo,
    },

    #[serde(rename = "session.updated")]
    SessionUpdated {
        #[serde(default)]
        session: SessionInfo,
    },

    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted {
        #[serde(default)]
        audio_start_ms: u64,
    },

    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped {
        #[serde(default)]
        audio_end_ms: u64,
    },

    /// Logged only; the user turn appears through `conversation.item.created`
    #[serde(rename = "input_audio_buffer.committed")]
    InputAudioBufferCommitted {
        #[serde(default)]
        item_id: Option<String>,
    },

    #[serde(rename = "input_audio_buffer.cleared")]
    InputAudioBufferCleared,

    /// Starts a turn: placeholder for audio, final text for messages
    #[serde(rename = "conversation.item.created")]
    ConversationItemCreated { item: ConversationItem },

    /// Final user transcript
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    TranscriptionCompleted {
        item_id: String,
        #[serde(default)]
        transcript: String,
    },

    #[serde(rename = "conversation.item.input_audio_transcription.failed")]
    TranscriptionFailed {
        item_id: String,
        #[serde(default)]
        error: ApiError,
    },

    #[serde(rename = "response.created")]
    ResponseCreated {
        #[serde(default)]
        response: ResponseInfo,
    },

    #[serde(rename = "response.done")]
    ResponseDone {
        #[serde(default)]
        response: ResponseInfo,
    },

    #[serde(rename = "response.text.delta")]
    TextDelta {
        item_id: String,
        #[serde(default)]
        delta: String,
    },

    /// `text` is used only when no deltas arrived for the item
    #[serde(rename = "response.text.done")]
    TextDone {
        item_id: String,
        #[serde(default)]
        text: Option<String>,
    },

    #[serde(rename = "response.audio_transcript.delta")]
    AudioTranscriptDelta {
        item_id: String,
        #[serde(default)]
        delta: String,
    },

    /// Same rule as [`ServerEvent::TextDone`]
    #[serde(rename = "response.audio_transcript.done")]
    AudioTranscriptDone {
        item_id: String,
        #[serde(default)]
        transcript: Option<String>,
    },

    /// Only pulses the activity indicator; playback rides the media track
    #[serde(rename = "response.audio.delta")]
    AudioDelta,

    #[serde(other)]
    Unknown,
}

/// Error object carried by `error` and `...transcription.failed`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ApiError {
    #[serde(rename = "type", default)]
    pub error_type: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl From<ApiError> for RealtimeError {
    fn from(error: ApiError) -> Self {
        let message = if error.message.is_empty() {
            "Unknown error".to_string()
        } else {
            error.message
        };
        RealtimeError::RemoteProtocolError {
            code: error.code.or(if error.error_type.is_empty() {
                None
            } else {
                Some(error.error_type)
            }),
            message,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SessionInfo {
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ResponseInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn wire(event: ClientEvent) -> Value {
        let json = OutboundEvent::new("event_1".to_string(), event)
            .to_json()
            .unwrap();
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn test_commit_carries_type_and_event_id() {
        let value = wire(ClientEvent::InputAudioBufferCommit);
        assert_eq!(value["type"], "input_audio_buffer.commit");
        assert_eq!(value["event_id"], "event_1");
        assert_eq!(value.as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_audio_append() {
        let data = vec![0u8, 1, 2, 3];
        let event = ClientEvent::audio_append(&data);
        match &event {
            ClientEvent::InputAudioBufferAppend { audio } => {
                let decoded = BASE64_STANDARD.decode(audio).unwrap();
                assert_eq!(decoded, data);
            }
            _ => panic!("Wrong event type"),
        }
        assert_eq!(wire(event)["type"], "input_audio_buffer.append");
    }

    #[test]
    fn test_session_update_shape() {
        let value = wire(ClientEvent::SessionUpdate {
            session: SessionConfig {
                modalities: Some(vec!["text".to_string(), "audio".to_string()]),
                voice: Some("verse".to_string()),
                input_audio_format: Some("pcm16".to_string()),
                output_audio_format: Some("pcm16".to_string()),
                input_audio_transcription: Some(InputAudioTranscription {
                    model: "whisper-1".to_string(),
                }),
                turn_detection: Some(TurnDetection::ServerVad {
                    threshold: Some(0.5),
                    silence_duration_ms: Some(500),
                    create_response: Some(true),
                }),
                instructions: None,
            },
        });
        assert_eq!(value["type"], "session.update");
        assert_eq!(value["session"]["modalities"][1], "audio");
        assert_eq!(value["session"]["input_audio_transcription"]["model"], "whisper-1");
        assert_eq!(value["session"]["turn_detection"]["type"], "server_vad");
        assert_eq!(value["session"]["turn_detection"]["silence_duration_ms"], 500);
        assert!(value["session"].get("instructions").is_none());
    }

    #[test]
    fn test_user_text_item() {
        let value = wire(ClientEvent::user_text(
            "msg_1".to_string(),
            "hello",
            Some("item_prev".to_string()),
        ));
        assert_eq!(value["type"], "conversation.item.create");
        assert_eq!(value["previous_item_id"], "item_prev");
        assert_eq!(value["item"]["id"], "msg_1");
        assert_eq!(value["item"]["type"], "message");
        assert_eq!(value["item"]["role"], "user");
        assert_eq!(value["item"]["content"][0]["type"], "input_text");
        assert_eq!(value["item"]["content"][0]["text"], "hello");
    }

    #[test]
    fn test_user_text_without_previous_item_sends_null() {
        let value = wire(ClientEvent::user_text("msg_1".to_string(), "hi", None));
        assert!(value["previous_item_id"].is_null());
    }

    #[test]
    fn test_error_event_deserialization() {
        let json = r#"{
            "type": "error",
            "error": {
                "type": "invalid_request_error",
                "code": "invalid_value",
                "message": "Test error"
            }
        }"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        match event {
            ServerEvent::Error { error } => {
                assert_eq!(error.message, "Test error");
                let err: RealtimeError = error.into();
                assert_eq!(
                    err,
                    RealtimeError::RemoteProtocolError {
                        code: Some("invalid_value".to_string()),
                        message: "Test error".to_string()
                    }
                );
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_item_created_with_transcript() {
        let json = r#"{
            "type": "conversation.item.created",
            "event_id": "event_9",
            "previous_item_id": null,
            "item": {
                "id": "item_A",
                "object": "realtime.item",
                "type": "message",
                "status": "completed",
                "role": "user",
                "content": [{"type": "input_audio", "transcript": "hi"}]
            }
        }"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        match event {
            ServerEvent::ConversationItemCreated { item, .. } => {
                assert_eq!(item.id.as_deref(), Some("item_A"));
                assert_eq!(item.content[0].content_type, CONTENT_INPUT_AUDIO);
                assert_eq!(item.content[0].transcript.as_deref(), Some("hi"));
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_unknown_type_is_not_an_error() {
        for json in [
            r#"{"type": "response.output_item.added", "item": {}}"#,
            r#"{"type": "rate_limits.updated", "rate_limits": []}"#,
        ] {
            let event: ServerEvent = serde_json::from_str(json).unwrap();
            assert_eq!(event, ServerEvent::Unknown);
        }
    }

    #[test]
    fn test_audio_delta_ignores_payload() {
        let json = r#"{"type": "response.audio.delta", "response_id": "r", "item_id": "B", "delta": "AAAA"}"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event, ServerEvent::AudioDelta);
    }

    #[test]
    fn test_transcript_done_without_transcript_field() {
        let json = r#"{"type": "response.audio_transcript.done", "item_id": "B"}"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            ServerEvent::AudioTranscriptDone {
                item_id: "B".to_string(),
                transcript: None
            }
        );
    }

    #[test]
    fn test_missing_required_field_fails() {
        let json = r#"{"type": "response.audio_transcript.delta", "delta": "x"}"#;
        assert!(serde_json::from_str::<ServerEvent>(json).is_err());
    }
}
