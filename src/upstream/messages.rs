use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RelayError, Result};

/// Output/input modality declared to the realtime backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Audio,
}

/// Control frames sent to the realtime backend
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum OutboundEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionSettings },

    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend {
        /// Base64-encoded PCM bytes
        audio: String,
    },

    #[serde(rename = "input_audio_buffer.commit")]
    InputAudioBufferCommit,

    #[serde(rename = "input_audio_buffer.clear")]
    InputAudioBufferClear,

    #[serde(rename = "response.create")]
    ResponseCreate { response: ResponseSettings },
}

/// Body of the one-time `session.update` frame
#[derive(Debug, Clone, Serialize)]
pub struct SessionSettings {
    pub modalities: Vec<Modality>,
    pub input_audio_format: String,
    /// Always `null`: the relay does not want input transcription events
    pub input_audio_transcription: Option<Value>,
    /// Always `null`: utterance boundaries come from start/stop messages
    pub turn_detection: Option<Value>,
}

impl SessionSettings {
    pub fn relay_defaults(modalities: &[Modality]) -> Self {
        Self {
            modalities: modalities.to_vec(),
            input_audio_format: "pcm16".to_string(),
            input_audio_transcription: None,
            turn_detection: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseSettings {
    pub modalities: Vec<Modality>,
    pub instructions: String,
}

/// Handler-table key for an upstream event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTag {
    SessionCreated,
    ResponseCreated,
    ResponseTextDelta,
    ResponseDone,
    Error,
    /// Synthetic: the connection dropped without `close()` being called
    Disconnected,
    /// Reserved tag for everything without a dedicated handler
    Fallback,
}

/// Decoded frame received from the realtime backend
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    SessionCreated { session_id: String },
    ResponseCreated,
    ResponseTextDelta { delta: String },
    ResponseDone,
    Error { message: String },
    Disconnected { reason: String },
    /// Lifecycle events the relay only logs (`session.updated`, `rate_limits.updated`, ...)
    Other { kind: String, payload: Value },
}

impl UpstreamEvent {
    /// Decode one JSON text frame, dispatching on its `type` field
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| RelayError::MalformedFrame(format!("invalid upstream JSON: {}", e)))?;

        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| RelayError::MalformedFrame("upstream frame has no type".to_string()))?
            .to_string();

        let event = match kind.as_str() {
            "session.created" => {
                let session_id = value
                    .pointer("/session/id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        RelayError::MalformedFrame("session.created without session.id".to_string())
                    })?;
                UpstreamEvent::SessionCreated {
                    session_id: session_id.to_string(),
                }
            }
            "response.created" => UpstreamEvent::ResponseCreated,
            "response.text.delta" => UpstreamEvent::ResponseTextDelta {
                delta: value
                    .get("delta")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
            "response.done" => UpstreamEvent::ResponseDone,
            "error" => UpstreamEvent::Error {
                message: value
                    .pointer("/error/message")
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown error")
                    .to_string(),
            },
            _ => UpstreamEvent::Other {
                kind,
                payload: value,
            },
        };

        Ok(event)
    }

    pub fn tag(&self) -> EventTag {
        match self {
            UpstreamEvent::SessionCreated { .. } => EventTag::SessionCreated,
            UpstreamEvent::ResponseCreated => EventTag::ResponseCreated,
            UpstreamEvent::ResponseTextDelta { .. } => EventTag::ResponseTextDelta,
            UpstreamEvent::ResponseDone => EventTag::ResponseDone,
            UpstreamEvent::Error { .. } => EventTag::Error,
            UpstreamEvent::Disconnected { .. } => EventTag::Disconnected,
            UpstreamEvent::Other { .. } => EventTag::Fallback,
        }
    }

    /// Wire name, used in logs
    pub fn kind(&self) -> &str {
        match self {
            UpstreamEvent::SessionCreated { .. } => "session.created",
            UpstreamEvent::ResponseCreated => "response.created",
            UpstreamEvent::ResponseTextDelta { .. } => "response.text.delta",
            UpstreamEvent::ResponseDone => "response.done",
            UpstreamEvent::Error { .. } => "error",
            UpstreamEvent::Disconnected { .. } => "disconnected",
            UpstreamEvent::Other { kind, .. } => kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_update_shape() {
        let event = OutboundEvent::SessionUpdate {
            session: SessionSettings::relay_defaults(&[Modality::Text]),
        };
        let json: Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "session.update");
        assert_eq!(json["session"]["modalities"][0], "text");
        assert_eq!(json["session"]["input_audio_format"], "pcm16");
        assert!(json["session"]["turn_detection"].is_null());
        assert!(json["session"]["input_audio_transcription"].is_null());
    }

    #[test]
    fn test_unit_frames_carry_only_type() {
        let json = serde_json::to_string(&OutboundEvent::InputAudioBufferCommit).unwrap();
        assert_eq!(json, r#"{"type":"input_audio_buffer.commit"}"#);
        let json = serde_json::to_string(&OutboundEvent::InputAudioBufferClear).unwrap();
        assert_eq!(json, r#"{"type":"input_audio_buffer.clear"}"#);
    }

    #[test]
    fn test_parse_session_created() {
        let event =
            UpstreamEvent::parse(r#"{"type":"session.created","session":{"id":"sess_123"}}"#)
                .unwrap();
        assert_eq!(
            event,
            UpstreamEvent::SessionCreated {
                session_id: "sess_123".to_string()
            }
        );
        assert_eq!(event.tag(), EventTag::SessionCreated);
    }

    #[test]
    fn test_parse_error_message() {
        let event =
            UpstreamEvent::parse(r#"{"type":"error","error":{"message":"bad audio"}}"#).unwrap();
        assert_eq!(
            event,
            UpstreamEvent::Error {
                message: "bad audio".to_string()
            }
        );

        let event = UpstreamEvent::parse(r#"{"type":"error"}"#).unwrap();
        assert_eq!(
            event,
            UpstreamEvent::Error {
                message: "Unknown error".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_type_goes_to_fallback() {
        let event = UpstreamEvent::parse(r#"{"type":"rate_limits.updated","rate_limits":[]}"#)
            .unwrap();
        assert_eq!(event.tag(), EventTag::Fallback);
        assert_eq!(event.kind(), "rate_limits.updated");
    }

    #[test]
    fn test_missing_type_is_malformed() {
        assert!(matches!(
            UpstreamEvent::parse(r#"{"delta":"hi"}"#),
            Err(RelayError::MalformedFrame(_))
        ));
        assert!(matches!(
            UpstreamEvent::parse("not json"),
            Err(RelayError::MalformedFrame(_))
        ));
    }
}
