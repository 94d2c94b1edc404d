use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};

/// Control messages sent by the browser as WebSocket text frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    StartRecording,
    StopRecording,
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| RelayError::MalformedFrame(format!("invalid control message: {}", e)))
    }
}

/// Recorder state shown by the client UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderStatus {
    Idle,
    Connecting,
    Connected,
}

/// Events sent to the browser as WebSocket text frames
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Status {
        status: RecorderStatus,
    },
    Text {
        content: String,
        /// True only for the empty marker that opens a new response
        #[serde(rename = "isNewResponse")]
        is_new_response: bool,
    },
    Error {
        content: String,
    },
}

impl ServerEvent {
    pub fn status(status: RecorderStatus) -> Self {
        ServerEvent::Status { status }
    }

    pub fn new_response() -> Self {
        ServerEvent::Text {
            content: String::new(),
            is_new_response: true,
        }
    }

    pub fn delta(content: impl Into<String>) -> Self {
        ServerEvent::Text {
            content: content.into(),
            is_new_response: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        ServerEvent::Error {
            content: content.into(),
        }
    }
}
