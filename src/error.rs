use thiserror::Error;

/// Errors produced by the relay core.
///
/// None of these escape a session loop: each one ends up as a log line, a
/// dropped frame, or an `error` event sent to the browser client.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Upstream handshake or transport failure.
    #[error("upstream connection error: {0}")]
    Connection(String),

    /// Operation attempted on a closed or not-yet-open upstream handle.
    #[error("upstream is not connected")]
    NotConnected,

    /// Unparseable control JSON, odd-length audio, or an undecodable event.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The pending-audio counter did not drain before the flush deadline.
    #[error("audio flush timed out with {abandoned} send(s) outstanding")]
    FlushTimeout { abandoned: usize },

    /// No `response.done` arrived before the response deadline.
    #[error("upstream response timed out")]
    ResponseTimeout,

    /// Error event reported by the upstream backend.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Text-completion collaborator failure.
    #[error("completion error: {0}")]
    Completion(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for RelayError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        RelayError::Connection(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
