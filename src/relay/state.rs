use std::fmt;

/// Recording lifecycle of one relay session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    /// Upstream handshake in progress; audio goes to the pre-roll buffer
    Connecting,
    /// Audio is forwarded upstream as it arrives
    Recording,
    /// Stop received; flushing, committing and streaming the response
    AwaitingResponse,
    /// Client gone; terminal
    Closed,
}

impl ConnectionState {
    pub fn is_closed(self) -> bool {
        self == ConnectionState::Closed
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Recording => "recording",
            ConnectionState::AwaitingResponse => "awaiting_response",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}
