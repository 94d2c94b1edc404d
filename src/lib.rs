pub mod audio;
pub mod completion;
pub mod config;
pub mod error;
pub mod http;
pub mod relay;
pub mod upstream;

pub use audio::{resample, AudioFrame};
pub use completion::{OpenAiCompleter, TextCompleter};
pub use crate::config::Config;
pub use error::{RelayError, Result};
pub use http::{create_router, AppState};
pub use relay::{
    ClientMessage, ConnectionState, RecorderStatus, RelaySession, RelaySettings, ServerEvent,
};
pub use upstream::{
    EventRouter, EventTag, RealtimeClient, RealtimeConnector, Upstream, UpstreamConnector,
    UpstreamEvent,
};
