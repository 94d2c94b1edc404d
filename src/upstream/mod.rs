//! Connection to the realtime speech/text backend
//!
//! This module provides:
//! - `Upstream`: the operations a relay session needs from one live backend
//!   connection (send/commit/clear audio, start a response, close)
//! - `UpstreamConnector`: factory that performs the handshake
//! - `RealtimeClient`: the WebSocket implementation of both
//! - `EventRouter`: tag → handler dispatch for inbound events

pub mod client;
pub mod messages;
pub mod router;

use std::sync::Arc;

use crate::error::Result;

pub use client::{RealtimeClient, RealtimeConnector};
pub use messages::{EventTag, Modality, OutboundEvent, UpstreamEvent};
pub use router::{EventHandler, EventRouter, LoggingHandler};

/// One live connection to the backend, owned by a single relay session
#[async_trait::async_trait]
pub trait Upstream: Send + Sync {
    /// Backend-assigned session identifier
    fn session_id(&self) -> Option<String>;

    /// Install or replace the handler for `tag`
    fn register_handler(&self, tag: EventTag, handler: Arc<dyn EventHandler>);

    /// Append PCM (already at the target rate) to the backend input buffer
    async fn send_audio(&self, pcm: &[u8]) -> Result<()>;

    /// Mark the end of the utterance.
    ///
    /// Callers must only commit after every `send_audio` for the utterance has
    /// returned: the backend cannot add late audio to a committed turn.
    async fn commit_audio(&self) -> Result<()>;

    /// Discard buffered, uncommitted input audio
    async fn clear_audio_buffer(&self) -> Result<()>;

    /// Ask for a text-only response with the given instructions
    async fn start_response(&self, instructions: &str) -> Result<()>;

    /// Close the connection and stop the receive loop; idempotent
    async fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Opens new `Upstream` connections
#[async_trait::async_trait]
pub trait UpstreamConnector: Send + Sync {
    /// Connect and complete the handshake.
    ///
    /// `router` is installed before the receive loop starts, so no event can
    /// arrive ahead of its handler.
    async fn connect(
        &self,
        modalities: &[Modality],
        router: Arc<EventRouter>,
    ) -> Result<Arc<dyn Upstream>>;
}
