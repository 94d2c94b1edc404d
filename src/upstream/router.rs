// Event routing for the upstream receive loop
//
// Handlers are keyed by `EventTag` and can be replaced at any time; the last
// registration for a tag wins. Anything without a dedicated handler goes to
// the `Fallback` entry, which logs by default.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use super::messages::{EventTag, UpstreamEvent};

/// Callback invoked for upstream events of one tag
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: UpstreamEvent);
}

/// Default fallback: log the event type and move on
pub struct LoggingHandler;

#[async_trait::async_trait]
impl EventHandler for LoggingHandler {
    async fn handle(&self, event: UpstreamEvent) {
        match &event {
            UpstreamEvent::SessionCreated { session_id } => {
                info!("Upstream session created: {}", session_id)
            }
            UpstreamEvent::Other { kind, .. } => info!("Upstream event {}", kind),
            other => warn!("Unhandled upstream event: {}", other.kind()),
        }
    }
}

pub struct EventRouter {
    handlers: RwLock<HashMap<EventTag, Arc<dyn EventHandler>>>,
}

impl EventRouter {
    pub fn new() -> Self {
        let mut handlers: HashMap<EventTag, Arc<dyn EventHandler>> = HashMap::new();
        handlers.insert(EventTag::Fallback, Arc::new(LoggingHandler));
        Self {
            handlers: RwLock::new(handlers),
        }
    }

    pub fn register(&self, tag: EventTag, handler: Arc<dyn EventHandler>) {
        self.handlers.write().insert(tag, handler);
    }

    /// Handler for `tag`, or the fallback
    pub fn handler_for(&self, tag: EventTag) -> Option<Arc<dyn EventHandler>> {
        let handlers = self.handlers.read();
        handlers
            .get(&tag)
            .or_else(|| handlers.get(&EventTag::Fallback))
            .cloned()
    }

    /// Run the matching handler to completion.
    ///
    /// The lock is released before the handler is awaited, so handlers may
    /// register or replace handlers themselves.
    pub async fn dispatch(&self, event: UpstreamEvent) {
        match self.handler_for(event.tag()) {
            Some(handler) => handler.handle(event).await,
            None => warn!("No handler for upstream event {}", event.kind()),
        }
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}
