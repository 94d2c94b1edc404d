use crate::completion::TextCompleter;
use crate::config::CompletionConfig;
use crate::relay::RelaySettings;
use crate::upstream::UpstreamConnector;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Opens one upstream per recording
    pub connector: Arc<dyn UpstreamConnector>,

    /// Settings handed to every new relay session
    pub relay: RelaySettings,

    /// Backend for the text endpoints
    pub completer: Arc<dyn TextCompleter>,

    /// Model names for the text endpoints
    pub completion: CompletionConfig,
}

impl AppState {
    pub fn new(
        connector: Arc<dyn UpstreamConnector>,
        relay: RelaySettings,
        completer: Arc<dyn TextCompleter>,
        completion: CompletionConfig,
    ) -> Self {
        Self {
            connector,
            relay,
            completer,
            completion,
        }
    }
}
