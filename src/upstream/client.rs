use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::messages::{
    EventTag, Modality, OutboundEvent, ResponseSettings, SessionSettings, UpstreamEvent,
};
use super::router::{EventHandler, EventRouter};
use super::{Upstream, UpstreamConnector};
use crate::config::UpstreamConfig;
use crate::error::{RelayError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Bound on the close handshake so a dead peer cannot stall cleanup
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientState {
    Unconnected,
    Connected,
    Closed,
}

/// WebSocket client for the realtime backend
pub struct RealtimeClient {
    url: String,
    model: String,
    api_key: String,
    connect_timeout: Duration,
    state: Arc<Mutex<ClientState>>,
    session_id: Mutex<Option<String>>,
    sink: tokio::sync::Mutex<Option<SplitSink<WsStream, Message>>>,
    router: Arc<EventRouter>,
    receive_task: Mutex<Option<JoinHandle<()>>>,
    close_requested: Arc<AtomicBool>,
}

impl RealtimeClient {
    pub fn new(config: &UpstreamConfig, api_key: String, router: Arc<EventRouter>) -> Self {
        Self {
            url: config.url.clone(),
            model: config.model.clone(),
            api_key,
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            state: Arc::new(Mutex::new(ClientState::Unconnected)),
            session_id: Mutex::new(None),
            sink: tokio::sync::Mutex::new(None),
            router,
            receive_task: Mutex::new(None),
            close_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Open the connection, wait for `session.created`, configure the session,
    /// then start the receive loop
    pub async fn connect(&self, modalities: &[Modality]) -> Result<()> {
        if *self.state.lock() != ClientState::Unconnected {
            return Err(RelayError::Connection(
                "client was already connected".to_string(),
            ));
        }

        let endpoint = format!("{}?model={}", self.url, self.model);
        info!("Connecting to realtime backend at {}", endpoint);

        let mut request = endpoint.as_str().into_client_request()?;
        let headers = request.headers_mut();
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| RelayError::Connection(format!("invalid API key header: {}", e)))?,
        );
        headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        let (ws, _response) =
            tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(request))
                .await
                .map_err(|_| RelayError::Connection("connect timed out".to_string()))??;

        let (mut sink, mut stream) = ws.split();

        let first = tokio::time::timeout(self.connect_timeout, stream.next())
            .await
            .map_err(|_| RelayError::Connection("no session.created before timeout".to_string()))?;

        let session_id = match first {
            Some(Ok(Message::Text(text))) => match UpstreamEvent::parse(&text) {
                Ok(UpstreamEvent::SessionCreated { session_id }) => session_id,
                Ok(other) => {
                    return Err(RelayError::Connection(format!(
                        "expected session.created, got {}",
                        other.kind()
                    )))
                }
                Err(e) => return Err(RelayError::Connection(e.to_string())),
            },
            Some(Ok(other)) => {
                return Err(RelayError::Connection(format!(
                    "expected session.created, got non-text frame {:?}",
                    other
                )))
            }
            Some(Err(e)) => return Err(e.into()),
            None => {
                return Err(RelayError::Connection(
                    "connection closed during handshake".to_string(),
                ))
            }
        };
        info!("Session created with ID: {}", session_id);

        let update = OutboundEvent::SessionUpdate {
            session: SessionSettings::relay_defaults(modalities),
        };
        sink.send(Message::Text(serde_json::to_string(&update)?))
            .await?;

        *self.session_id.lock() = Some(session_id);
        *self.sink.lock().await = Some(sink);
        *self.state.lock() = ClientState::Connected;

        let task = tokio::spawn(receive_loop(
            stream,
            Arc::clone(&self.router),
            Arc::clone(&self.state),
            Arc::clone(&self.close_requested),
        ));
        *self.receive_task.lock() = Some(task);

        Ok(())
    }

    async fn send(&self, event: &OutboundEvent) -> Result<()> {
        if *self.state.lock() != ClientState::Connected {
            return Err(RelayError::NotConnected);
        }
        let text = serde_json::to_string(event)?;
        let mut sink = self.sink.lock().await;
        let sink = sink.as_mut().ok_or(RelayError::NotConnected)?;
        sink.send(Message::Text(text)).await?;
        Ok(())
    }
}

async fn receive_loop(
    mut stream: SplitStream<WsStream>,
    router: Arc<EventRouter>,
    state: Arc<Mutex<ClientState>>,
    close_requested: Arc<AtomicBool>,
) {
    debug!("Upstream receive loop started");

    let reason = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => match UpstreamEvent::parse(&text) {
                // Handlers run one at a time, in arrival order
                Ok(event) => router.dispatch(event).await,
                Err(e) => warn!("Skipping upstream frame: {}", e),
            },
            Some(Ok(Message::Close(frame))) => {
                break format!("closed by backend: {:?}", frame);
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                error!("Upstream connection error: {}", e);
                break e.to_string();
            }
            None => break "stream ended".to_string(),
        }
    };

    *state.lock() = ClientState::Closed;

    if !close_requested.load(Ordering::SeqCst) {
        warn!("Upstream connection lost: {}", reason);
        router.dispatch(UpstreamEvent::Disconnected { reason }).await;
    }

    debug!("Upstream receive loop stopped");
}

#[async_trait::async_trait]
impl Upstream for RealtimeClient {
    fn session_id(&self) -> Option<String> {
        self.session_id.lock().clone()
    }

    fn register_handler(&self, tag: EventTag, handler: Arc<dyn EventHandler>) {
        self.router.register(tag, handler);
    }

    async fn send_audio(&self, pcm: &[u8]) -> Result<()> {
        let audio = base64::engine::general_purpose::STANDARD.encode(pcm);
        self.send(&OutboundEvent::InputAudioBufferAppend { audio })
            .await?;
        debug!("Sent input_audio_buffer.append ({} bytes)", pcm.len());
        Ok(())
    }

    async fn commit_audio(&self) -> Result<()> {
        self.send(&OutboundEvent::InputAudioBufferCommit).await?;
        info!("Sent input_audio_buffer.commit");
        Ok(())
    }

    async fn clear_audio_buffer(&self) -> Result<()> {
        self.send(&OutboundEvent::InputAudioBufferClear).await?;
        info!("Sent input_audio_buffer.clear");
        Ok(())
    }

    async fn start_response(&self, instructions: &str) -> Result<()> {
        self.send(&OutboundEvent::ResponseCreate {
            response: ResponseSettings {
                modalities: vec![Modality::Text],
                instructions: instructions.to_string(),
            },
        })
        .await?;
        info!("Sent response.create");
        Ok(())
    }

    async fn close(&self) {
        if self.close_requested.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.state.lock() = ClientState::Closed;

        if let Ok(mut guard) = tokio::time::timeout(CLOSE_TIMEOUT, self.sink.lock()).await {
            if let Some(mut sink) = guard.take() {
                if let Err(e) = tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await {
                    debug!("Upstream close handshake did not finish: {}", e);
                }
            }
        }

        // May be the current task when called from an event handler; the
        // abort then takes effect at the loop's next await.
        if let Some(task) = self.receive_task.lock().take() {
            task.abort();
        }

        info!("Closed upstream connection");
    }

    fn is_closed(&self) -> bool {
        *self.state.lock() == ClientState::Closed
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        if let Some(task) = self.receive_task.lock().take() {
            task.abort();
        }
    }
}

/// Creates `RealtimeClient`s from configuration
pub struct RealtimeConnector {
    config: UpstreamConfig,
    api_key: String,
}

impl RealtimeConnector {
    pub fn new(config: UpstreamConfig, api_key: String) -> Self {
        Self { config, api_key }
    }
}

#[async_trait::async_trait]
impl UpstreamConnector for RealtimeConnector {
    async fn connect(
        &self,
        modalities: &[Modality],
        router: Arc<EventRouter>,
    ) -> Result<Arc<dyn Upstream>> {
        let client = RealtimeClient::new(&self.config, self.api_key.clone(), router);
        client.connect(modalities).await?;
        Ok(Arc::new(client))
    }
}
