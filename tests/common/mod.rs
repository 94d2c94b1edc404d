#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use voice_relay::completion::{TextCompleter, TextStream};
use voice_relay::upstream::{EventHandler, EventRouter, EventTag, Modality, Upstream, UpstreamConnector, UpstreamEvent};
use voice_relay::{RelayError, RelaySettings, Result, ServerEvent};

/// One call made against a mock upstream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Append(Vec<u8>),
    Commit,
    Clear,
    ResponseCreate(String),
    Close,
}

#[derive(Debug, Clone, Default)]
pub struct MockOptions {
    /// Delay before each send_audio completes
    pub send_delay: Option<Duration>,
    /// Make send_audio fail
    pub fail_sends: bool,
    /// Make commit_audio fail
    pub fail_commit: bool,
    /// send_audio takes the wire and never returns
    pub hang_sends: bool,
    /// commit_audio never returns
    pub hang_commit: bool,
}

/// Upstream that records calls and lets tests inject events
pub struct MockUpstream {
    router: Arc<EventRouter>,
    calls: Mutex<Vec<Call>>,
    closed: AtomicBool,
    options: MockOptions,
    /// Serializes sends the way the real client's sink lock does
    wire: tokio::sync::Mutex<()>,
}

impl MockUpstream {
    pub fn new(router: Arc<EventRouter>, options: MockOptions) -> Self {
        Self {
            router,
            calls: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            options,
            wire: tokio::sync::Mutex::new(()),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn appended(&self) -> Vec<Vec<u8>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Append(pcm) => Some(pcm),
                _ => None,
            })
            .collect()
    }

    pub fn has_call(&self, call: &Call) -> bool {
        self.calls.lock().contains(call)
    }

    pub fn has_response_create(&self) -> bool {
        self.calls
            .lock()
            .iter()
            .any(|c| matches!(c, Call::ResponseCreate(_)))
    }

    /// Deliver an event the way the receive loop would
    pub async fn emit(&self, event: UpstreamEvent) {
        self.router.dispatch(event).await;
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(RelayError::NotConnected)
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl Upstream for MockUpstream {
    fn session_id(&self) -> Option<String> {
        Some("sess_mock".to_string())
    }

    fn register_handler(&self, tag: EventTag, handler: Arc<dyn EventHandler>) {
        self.router.register(tag, handler);
    }

    async fn send_audio(&self, pcm: &[u8]) -> Result<()> {
        let _wire = self.wire.lock().await;
        if self.options.hang_sends {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.options.send_delay {
            tokio::time::sleep(delay).await;
        }
        self.check_open()?;
        if self.options.fail_sends {
            return Err(RelayError::Connection("send failed".to_string()));
        }
        self.record(Call::Append(pcm.to_vec()));
        Ok(())
    }

    async fn commit_audio(&self) -> Result<()> {
        let _wire = self.wire.lock().await;
        if self.options.hang_commit {
            std::future::pending::<()>().await;
        }
        self.check_open()?;
        if self.options.fail_commit {
            return Err(RelayError::Connection("commit failed".to_string()));
        }
        self.record(Call::Commit);
        Ok(())
    }

    async fn clear_audio_buffer(&self) -> Result<()> {
        self.check_open()?;
        self.record(Call::Clear);
        Ok(())
    }

    async fn start_response(&self, instructions: &str) -> Result<()> {
        let _wire = self.wire.lock().await;
        self.check_open()?;
        self.record(Call::ResponseCreate(instructions.to_string()));
        Ok(())
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.record(Call::Close);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Connector handing out `MockUpstream`s
#[derive(Default)]
pub struct MockConnector {
    upstreams: Mutex<Vec<Arc<MockUpstream>>>,
    connects: AtomicUsize,
    fail: bool,
    /// When set, connect waits for `release()`
    gate: Option<Arc<Notify>>,
    options: MockOptions,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: MockOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Notify::new())),
            ..Self::default()
        }
    }

    /// Let one pending connect finish
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn latest(&self) -> Option<Arc<MockUpstream>> {
        self.upstreams.lock().last().cloned()
    }
}

#[async_trait::async_trait]
impl UpstreamConnector for MockConnector {
    async fn connect(
        &self,
        _modalities: &[Modality],
        router: Arc<EventRouter>,
    ) -> Result<Arc<dyn Upstream>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail {
            return Err(RelayError::Connection("connection refused".to_string()));
        }
        let upstream = Arc::new(MockUpstream::new(router, self.options.clone()));
        self.upstreams.lock().push(Arc::clone(&upstream));
        Ok(upstream)
    }
}

/// Completer that echoes its input
#[derive(Default)]
pub struct MockCompleter {
    pub calls: Mutex<Vec<(String, String, String)>>,
    pub fail: bool,
}

#[async_trait::async_trait]
impl TextCompleter for MockCompleter {
    async fn complete(&self, text: &str, prompt: &str, model: &str) -> Result<String> {
        self.calls
            .lock()
            .push((text.to_string(), prompt.to_string(), model.to_string()));
        if self.fail {
            return Err(RelayError::Completion("backend unavailable".to_string()));
        }
        Ok(format!("answer: {}", text))
    }

    async fn complete_stream(&self, text: &str, prompt: &str, model: &str) -> Result<TextStream> {
        self.calls
            .lock()
            .push((text.to_string(), prompt.to_string(), model.to_string()));
        if self.fail {
            return Err(RelayError::Completion("backend unavailable".to_string()));
        }
        let chunks = vec![Ok("Hello".to_string()), Ok(", ".to_string()), Ok(text.to_string())];
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

pub fn test_settings() -> RelaySettings {
    RelaySettings {
        flush_timeout: Duration::from_secs(2),
        response_timeout: Duration::from_secs(5),
        ..RelaySettings::default()
    }
}

/// 10ms of 48kHz PCM filled with `value`
pub fn pcm_frame(value: i16) -> Vec<u8> {
    std::iter::repeat(value)
        .take(480)
        .flat_map(|s| s.to_le_bytes())
        .collect()
}

/// Next client event, or panic after a second
pub async fn next_event(rx: &mut mpsc::Receiver<ServerEvent>) -> ServerEvent {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for client event")
        .expect("event channel closed")
}

/// True if no event arrives within a short window
pub async fn no_event(rx: &mut mpsc::Receiver<ServerEvent>) -> bool {
    tokio::time::timeout(Duration::from_millis(100), rx.recv())
        .await
        .is_err()
}

/// Poll `condition` until it holds, or panic
pub async fn wait_until<F: Fn() -> bool>(condition: F, what: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
