use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::config::RelaySettings;
use super::messages::{ClientMessage, RecorderStatus, ServerEvent};
use super::pending::{FlushOutcome, PendingAudioOps, PendingTicket};
use super::state::ConnectionState;
use crate::audio::AudioFrame;
use crate::error::RelayError;
use crate::upstream::{EventHandler, EventRouter, EventTag, Upstream, UpstreamConnector, UpstreamEvent};

/// What happened to one binary frame from the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioDisposition {
    /// Counted and handed to the forwarder
    Queued,
    /// Held in the pre-roll buffer until the upstream is ready
    Buffered,
    /// Not recording; discarded
    Dropped,
    /// Not valid PCM; discarded
    Rejected,
}

/// Frame waiting for the forwarder, bound to the upstream it was recorded for
struct QueuedAudio {
    pcm: Vec<u8>,
    upstream: Arc<dyn Upstream>,
    ticket: PendingTicket,
}

/// State guarded by the session lock; never held across an await
struct Core {
    state: ConnectionState,
    upstream: Option<Arc<dyn Upstream>>,
    pre_roll: Vec<Vec<u8>>,
    /// Stop arrived while the upstream was still connecting
    stop_requested: bool,
}

/// One browser client's recording session
pub struct RelaySession {
    /// Connection identifier, used in logs
    id: String,

    settings: RelaySettings,

    /// Opens the upstream on each start_recording
    connector: Arc<dyn UpstreamConnector>,

    /// Outbound events, drained by the connection's writer loop
    events: mpsc::Sender<ServerEvent>,

    core: Mutex<Core>,

    /// Mirrors `core.state` for tasks that wait on transitions
    state_tx: watch::Sender<ConnectionState>,

    /// Queued or in-flight upstream audio sends
    pending: PendingAudioOps,

    /// FIFO into the single audio forwarder
    audio_tx: mpsc::UnboundedSender<QueuedAudio>,

    /// Forwarder, connect and stop tasks; aborted on close
    tasks: Mutex<JoinSet<()>>,

    closed: AtomicBool,
}

impl RelaySession {
    /// Create an Idle session, start its audio forwarder and greet the client
    pub async fn open(
        id: String,
        settings: RelaySettings,
        connector: Arc<dyn UpstreamConnector>,
        events: mpsc::Sender<ServerEvent>,
    ) -> Arc<Self> {
        let (audio_tx, audio_rx) = mpsc::unbounded_channel();
        let pending = PendingAudioOps::new();
        let (state_tx, _state_rx) = watch::channel(ConnectionState::Idle);

        let mut tasks = JoinSet::new();
        tasks.spawn(forward_audio(audio_rx, pending.clone(), id.clone()));

        let session = Arc::new(Self {
            id,
            settings,
            connector,
            events,
            core: Mutex::new(Core {
                state: ConnectionState::Idle,
                upstream: None,
                pre_roll: Vec::new(),
                stop_requested: false,
            }),
            state_tx,
            pending,
            audio_tx,
            tasks: Mutex::new(tasks),
            closed: AtomicBool::new(false),
        });

        info!("Relay session {} opened", session.id);
        session.emit(ServerEvent::status(RecorderStatus::Idle)).await;
        session
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.core.lock().state
    }

    /// Number of audio sends queued or in flight
    pub fn pending_ops(&self) -> usize {
        self.pending.count()
    }

    pub fn pre_roll_len(&self) -> usize {
        self.core.lock().pre_roll.len()
    }

    pub fn has_upstream(&self) -> bool {
        self.core.lock().upstream.is_some()
    }

    /// Wait until the session reaches `target`; false on timeout
    pub async fn wait_for_state(&self, target: ConnectionState, timeout: Duration) -> bool {
        let mut rx = self.state_tx.subscribe();
        let reached = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|s| *s == target)).await,
            Ok(Ok(_))
        );
        reached
    }

    /// Handle a parsed text frame from the client
    pub async fn handle_control(self: &Arc<Self>, message: ClientMessage) {
        debug!("Session {}: control message {:?}", self.id, message);
        match message {
            ClientMessage::StartRecording => self.start_recording().await,
            ClientMessage::StopRecording => self.stop_recording().await,
        }
    }

    /// Accept one binary PCM frame from the client
    pub fn accept_audio(&self, pcm: Vec<u8>) -> AudioDisposition {
        if pcm.is_empty() {
            debug!("Session {}: empty audio frame ignored", self.id);
            return AudioDisposition::Dropped;
        }

        let frame = AudioFrame {
            pcm,
            source_rate: self.settings.source_rate,
            target_rate: self.settings.target_rate,
        };
        let resampled = match frame.resampled() {
            Ok(resampled) => resampled,
            Err(e) => {
                warn!("Session {}: ignoring audio frame: {}", self.id, e);
                return AudioDisposition::Rejected;
            }
        };

        let mut core = self.core.lock();
        let state = core.state;
        match state {
            ConnectionState::Connecting => {
                core.pre_roll.push(resampled);
                AudioDisposition::Buffered
            }
            ConnectionState::Recording => match core.upstream.clone() {
                Some(upstream) => {
                    self.enqueue(&upstream, resampled);
                    AudioDisposition::Queued
                }
                None => AudioDisposition::Dropped,
            },
            state => {
                debug!(
                    "Session {}: dropping {:.1}ms of audio in state {}",
                    self.id,
                    frame.duration_ms(),
                    state
                );
                AudioDisposition::Dropped
            }
        }
    }

    /// Begin an utterance: connect upstream and start forwarding audio
    pub async fn start_recording(self: &Arc<Self>) {
        let rejected = {
            let mut core = self.core.lock();
            let state = core.state;
            match state {
                ConnectionState::Idle => {
                    core.pre_roll.clear();
                    core.stop_requested = false;
                    self.set_state(&mut core, ConnectionState::Connecting);
                    None
                }
                state => Some(state),
            }
        };

        match rejected {
            None => {
                info!("Session {}: start recording", self.id);
                self.emit(ServerEvent::status(RecorderStatus::Connecting))
                    .await;
                let session = Arc::clone(self);
                self.spawn(async move { session.establish_upstream().await });
            }
            Some(ConnectionState::AwaitingResponse) => {
                warn!(
                    "Session {}: start_recording while a response is pending",
                    self.id
                );
                self.emit(ServerEvent::error(
                    "Still waiting for the previous response; try again when it finishes",
                ))
                .await;
            }
            Some(state) => {
                warn!(
                    "Session {}: start_recording ignored in state {}",
                    self.id, state
                );
            }
        }
    }

    /// End the utterance: flush audio, commit and request a response
    pub async fn stop_recording(self: &Arc<Self>) {
        enum StopAction {
            Finish(Arc<dyn Upstream>),
            Deferred,
            Lost,
            Ignored(ConnectionState),
        }

        let action = {
            let mut core = self.core.lock();
            let state = core.state;
            match state {
                ConnectionState::Recording => match core.upstream.clone() {
                    Some(upstream) => {
                        self.set_state(&mut core, ConnectionState::AwaitingResponse);
                        StopAction::Finish(upstream)
                    }
                    None => {
                        self.set_state(&mut core, ConnectionState::Idle);
                        StopAction::Lost
                    }
                },
                ConnectionState::Connecting => {
                    core.stop_requested = true;
                    StopAction::Deferred
                }
                state => StopAction::Ignored(state),
            }
        };

        match action {
            StopAction::Finish(upstream) => {
                info!("Session {}: stop recording", self.id);
                let session = Arc::clone(self);
                self.spawn(async move { session.finish_utterance(upstream).await });
            }
            StopAction::Deferred => {
                info!(
                    "Session {}: stop received while connecting; will stop once connected",
                    self.id
                );
            }
            StopAction::Lost => {
                self.emit(ServerEvent::status(RecorderStatus::Idle)).await;
            }
            StopAction::Ignored(state) => {
                warn!(
                    "Session {}: stop_recording ignored in state {}",
                    self.id, state
                );
            }
        }
    }

    /// Stop accepting frames, abort session tasks and close the upstream; idempotent
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let upstream = {
            let mut core = self.core.lock();
            core.pre_roll.clear();
            self.set_state(&mut core, ConnectionState::Closed);
            core.upstream.take()
        };

        self.tasks.lock().abort_all();

        if let Some(upstream) = upstream {
            upstream.close().await;
        }

        info!("Relay session {} closed", self.id);
    }

    async fn establish_upstream(self: Arc<Self>) {
        let existing = {
            let core = self.core.lock();
            core.upstream.clone().filter(|u| !u.is_closed())
        };

        let upstream = match existing {
            Some(upstream) => upstream,
            None => {
                let router = Arc::new(EventRouter::new());
                let handler: Arc<dyn EventHandler> = Arc::new(RelayEventHandler {
                    session: Arc::downgrade(&self),
                });
                for tag in [
                    EventTag::ResponseCreated,
                    EventTag::ResponseTextDelta,
                    EventTag::ResponseDone,
                    EventTag::Error,
                    EventTag::Disconnected,
                ] {
                    router.register(tag, Arc::clone(&handler));
                }

                match self
                    .connector
                    .connect(&self.settings.modalities, router)
                    .await
                {
                    Ok(upstream) => upstream,
                    Err(e) => {
                        self.fail_connect(e).await;
                        return;
                    }
                }
            }
        };

        if let Err(e) = upstream.clear_audio_buffer().await {
            upstream.close().await;
            self.fail_connect(e).await;
            return;
        }

        let ready = {
            let mut core = self.core.lock();
            if core.state != ConnectionState::Connecting {
                None
            } else {
                core.upstream = Some(Arc::clone(&upstream));
                self.set_state(&mut core, ConnectionState::Recording);

                // Pre-roll goes ahead of any live frame: both enqueue under this lock
                let pre_roll = std::mem::take(&mut core.pre_roll);
                let buffered = pre_roll.len();
                for pcm in pre_roll {
                    self.enqueue(&upstream, pcm);
                }
                Some((buffered, std::mem::take(&mut core.stop_requested)))
            }
        };

        let Some((buffered, stop_requested)) = ready else {
            debug!(
                "Session {}: upstream ready after session left Connecting",
                self.id
            );
            upstream.close().await;
            return;
        };

        info!(
            "Session {}: upstream session {} ready, forwarding {} pre-roll frame(s)",
            self.id,
            upstream.session_id().unwrap_or_default(),
            buffered
        );
        self.emit(ServerEvent::status(RecorderStatus::Connected))
            .await;

        if stop_requested {
            self.stop_recording().await;
        }
    }

    async fn fail_connect(&self, err: RelayError) {
        error!("Session {}: upstream connection failed: {}", self.id, err);
        {
            let mut core = self.core.lock();
            if core.state != ConnectionState::Connecting {
                return;
            }
            core.pre_roll.clear();
            core.stop_requested = false;
            self.set_state(&mut core, ConnectionState::Idle);
        }
        self.emit(ServerEvent::error(format!(
            "Failed to connect to the realtime backend: {}",
            err
        )))
        .await;
        self.emit(ServerEvent::status(RecorderStatus::Idle)).await;
    }

    async fn finish_utterance(self: Arc<Self>, upstream: Arc<dyn Upstream>) {
        match self.pending.wait_flushed(self.settings.flush_timeout).await {
            FlushOutcome::Flushed => debug!("Session {}: audio flushed", self.id),
            FlushOutcome::TimedOut { abandoned } => debug!(
                "Session {}: {}",
                self.id,
                RelayError::FlushTimeout { abandoned }
            ),
        }

        // Commit, response.create and response.done share one deadline
        let mut rx = self.state_tx.subscribe();
        let exchange = async {
            upstream.commit_audio().await?;
            upstream.start_response(&self.settings.instructions).await?;
            let _ = rx
                .wait_for(|s| *s != ConnectionState::AwaitingResponse)
                .await;
            Ok::<(), RelayError>(())
        };

        match tokio::time::timeout(self.settings.response_timeout, exchange).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self.abort_response(&upstream, e).await,
            Err(_) => {
                self.abort_response(&upstream, RelayError::ResponseTimeout)
                    .await
            }
        }
    }

    /// Give up on the current response: report, reset to Idle, drop the upstream
    async fn abort_response(&self, upstream: &Arc<dyn Upstream>, err: RelayError) {
        error!("Session {}: response failed: {}", self.id, err);

        let owned = {
            let mut core = self.core.lock();
            let current = core
                .upstream
                .as_ref()
                .is_some_and(|u| same_upstream(u, upstream));
            if current {
                core.upstream = None;
                if core.state == ConnectionState::AwaitingResponse {
                    self.set_state(&mut core, ConnectionState::Idle);
                }
            }
            current
        };

        if owned {
            self.emit(ServerEvent::error(err.to_string())).await;
            self.emit(ServerEvent::status(RecorderStatus::Idle)).await;
        }
        upstream.close().await;
    }

    async fn on_upstream_event(&self, event: UpstreamEvent) {
        match event {
            UpstreamEvent::ResponseCreated => {
                debug!("Session {}: response started", self.id);
                self.emit(ServerEvent::new_response()).await;
            }
            UpstreamEvent::ResponseTextDelta { delta } => {
                self.emit(ServerEvent::delta(delta)).await;
            }
            UpstreamEvent::Error { message } => {
                warn!("Session {}: upstream error: {}", self.id, message);
                self.emit(ServerEvent::error(message)).await;
            }
            UpstreamEvent::ResponseDone => self.finish_response().await,
            UpstreamEvent::Disconnected { reason } => self.upstream_lost(reason).await,
            other => debug!("Session {}: ignoring {}", self.id, other.kind()),
        }
    }

    async fn finish_response(&self) {
        let upstream = {
            let mut core = self.core.lock();
            let upstream = core.upstream.take();
            if !core.state.is_closed() {
                self.set_state(&mut core, ConnectionState::Idle);
            }
            upstream
        };

        info!("Session {}: response done", self.id);
        self.emit(ServerEvent::status(RecorderStatus::Idle)).await;

        // Runs on the upstream's own receive task; closing it must come last
        if let Some(upstream) = upstream {
            upstream.close().await;
        }
    }

    async fn upstream_lost(&self, reason: String) {
        let upstream = {
            let mut core = self.core.lock();
            let upstream = core.upstream.take();
            if upstream.is_some() && !core.state.is_closed() {
                core.pre_roll.clear();
                self.set_state(&mut core, ConnectionState::Idle);
            }
            upstream
        };

        let Some(upstream) = upstream else {
            debug!(
                "Session {}: stale upstream disconnect ignored: {}",
                self.id, reason
            );
            return;
        };

        self.emit(ServerEvent::error(format!(
            "upstream connection lost: {}",
            reason
        )))
        .await;
        self.emit(ServerEvent::status(RecorderStatus::Idle)).await;
        upstream.close().await;
    }

    /// Count and queue one frame; caller holds the core lock
    fn enqueue(&self, upstream: &Arc<dyn Upstream>, pcm: Vec<u8>) {
        let ticket = self.pending.increment();
        let backlog = self.pending.count();
        if backlog == self.settings.audio_backlog_warn {
            warn!(
                backlog,
                "Session {}: {} audio frames waiting on a slow upstream", self.id, backlog
            );
        }
        let queued = QueuedAudio {
            pcm,
            upstream: Arc::clone(upstream),
            ticket,
        };
        if let Err(mpsc::error::SendError(lost)) = self.audio_tx.send(queued) {
            warn!("Session {}: audio forwarder has stopped", self.id);
            self.pending.complete(lost.ticket);
        }
    }

    fn set_state(&self, core: &mut Core, next: ConnectionState) {
        if core.state != next {
            debug!("Session {}: {} -> {}", self.id, core.state, next);
        }
        core.state = next;
        self.state_tx.send_replace(next);
    }

    async fn emit(&self, event: ServerEvent) {
        if self.events.send(event).await.is_err() {
            debug!("Session {}: client event channel closed", self.id);
        }
    }

    /// Run `task` in the session scope, reaping finished tasks first
    fn spawn<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let mut tasks = self.tasks.lock();
        while let Some(result) = tasks.try_join_next() {
            if let Err(e) = result {
                if e.is_panic() {
                    error!("Session {}: task panicked: {}", self.id, e);
                }
            }
        }
        tasks.spawn(task);
    }
}

/// Send queued frames upstream one at a time, in queue order.
/// Frames from a retired epoch are never sent: their turn is already committed.
async fn forward_audio(
    mut rx: mpsc::UnboundedReceiver<QueuedAudio>,
    pending: PendingAudioOps,
    session_id: String,
) {
    debug!("Session {}: audio forwarder started", session_id);

    while let Some(item) = rx.recv().await {
        if !pending.is_current(item.ticket) {
            debug!(
                "Session {}: skipping abandoned audio frame ({} bytes)",
                session_id,
                item.pcm.len()
            );
            continue;
        }

        tokio::select! {
            result = item.upstream.send_audio(&item.pcm) => {
                if let Err(e) = result {
                    warn!(
                        "Session {}: dropping audio frame ({} bytes): {}",
                        session_id,
                        item.pcm.len(),
                        e
                    );
                }
            }
            // Cancelling the send releases the upstream for the commit
            _ = pending.retired(item.ticket) => {
                debug!(
                    "Session {}: in-flight audio send abandoned after flush timeout",
                    session_id
                );
            }
        }
        pending.complete(item.ticket);
    }

    debug!("Session {}: audio forwarder stopped", session_id);
}

fn same_upstream(a: &Arc<dyn Upstream>, b: &Arc<dyn Upstream>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Routes upstream events back into the owning session
struct RelayEventHandler {
    session: Weak<RelaySession>,
}

#[async_trait::async_trait]
impl EventHandler for RelayEventHandler {
    async fn handle(&self, event: UpstreamEvent) {
        match self.session.upgrade() {
            Some(session) => session.on_upstream_event(event).await,
            None => debug!("Upstream event {} after session ended", event.kind()),
        }
    }
}
