// Pending audio-send accounting
//
// Every frame handed to the forwarder takes a ticket; the forwarder completes
// the ticket once the upstream send returns, successfully or not. Commit waits
// until the outstanding count reaches zero. A forced reset (flush timeout)
// retires the current epoch so late completions of abandoned sends cannot
// eat into the next utterance's count, and tells the forwarder to drop
// whatever it still holds from that epoch.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Counter {
    outstanding: usize,
    epoch: u64,
}

/// Proof that one send was counted; hand back to `complete`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTicket {
    epoch: u64,
}

/// Result of waiting for queued audio to drain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    Flushed,
    TimedOut { abandoned: usize },
}

/// Counter of queued or in-flight upstream audio sends
#[derive(Debug, Clone)]
pub struct PendingAudioOps {
    tx: Arc<watch::Sender<Counter>>,
}

impl PendingAudioOps {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Counter::default());
        Self { tx: Arc::new(tx) }
    }

    /// Count one more queued send
    pub fn increment(&self) -> PendingTicket {
        let mut ticket = PendingTicket { epoch: 0 };
        self.tx.send_modify(|c| {
            c.outstanding += 1;
            ticket.epoch = c.epoch;
        });
        ticket
    }

    /// Mark a send as finished
    pub fn complete(&self, ticket: PendingTicket) {
        self.tx.send_if_modified(|c| {
            if c.epoch != ticket.epoch {
                debug!("Completion for retired epoch {} ignored", ticket.epoch);
                return false;
            }
            match c.outstanding.checked_sub(1) {
                Some(n) => {
                    c.outstanding = n;
                    true
                }
                None => {
                    warn!("Pending audio counter completed below zero");
                    false
                }
            }
        });
    }

    /// False once the ticket's epoch has been retired by a forced reset
    pub fn is_current(&self, ticket: PendingTicket) -> bool {
        self.tx.borrow().epoch == ticket.epoch
    }

    /// Resolves when the ticket's epoch is retired
    pub async fn retired(&self, ticket: PendingTicket) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|c| c.epoch != ticket.epoch).await;
    }

    pub fn count(&self) -> usize {
        self.tx.borrow().outstanding
    }

    pub fn is_flushed(&self) -> bool {
        self.count() == 0
    }

    /// Drop all outstanding sends and start a new epoch; returns how many were abandoned
    pub fn force_reset(&self) -> usize {
        let mut abandoned = 0;
        self.tx.send_modify(|c| {
            abandoned = c.outstanding;
            c.outstanding = 0;
            c.epoch += 1;
        });
        abandoned
    }

    /// Wait until every counted send has completed, at most `timeout`
    pub async fn wait_flushed(&self, timeout: Duration) -> FlushOutcome {
        let mut rx = self.tx.subscribe();
        let drained = tokio::time::timeout(timeout, rx.wait_for(|c| c.outstanding == 0))
            .await
            .is_ok();

        if drained {
            return FlushOutcome::Flushed;
        }

        let abandoned = self.force_reset();
        warn!(
            flush_timeout = true,
            abandoned,
            "Audio flush timed out after {:?}; committing without {} pending send(s)",
            timeout,
            abandoned
        );
        FlushOutcome::TimedOut { abandoned }
    }
}

impl Default for PendingAudioOps {
    fn default() -> Self {
        Self::new()
    }
}
