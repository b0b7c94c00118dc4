//! Single-slot transcription waiter.
//!
//! Holds at most one outstanding `oneshot` sender.  Installing a new waiter
//! rejects the previous one with [`AsrError::Superseded`] first, so a caller
//! can never be left hanging and a result is never delivered twice.

use tokio::sync::oneshot;

use super::{AsrError, TranscriptResult};

#[derive(Debug, Default)]
pub struct PendingTranscription {
    slot: Option<oneshot::Sender<TranscriptResult>>,
    installed: u64,
    settled: u64,
}

impl PendingTranscription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new waiter, superseding any unresolved one.
    pub fn install(&mut self) -> oneshot::Receiver<TranscriptResult> {
        if self.is_pending() {
            log::debug!("asr: superseding pending transcription waiter");
            self.reject(AsrError::Superseded);
        }
        let (tx, rx) = oneshot::channel();
        self.slot = Some(tx);
        self.installed += 1;
        rx
    }

    /// Returns `false` if nothing was pending.
    pub fn resolve(&mut self, text: String) -> bool {
        self.settle(Ok(text))
    }

    /// Returns `false` if nothing was pending.
    pub fn reject(&mut self, err: AsrError) -> bool {
        self.settle(Err(err))
    }

    pub fn is_pending(&self) -> bool {
        self.slot.is_some()
    }

    /// Total waiters installed and settled.  Equal whenever nothing is pending.
    pub fn counts(&self) -> (u64, u64) {
        (self.installed, self.settled)
    }

    fn settle(&mut self, outcome: TranscriptResult) -> bool {
        let Some(tx) = self.slot.take() else {
            return false;
        };
        self.settled += 1;
        if tx.send(outcome).is_err() {
            log::debug!("asr: transcription waiter dropped before settling");
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
