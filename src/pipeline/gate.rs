//! [`PushToTalkGate`]: key events decide which audio reaches the ASR session.
//!
//! ```text
//! Released ──key down──▶ Pressed ──key up──▶ Draining ──drain window──▶ Released
//!                          ▲                    │
//!                          └────key down────────┘   (drain cancelled)
//! ```
//!
//! The gate does no I/O.  Every method returns the [`GateAction`]s its
//! owner has to carry out, in order.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::audio::ChunkCoalescer;
use crate::timer::Timer;

use super::GateState;

/// Posted when the drain window elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainElapsed(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateAction {
    /// A new press began: bring the ASR session up and announce recording.
    StartListening,
    /// One coalesced chunk for the ASR session.
    Forward(Vec<u8>),
    /// The drain window closed.  `chunks` counts what this press forwarded.
    Finished { chunks: u64 },
}

pub struct PushToTalkGate {
    state: GateState,
    coalescer: ChunkCoalescer,
    drain: Timer<DrainElapsed>,
    drain_window: Duration,
    chunks: u64,
    dropped_bytes: u64,
}

impl PushToTalkGate {
    pub fn new(
        chunk_bytes: usize,
        drain_window: Duration,
        tx: mpsc::UnboundedSender<DrainElapsed>,
    ) -> Self {
        Self {
            state: GateState::Released,
            coalescer: ChunkCoalescer::new(chunk_bytes),
            drain: Timer::new(tx, DrainElapsed),
            drain_window,
            chunks: 0,
            dropped_bytes: 0,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    /// True while audio is still being taken: pressed or draining.
    pub fn is_listening(&self) -> bool {
        self.state.accepts_audio()
    }

    /// Bytes discarded because they arrived while released.
    pub fn dropped_bytes(&self) -> u64 {
        self.dropped_bytes
    }

    pub fn key_down(&mut self) -> Vec<GateAction> {
        match self.state {
            GateState::Released => {
                log::debug!("ptt: pressed");
                self.state = GateState::Pressed;
                self.chunks = 0;
                self.coalescer.clear();
                vec![GateAction::StartListening]
            }
            GateState::Draining => {
                log::debug!("ptt: re-pressed while draining, resuming");
                self.drain.cancel();
                self.state = GateState::Pressed;
                Vec::new()
            }
            GateState::Pressed => Vec::new(),
        }
    }

    pub fn key_up(&mut self) -> Vec<GateAction> {
        if self.state == GateState::Pressed {
            log::debug!("ptt: released, draining for {} ms", self.drain_window.as_millis());
            self.state = GateState::Draining;
            self.drain.schedule(self.drain_window);
        }
        Vec::new()
    }

    /// Take one captured buffer.  Accepted while pressed or draining.
    pub fn push_audio(&mut self, data: &[u8]) -> Vec<GateAction> {
        if self.state == GateState::Released {
            self.dropped_bytes += data.len() as u64;
            return Vec::new();
        }
        let ready = self.coalescer.push(data);
        self.chunks += ready.len() as u64;
        ready.into_iter().map(GateAction::Forward).collect()
    }

    /// Handle a [`DrainElapsed`] signal.  Stale signals are ignored.
    pub fn on_drain_elapsed(&mut self, signal: DrainElapsed) -> Vec<GateAction> {
        if !self.drain.fire(signal.0) || self.state != GateState::Draining {
            return Vec::new();
        }
        let mut actions = Vec::with_capacity(2);
        if let Some(tail) = self.coalescer.flush() {
            self.chunks += 1;
            actions.push(GateAction::Forward(tail));
        }
        self.state = GateState::Released;
        log::debug!("ptt: drain finished, {} chunks forwarded", self.chunks);
        actions.push(GateAction::Finished {
            chunks: self.chunks,
        });
        actions
    }

    /// Back to released without finishing the press.
    pub fn stop(&mut self) {
        self.drain.cancel();
        self.coalescer.clear();
        self.state = GateState::Released;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
