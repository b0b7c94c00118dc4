//! Cancellable single-slot timer.
//!
//! Every state machine in the client owns its timers as [`Timer`] values.
//! A timer does not run a callback; when it elapses it posts a signal into
//! the owner's event channel, tagged with a generation number.  The owner
//! hands that generation back to [`Timer::fire`], which accepts it only if
//! the timer was not cancelled or re-armed in the meantime:
//!
//! ```text
//! schedule() ──sleep──▶ tx.send(make(gen)) ──▶ owner loop ──▶ timer.fire(gen)
//!     │                                                         │
//! cancel()/schedule() bump gen ─────────────────────────────────┘ stale → false
//! ```
//!
//! A fire that was already queued when the timer was cancelled is therefore
//! rejected, so no stale timer can act after a state transition or shutdown.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

pub struct Timer<E> {
    tx: UnboundedSender<E>,
    make: fn(u64) -> E,
    generation: u64,
    armed: bool,
    handle: Option<JoinHandle<()>>,
}

impl<E: Send + 'static> Timer<E> {
    /// `make` builds the signal posted on expiry, e.g. `Signal::Deadline`.
    pub fn new(tx: UnboundedSender<E>, make: fn(u64) -> E) -> Self {
        Self {
            tx,
            make,
            generation: 0,
            armed: false,
            handle: None,
        }
    }

    /// Arm the timer, replacing any pending expiry.  Returns the generation
    /// the expiry signal will carry.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(&mut self, after: Duration) -> u64 {
        self.cancel();
        self.generation += 1;
        self.armed = true;

        let generation = self.generation;
        let tx = self.tx.clone();
        let make = self.make;
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(make(generation));
        }));
        generation
    }

    /// Disarm the timer.  An expiry already sitting in the owner's channel
    /// will be rejected by [`fire`](Self::fire).
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        if self.armed {
            self.armed = false;
            self.generation += 1;
        }
    }

    /// Accept an expiry signal.  Returns `true` exactly once per
    /// [`schedule`](Self::schedule), and only for the current generation.
    pub fn fire(&mut self, generation: u64) -> bool {
        if !self.armed || generation != self.generation {
            return false;
        }
        self.armed = false;
        self.handle = None;
        true
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }
}

impl<E> Drop for Timer<E> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[derive(Debug, PartialEq)]
    enum Sig {
        Elapsed(u64),
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = Timer::new(tx, Sig::Elapsed);

        let gen = timer.schedule(Duration::from_millis(300));
        assert!(timer.is_armed());

        let Sig::Elapsed(got) = rx.recv().await.unwrap();
        assert_eq!(got, gen);
        assert!(timer.fire(got));
        assert!(!timer.is_armed());
        // A duplicate delivery is rejected.
        assert!(!timer.fire(got));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_posts() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = Timer::new(tx, Sig::Elapsed);

        timer.schedule(Duration::from_millis(100));
        timer.cancel();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn queued_expiry_is_rejected_after_cancel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = Timer::new(tx, Sig::Elapsed);

        timer.schedule(Duration::from_millis(10));
        let Sig::Elapsed(gen) = rx.recv().await.unwrap();

        // Owner transitions before processing the already-queued expiry.
        timer.cancel();
        assert!(!timer.fire(gen));
    }

    #[tokio::test(start_paused = true)]
    async fn reschedule_supersedes_previous_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = Timer::new(tx, Sig::Elapsed);

        let first = timer.schedule(Duration::from_millis(10));
        let second = timer.schedule(Duration::from_millis(50));
        assert_ne!(first, second);

        let Sig::Elapsed(got) = rx.recv().await.unwrap();
        assert_eq!(got, second);
        assert!(!timer.fire(first));
        assert!(timer.fire(second));
    }
}
