//! [`AsrSession`]: one remote recognition session at a time.
//!
//! The session is a plain state machine owned by the client loop.  The two
//! things that happen asynchronously, negotiation finishing and the
//! transcription deadline, come back as [`AsrSignal`]s on the channel passed
//! to [`AsrSession::new`], and are fed in through [`AsrSession::on_signal`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::AsrConfig;
use crate::timer::Timer;

use super::{
    AsrBackend, AsrError, AsrEvent, AsrState, PendingTranscription, SessionParams,
    TranscriptResult,
};

// ---------------------------------------------------------------------------
// Settings / signals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AsrSettings {
    pub params: SessionParams,
    pub negotiate_timeout: Duration,
    /// Deadline used by `commit_and_wait(None)` with server VAD.
    pub vad_timeout: Duration,
    /// Deadline used by `commit_and_wait(None)` without server VAD.
    pub manual_timeout: Duration,
    pub noise_guard: Duration,
}

impl AsrSettings {
    pub fn from_config(config: &AsrConfig) -> Self {
        Self {
            params: SessionParams::from_config(config),
            negotiate_timeout: Duration::from_millis(config.negotiate_timeout_ms),
            vad_timeout: Duration::from_millis(config.vad_timeout_ms),
            manual_timeout: Duration::from_millis(config.manual_timeout_ms),
            noise_guard: Duration::from_millis(config.noise_guard_ms),
        }
    }

    pub fn default_deadline(&self) -> Duration {
        if self.params.vad_enabled {
            self.vad_timeout
        } else {
            self.manual_timeout
        }
    }
}

impl Default for AsrSettings {
    fn default() -> Self {
        Self::from_config(&AsrConfig::default())
    }
}

#[derive(Debug)]
pub enum AsrSignal {
    Negotiated {
        generation: u64,
        result: Result<(), AsrError>,
    },
    Deadline(u64),
}

/// Something the owner has to act on after an inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum AsrNotice {
    /// A completion arrived with nobody waiting for it.
    Unclaimed(String),
    RemoteError(AsrError),
}

// ---------------------------------------------------------------------------
// AsrSession
// ---------------------------------------------------------------------------

pub struct AsrSession {
    backend: Arc<dyn AsrBackend>,
    settings: AsrSettings,
    sig_tx: mpsc::UnboundedSender<AsrSignal>,

    state: AsrState,
    generation: u64,
    negotiation: Option<JoinHandle<()>>,
    backlog: Vec<Vec<u8>>,
    /// `commit_and_wait` ran while still connecting.
    complete_when_active: bool,
    /// A new press re-armed the session while the previous utterance was
    /// still completing.  Settling that utterance must leave it `Active`.
    relisten: bool,
    seq: u64,

    accumulated: String,
    last_completion: Option<Instant>,
    waiter: PendingTranscription,
    deadline: Timer<AsrSignal>,
}

impl AsrSession {
    pub fn new(
        backend: Arc<dyn AsrBackend>,
        settings: AsrSettings,
        sig_tx: mpsc::UnboundedSender<AsrSignal>,
    ) -> Self {
        Self {
            backend,
            settings,
            deadline: Timer::new(sig_tx.clone(), AsrSignal::Deadline),
            sig_tx,
            state: AsrState::Idle,
            generation: 0,
            negotiation: None,
            backlog: Vec::new(),
            complete_when_active: false,
            relisten: false,
            seq: 0,
            accumulated: String::new(),
            last_completion: None,
            waiter: PendingTranscription::new(),
        }
    }

    pub fn state(&self) -> AsrState {
        self.state
    }

    pub fn accumulated_text(&self) -> &str {
        &self.accumulated
    }

    pub fn is_waiting(&self) -> bool {
        self.waiter.is_pending()
    }

    /// `(installed, settled)` waiter counts.
    pub fn waiter_counts(&self) -> (u64, u64) {
        self.waiter.counts()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Make sure a session exists or is being negotiated.  The outcome
    /// arrives later as [`AsrSignal::Negotiated`].
    pub fn ensure_active(&mut self) {
        match self.state {
            AsrState::Idle => self.begin_negotiation(),
            AsrState::Completing => {
                log::debug!("asr: new utterance while completing, reusing session");
                self.state = AsrState::Active;
                self.relisten = true;
            }
            AsrState::Connecting | AsrState::Active => {}
        }
    }

    fn begin_negotiation(&mut self) {
        self.generation += 1;
        self.state = AsrState::Connecting;
        self.seq = 0;
        self.accumulated.clear();

        let generation = self.generation;
        let backend = Arc::clone(&self.backend);
        let params = self.settings.params.clone();
        let limit = self.settings.negotiate_timeout;
        let tx = self.sig_tx.clone();
        log::info!("asr: negotiating session ({} / {})", params.provider, params.language);

        self.negotiation = Some(tokio::spawn(async move {
            let result = match tokio::time::timeout(limit, backend.open_session(&params)).await {
                Ok(result) => result,
                Err(_) => Err(AsrError::NegotiationTimeout(limit)),
            };
            let _ = tx.send(AsrSignal::Negotiated { generation, result });
        }));
    }

    /// Feed back an [`AsrSignal`].  Returns the negotiation error, if that
    /// is what the signal carried, so the caller can surface it once.
    pub fn on_signal(&mut self, signal: AsrSignal) -> Result<(), AsrError> {
        match signal {
            AsrSignal::Negotiated { generation, result } => self.on_negotiated(generation, result),
            AsrSignal::Deadline(generation) => {
                self.on_deadline(generation);
                Ok(())
            }
        }
    }

    fn on_negotiated(&mut self, generation: u64, result: Result<(), AsrError>) -> Result<(), AsrError> {
        if generation != self.generation || self.state != AsrState::Connecting {
            log::debug!("asr: ignoring stale negotiation result");
            return Ok(());
        }
        self.negotiation = None;

        match result {
            Ok(()) => {
                self.state = AsrState::Active;
                let backlog = std::mem::take(&mut self.backlog);
                log::info!("asr: session active, flushing {} buffered chunks", backlog.len());
                for chunk in backlog {
                    self.forward(&chunk);
                }
                if std::mem::take(&mut self.complete_when_active) {
                    self.begin_completing();
                }
                Ok(())
            }
            Err(err) => {
                log::warn!(
                    "asr: negotiation failed, dropping {} buffered chunks: {err}",
                    self.backlog.len()
                );
                if self.waiter.is_pending() {
                    self.waiter.reject(err.clone());
                }
                self.to_idle();
                Err(err)
            }
        }
    }

    /// Drop the session, cancelling any waiter.
    pub fn reset(&mut self) {
        if self.waiter.is_pending() {
            self.waiter.reject(AsrError::Cancelled);
        }
        self.accumulated.clear();
        self.to_idle();
    }

    pub fn stop(&mut self) {
        log::debug!("asr: stopping session ({})", self.state.label());
        self.reset();
    }

    fn to_idle(&mut self) {
        if let Some(task) = self.negotiation.take() {
            task.abort();
        }
        if self.state == AsrState::Connecting {
            // Invalidate a result already queued.
            self.generation += 1;
        }
        self.deadline.cancel();
        self.backlog.clear();
        self.complete_when_active = false;
        self.relisten = false;
        self.state = AsrState::Idle;
    }

    /// The pending utterance settled.  Ends the session unless a new press
    /// has already re-armed it.
    fn finish_utterance(&mut self) {
        if std::mem::take(&mut self.relisten) && self.state == AsrState::Active {
            log::debug!("asr: previous utterance settled, session stays active");
            self.deadline.cancel();
        } else {
            self.to_idle();
        }
    }

    // -----------------------------------------------------------------------
    // Audio
    // -----------------------------------------------------------------------

    /// Returns `false` when the chunk was dropped because no session is
    /// live.
    pub fn push_audio_chunk(&mut self, chunk: Vec<u8>) -> bool {
        match self.state {
            AsrState::Active => {
                self.forward(&chunk);
                true
            }
            AsrState::Connecting => {
                self.backlog.push(chunk);
                true
            }
            AsrState::Idle | AsrState::Completing => {
                log::debug!(
                    "asr: dropping {} byte chunk ({})",
                    chunk.len(),
                    self.state.label()
                );
                false
            }
        }
    }

    fn forward(&mut self, chunk: &[u8]) {
        self.seq += 1;
        self.backend.send_audio(self.seq, chunk);
    }

    // -----------------------------------------------------------------------
    // Completion
    // -----------------------------------------------------------------------

    /// Close the utterance and wait for its transcript.
    ///
    /// Sends the explicit commit when server VAD is off.  `timeout` defaults
    /// to 8 s with server VAD and 5 s without.  On the deadline the waiter
    /// resolves with whatever partial text exists, or fails with
    /// [`AsrError::NoText`].
    pub fn commit_and_wait(&mut self, timeout: Option<Duration>) -> oneshot::Receiver<TranscriptResult> {
        let rx = self.waiter.install();

        match self.state {
            AsrState::Idle => {
                log::warn!("asr: commit without an active session");
                self.waiter.reject(AsrError::NotActive);
                return rx;
            }
            AsrState::Connecting => self.complete_when_active = true,
            AsrState::Active => self.begin_completing(),
            // Already committed; only the waiter and deadline are new.
            AsrState::Completing => {}
        }

        let after = timeout.unwrap_or_else(|| self.settings.default_deadline());
        self.deadline.schedule(after);
        log::debug!("asr: waiting up to {} ms for transcript", after.as_millis());
        rx
    }

    fn begin_completing(&mut self) {
        if !self.settings.params.vad_enabled {
            self.backend.commit();
        }
        self.relisten = false;
        self.state = AsrState::Completing;
    }

    fn on_deadline(&mut self, generation: u64) {
        if !self.deadline.fire(generation) {
            return;
        }
        let text = std::mem::take(&mut self.accumulated);
        if text.trim().is_empty() {
            log::warn!("asr: transcription deadline passed with no text");
            self.waiter.reject(AsrError::NoText);
        } else {
            log::info!("asr: deadline passed, using partial transcript");
            self.waiter.resolve(text);
        }
        self.finish_utterance();
    }

    // -----------------------------------------------------------------------
    // Inbound events
    // -----------------------------------------------------------------------

    /// Apply one inbound ASR event.  `listening` is whether the push-to-talk
    /// gate is currently taking audio.
    pub fn on_event(&mut self, event: AsrEvent, listening: bool) -> Option<AsrNotice> {
        match event {
            AsrEvent::Partial { text, delta } => {
                self.on_partial(text, delta);
                None
            }
            AsrEvent::SpeechStarted => {
                self.on_speech_started(listening);
                None
            }
            AsrEvent::Completed { text } => self.on_completed(text).map(AsrNotice::Unclaimed),
            AsrEvent::Error { message } => Some(AsrNotice::RemoteError(self.on_remote_error(message))),
        }
    }

    pub fn on_partial(&mut self, text: Option<String>, delta: Option<String>) {
        if let Some(text) = text {
            self.accumulated = text;
        } else if let Some(delta) = delta {
            self.accumulated.push_str(&delta);
        }
    }

    /// Settles the waiter with the final text.  With no waiter, the text is
    /// returned instead so the owner can dispatch it.
    pub fn on_completed(&mut self, text: Option<String>) -> Option<String> {
        self.last_completion = Some(Instant::now());
        let accumulated = std::mem::take(&mut self.accumulated);
        let text = text
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(accumulated);

        if self.waiter.is_pending() {
            self.waiter.resolve(text);
            self.finish_utterance();
            return None;
        }
        if text.trim().is_empty() {
            log::debug!("asr: empty completion with no waiter");
            return None;
        }
        log::info!("asr: completion arrived with no waiter");
        Some(text)
    }

    /// Returns `true` when the event was discarded as key-release noise.
    pub fn on_speech_started(&mut self, listening: bool) -> bool {
        if listening {
            return false;
        }
        match self.last_completion {
            Some(at) if at.elapsed() < self.settings.noise_guard => {
                log::debug!(
                    "asr: speech_started {} ms after completion treated as noise",
                    at.elapsed().as_millis()
                );
                self.accumulated.clear();
                true
            }
            _ => false,
        }
    }

    /// A remote error ends the session.  A waiting caller still gets the
    /// partial text when there is some.
    pub fn on_remote_error(&mut self, message: String) -> AsrError {
        let err = AsrError::Remote(message);
        log::warn!("asr: {err}");
        if self.waiter.is_pending() {
            let text = std::mem::take(&mut self.accumulated);
            if text.trim().is_empty() {
                self.waiter.reject(err.clone());
            } else {
                self.waiter.resolve(text);
            }
        }
        self.accumulated.clear();
        self.to_idle();
        err
    }

    /// The connection dropped.  Any waiter resolves with an empty string.
    pub fn on_transport_lost(&mut self) {
        if self.state == AsrState::Idle && !self.waiter.is_pending() {
            return;
        }
        log::info!("asr: transport lost while {}", self.state.label());
        self.waiter.resolve(String::new());
        self.accumulated.clear();
        self.to_idle();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asr::backend::fake::{Call, FakeAsr};

    struct Harness {
        session: AsrSession,
        signals: mpsc::UnboundedReceiver<AsrSignal>,
        backend: Arc<FakeAsr>,
    }

    fn harness(backend: FakeAsr, vad_enabled: bool) -> Harness {
        let backend = Arc::new(backend);
        let (tx, signals) = mpsc::unbounded_channel();
        let mut settings = AsrSettings::default();
        settings.params.vad_enabled = vad_enabled;
        Harness {
            session: AsrSession::new(backend.clone(), settings, tx),
            signals,
            backend,
        }
    }

    impl Harness {
        /// Deliver the next signal to the session.
        async fn pump(&mut self) -> Result<(), AsrError> {
            let signal = self.signals.recv().await.unwrap();
            self.session.on_signal(signal)
        }

        async fn active(&mut self) {
            self.session.ensure_active();
            self.pump().await.unwrap();
            assert_eq!(self.session.state(), AsrState::Active);
        }
    }

    // ---- Negotiation ---

    #[tokio::test(start_paused = true)]
    async fn audio_pushed_while_connecting_is_flushed_in_order() {
        let mut h = harness(
            FakeAsr {
                open_delay: Duration::from_millis(200),
                ..FakeAsr::default()
            },
            true,
        );
        h.session.ensure_active();
        h.session.ensure_active();
        assert_eq!(h.session.state(), AsrState::Connecting);

        assert!(h.session.push_audio_chunk(vec![0; 3200]));
        assert!(h.session.push_audio_chunk(vec![0; 1000]));
        assert_eq!(h.backend.audio_chunks(), 0);

        h.pump().await.unwrap();
        assert_eq!(h.session.state(), AsrState::Active);
        assert_eq!(
            h.backend.calls(),
            vec![Call::Open, Call::Audio(1, 3200), Call::Audio(2, 1000)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_negotiation_drops_buffered_audio() {
        let mut h = harness(
            FakeAsr {
                fail_open: true,
                ..FakeAsr::default()
            },
            true,
        );
        h.session.ensure_active();
        h.session.push_audio_chunk(vec![0; 3200]);

        assert_eq!(h.pump().await, Err(AsrError::Remote("no provider".into())));
        assert_eq!(h.session.state(), AsrState::Idle);
        assert_eq!(h.backend.audio_chunks(), 0);
        assert!(!h.session.push_audio_chunk(vec![0; 3200]));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_negotiation_times_out() {
        let mut h = harness(
            FakeAsr {
                open_delay: Duration::from_secs(60),
                ..FakeAsr::default()
            },
            true,
        );
        h.session.ensure_active();
        assert_eq!(
            h.pump().await,
            Err(AsrError::NegotiationTimeout(Duration::from_secs(10)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn commit_while_connecting_waits_for_active() {
        let mut h = harness(
            FakeAsr {
                open_delay: Duration::from_millis(100),
                ..FakeAsr::default()
            },
            false,
        );
        h.session.ensure_active();
        h.session.push_audio_chunk(vec![1; 3200]);
        let rx = h.session.commit_and_wait(None);
        assert_eq!(h.backend.commits(), 0);

        h.pump().await.unwrap();
        assert_eq!(h.session.state(), AsrState::Completing);
        assert_eq!(
            h.backend.calls(),
            vec![Call::Open, Call::Audio(1, 3200), Call::Commit]
        );

        assert_eq!(h.session.on_completed(Some("hi".into())), None);
        assert_eq!(rx.await.unwrap(), Ok("hi".into()));
    }

    // ---- commit_and_wait ---

    #[tokio::test(start_paused = true)]
    async fn completion_resolves_without_waiting_for_deadline() {
        let mut h = harness(FakeAsr::default(), false);
        h.active().await;
        h.session.on_partial(Some("hello".into()), None);

        let start = Instant::now();
        let rx = h.session.commit_and_wait(Some(Duration::from_millis(5000)));
        assert_eq!(h.backend.commits(), 1);
        assert_eq!(h.session.state(), AsrState::Completing);

        assert_eq!(h.session.on_completed(None), None);
        assert_eq!(rx.await.unwrap(), Ok("hello".into()));
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(h.session.state(), AsrState::Idle);
        assert!(!h.session.is_waiting());
    }

    #[tokio::test(start_paused = true)]
    async fn server_vad_sends_no_commit() {
        let mut h = harness(FakeAsr::default(), true);
        h.active().await;
        let _rx = h.session.commit_and_wait(None);
        assert_eq!(h.backend.commits(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_with_partial_text_resolves_with_it() {
        let mut h = harness(FakeAsr::default(), false);
        h.active().await;
        h.session.on_partial(None, Some("par".into()));
        h.session.on_partial(None, Some("tial".into()));

        let start = Instant::now();
        let rx = h.session.commit_and_wait(None);
        h.pump().await.unwrap();

        assert_eq!(rx.await.unwrap(), Ok("partial".into()));
        assert_eq!(start.elapsed(), Duration::from_millis(5000));
        assert_eq!(h.session.state(), AsrState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_with_no_text_rejects() {
        let mut h = harness(FakeAsr::default(), true);
        h.active().await;

        let start = Instant::now();
        let rx = h.session.commit_and_wait(None);
        h.pump().await.unwrap();

        assert_eq!(rx.await.unwrap(), Err(AsrError::NoText));
        assert_eq!(start.elapsed(), Duration::from_millis(8000));
    }

    #[tokio::test(start_paused = true)]
    async fn completion_after_deadline_is_unclaimed_not_double_resolved() {
        let mut h = harness(FakeAsr::default(), false);
        h.active().await;
        h.session.on_partial(Some("early".into()), None);
        let rx = h.session.commit_and_wait(Some(Duration::from_millis(100)));
        h.pump().await.unwrap();
        assert_eq!(rx.await.unwrap(), Ok("early".into()));

        assert_eq!(
            h.session.on_completed(Some("late".into())),
            Some("late".into())
        );
        assert_eq!(h.session.waiter_counts(), (1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn new_commit_supersedes_the_previous_waiter() {
        let mut h = harness(FakeAsr::default(), true);
        h.active().await;
        let first = h.session.commit_and_wait(None);
        h.session.ensure_active();
        let second = h.session.commit_and_wait(None);

        assert_eq!(first.await.unwrap(), Err(AsrError::Superseded));
        h.session.on_completed(Some("two".into()));
        assert_eq!(second.await.unwrap(), Ok("two".into()));
        assert_eq!(h.session.waiter_counts(), (2, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn second_commit_while_completing_sends_no_second_commit() {
        let mut h = harness(FakeAsr::default(), false);
        h.active().await;
        let first = h.session.commit_and_wait(None);
        let second = h.session.commit_and_wait(None);

        assert_eq!(h.backend.commits(), 1);
        assert_eq!(h.session.state(), AsrState::Completing);
        assert_eq!(first.await.unwrap(), Err(AsrError::Superseded));
        h.session.on_completed(Some("once".into()));
        assert_eq!(second.await.unwrap(), Ok("once".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn re_press_survives_the_previous_completion() {
        let mut h = harness(FakeAsr::default(), false);
        h.active().await;
        h.session.push_audio_chunk(vec![0; 3200]);
        let first = h.session.commit_and_wait(None);

        h.session.ensure_active();
        assert_eq!(h.session.state(), AsrState::Active);
        assert!(h.session.push_audio_chunk(vec![0; 3200]));

        assert_eq!(h.session.on_completed(Some("A".into())), None);
        assert_eq!(first.await.unwrap(), Ok("A".into()));
        assert_eq!(h.session.state(), AsrState::Active);
        assert!(h.session.push_audio_chunk(vec![0; 3200]));
        assert_eq!(h.backend.audio_chunks(), 3);

        let second = h.session.commit_and_wait(None);
        assert_eq!(h.backend.commits(), 2);
        h.session.on_completed(Some("B".into()));
        assert_eq!(second.await.unwrap(), Ok("B".into()));
        assert_eq!(h.session.state(), AsrState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn re_press_survives_the_previous_deadline() {
        let mut h = harness(FakeAsr::default(), true);
        h.active().await;
        let first = h.session.commit_and_wait(Some(Duration::from_millis(100)));
        h.session.ensure_active();

        h.pump().await.unwrap();
        assert_eq!(first.await.unwrap(), Err(AsrError::NoText));
        assert_eq!(h.session.state(), AsrState::Active);
        assert!(h.session.push_audio_chunk(vec![0; 3200]));

        // No second deadline is left running for the new press.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(h.signals.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn commit_without_session_rejects_immediately() {
        let mut h = harness(FakeAsr::default(), true);
        let rx = h.session.commit_and_wait(None);
        assert_eq!(rx.await.unwrap(), Err(AsrError::NotActive));
        assert!(h.signals.try_recv().is_err());
    }

    // ---- Events ---

    #[tokio::test(start_paused = true)]
    async fn unclaimed_completion_is_returned() {
        let mut h = harness(FakeAsr::default(), true);
        h.active().await;
        h.session.on_partial(Some("mid press".into()), None);

        assert_eq!(
            h.session.on_event(AsrEvent::Completed { text: None }, true),
            Some(AsrNotice::Unclaimed("mid press".into()))
        );
        assert_eq!(h.session.state(), AsrState::Active);
        assert_eq!(h.session.accumulated_text(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn speech_started_soon_after_completion_is_noise() {
        let mut h = harness(FakeAsr::default(), true);
        h.active().await;
        h.session.on_completed(Some("done".into()));

        tokio::time::advance(Duration::from_millis(200)).await;
        h.session.on_partial(Some("uh".into()), None);
        assert!(h.session.on_speech_started(false));
        assert_eq!(h.session.accumulated_text(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn speech_started_after_the_guard_is_kept() {
        let mut h = harness(FakeAsr::default(), true);
        h.active().await;
        h.session.on_completed(Some("done".into()));

        tokio::time::advance(Duration::from_millis(600)).await;
        h.session.on_partial(Some("next".into()), None);
        assert!(!h.session.on_speech_started(false));
        assert_eq!(h.session.accumulated_text(), "next");
    }

    #[tokio::test(start_paused = true)]
    async fn speech_started_while_listening_is_never_noise() {
        let mut h = harness(FakeAsr::default(), true);
        h.active().await;
        h.session.on_completed(Some("done".into()));
        h.session.on_partial(Some("keep".into()), None);
        assert!(!h.session.on_speech_started(true));
        assert_eq!(h.session.accumulated_text(), "keep");
    }

    #[tokio::test(start_paused = true)]
    async fn remote_error_with_partial_text_resolves() {
        let mut h = harness(FakeAsr::default(), true);
        h.active().await;
        h.session.on_partial(Some("some".into()), None);
        let rx = h.session.commit_and_wait(None);

        let notice = h.session.on_event(
            AsrEvent::Error {
                message: "boom".into(),
            },
            false,
        );
        assert_eq!(notice, Some(AsrNotice::RemoteError(AsrError::Remote("boom".into()))));
        assert_eq!(rx.await.unwrap(), Ok("some".into()));
        assert_eq!(h.session.state(), AsrState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn remote_error_without_text_rejects() {
        let mut h = harness(FakeAsr::default(), true);
        h.active().await;
        let rx = h.session.commit_and_wait(None);
        h.session.on_remote_error("boom".into());
        assert_eq!(rx.await.unwrap(), Err(AsrError::Remote("boom".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_loss_resolves_waiter_with_empty_text() {
        let mut h = harness(FakeAsr::default(), true);
        h.active().await;
        h.session.on_partial(Some("lost".into()), None);
        let rx = h.session.commit_and_wait(None);

        h.session.on_transport_lost();
        assert_eq!(rx.await.unwrap(), Ok(String::new()));
        assert_eq!(h.session.state(), AsrState::Idle);

        // The cancelled deadline never fires.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(h.signals.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_negotiation_after_transport_loss_is_ignored() {
        let mut h = harness(
            FakeAsr {
                open_delay: Duration::from_millis(100),
                ..FakeAsr::default()
            },
            true,
        );
        h.session.ensure_active();
        h.session.on_transport_lost();
        assert_eq!(h.session.state(), AsrState::Idle);

        tokio::time::sleep(Duration::from_secs(1)).await;
        while let Ok(signal) = h.signals.try_recv() {
            assert_eq!(h.session.on_signal(signal), Ok(()));
        }
        assert_eq!(h.session.state(), AsrState::Idle);
    }
}
