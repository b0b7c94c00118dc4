//! [`VoiceClient`]: the event loop that wires every component together.
//!
//! # Flow
//!
//! ```text
//! HotkeyEvent ──▶ PushToTalkGate ──StartListening──▶ AsrSession::ensure_active
//!                       │          ──Forward(chunk)──▶ AsrSession::push_audio_chunk
//! PCM buffers ──────────┘          ──Finished──────▶ AsrSession::commit_and_wait
//!                                                        │ (waiter)
//! TransportEvent::Inbound ──asr/*──▶ AsrSession ─────────┤
//!                         ──chat───▶ ChatDispatcher ◀────┘ final transcript
//!                         ──other──▶ ClientOutputs::inbound
//! ```
//!
//! Every state machine is owned by this one task, so each event is handled
//! to completion before the next is looked at.  Timers and the transport
//! report back through channels polled by the same `select!`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::asr::{
    AsrBackend, AsrError, AsrEvent, AsrNotice, AsrSession, AsrSettings, AsrSignal, AsrState,
    RemoteAsr, TranscriptResult, CONSUMED_EVENTS,
};
use crate::chat::{ChatDispatcher, ConversationTurn};
use crate::config::AppConfig;
use crate::hotkey::HotkeyEvent;
use crate::protocol::{Inbound, RpcError};
use crate::transport::{
    Connector, TransportEvent, TransportHandle, TransportManager, TransportSettings,
};

use super::gate::{DrainElapsed, GateAction, PushToTalkGate};
use super::state::{ClientStatus, StatusReceiver};

/// JSON-RPC "method not found".
const RPC_METHOD_NOT_FOUND: i64 = -32601;

// ---------------------------------------------------------------------------
// Inputs / outputs
// ---------------------------------------------------------------------------

/// Event sources the client consumes.
pub struct ClientInputs {
    pub keys: mpsc::UnboundedReceiver<HotkeyEvent>,
    /// PCM buffers of any size from the capture source.
    pub audio: mpsc::UnboundedReceiver<Vec<u8>>,
}

/// What the client produces for downstream collaborators.
pub struct ClientOutputs {
    pub status: StatusReceiver,
    /// Every conversation turn, user and assistant, in order.
    pub turns: mpsc::UnboundedReceiver<ConversationTurn>,
    /// Inbound traffic no component consumed (tool calls, avatar events).
    /// Server RPC requests arriving here are answered through
    /// [`TransportHandle::respond`]; dropping this receiver makes the client
    /// answer them with "method not found".
    pub inbound: mpsc::UnboundedReceiver<Inbound>,
}

// ---------------------------------------------------------------------------
// VoiceClient
// ---------------------------------------------------------------------------

/// ```rust,no_run
/// use std::sync::Arc;
/// use tokio::sync::mpsc;
/// use edge_voice_client::config::AppConfig;
/// use edge_voice_client::pipeline::{ClientInputs, VoiceClient};
/// use edge_voice_client::transport::WsConnector;
///
/// # async fn example() {
/// let config = AppConfig::default();
/// let (client, mut outputs) = VoiceClient::connect(&config, Arc::new(WsConnector));
///
/// let (keys_tx, keys) = mpsc::unbounded_channel();
/// let (audio_tx, audio) = mpsc::unbounded_channel();
/// // keys_tx → a KeyEventSource, audio_tx → an AudioCapture
/// # drop((keys_tx, audio_tx));
///
/// client
///     .run(ClientInputs { keys, audio }, async {
///         let _ = tokio::signal::ctrl_c().await;
///     })
///     .await;
/// # }
/// ```
pub struct VoiceClient {
    url: String,
    namespace: String,

    transport: TransportHandle,
    transport_rx: mpsc::UnboundedReceiver<TransportEvent>,

    backend: Arc<dyn AsrBackend>,
    asr: AsrSession,
    asr_rx: mpsc::UnboundedReceiver<AsrSignal>,

    gate: PushToTalkGate,
    gate_rx: mpsc::UnboundedReceiver<DrainElapsed>,

    dispatcher: ChatDispatcher,
    transcript_tx: mpsc::UnboundedSender<TranscriptResult>,
    transcript_rx: mpsc::UnboundedReceiver<TranscriptResult>,

    inbound_tx: mpsc::UnboundedSender<Inbound>,
    status: ClientStatus,
    status_tx: watch::Sender<ClientStatus>,
}

impl VoiceClient {
    /// Spawn the transport manager with `connector` and build a client that
    /// talks to the remote ASR over it.  Must be called inside a tokio
    /// runtime.
    pub fn connect(config: &AppConfig, connector: Arc<dyn Connector>) -> (Self, ClientOutputs) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let transport = TransportManager::spawn(
            connector,
            TransportSettings::from_config(&config.connection),
            events_tx,
        );
        let backend = Arc::new(RemoteAsr::new(transport.clone(), &config.asr));
        Self::with_parts(config, transport, events_rx, backend)
    }

    /// Build from an already running transport and any ASR backend.
    pub fn with_parts(
        config: &AppConfig,
        transport: TransportHandle,
        transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
        backend: Arc<dyn AsrBackend>,
    ) -> (Self, ClientOutputs) {
        let (asr_tx, asr_rx) = mpsc::unbounded_channel();
        let (gate_tx, gate_rx) = mpsc::unbounded_channel();
        let (turns_tx, turns) = mpsc::unbounded_channel();
        let (transcript_tx, transcript_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(ClientStatus::default());

        let asr = AsrSession::new(
            Arc::clone(&backend),
            AsrSettings::from_config(&config.asr),
            asr_tx,
        );
        let gate = PushToTalkGate::new(
            config.audio.chunk_bytes.max(1),
            Duration::from_millis(config.audio.drain_ms),
            gate_tx,
        );
        let dispatcher = ChatDispatcher::new(
            Arc::new(transport.clone()),
            &config.chat,
            &config.asr.namespace,
            turns_tx,
        );

        let client = Self {
            url: config.connection.endpoint_url(),
            namespace: config.asr.namespace.clone(),
            transport,
            transport_rx,
            backend,
            asr,
            asr_rx,
            gate,
            gate_rx,
            dispatcher,
            transcript_tx,
            transcript_rx,
            inbound_tx,
            status: ClientStatus::default(),
            status_tx,
        };
        let outputs = ClientOutputs {
            status,
            turns,
            inbound,
        };
        (client, outputs)
    }

    pub fn transport(&self) -> &TransportHandle {
        &self.transport
    }

    // -----------------------------------------------------------------------
    // Main loop
    // -----------------------------------------------------------------------

    /// Subscribe, connect, and process events until `shutdown` completes or
    /// the transport goes away.  Then stop everything: gate, ASR session and
    /// transport, in that order.
    pub async fn run(mut self, mut inputs: ClientInputs, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);

        for event in CONSUMED_EVENTS {
            self.transport.subscribe(event);
        }
        self.transport.subscribe(self.dispatcher.response_event());
        self.transport.start(self.url.clone());
        log::info!("client: started, upstream {}", self.url);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                event = self.transport_rx.recv() => match event {
                    Some(event) => self.on_transport_event(event),
                    None => {
                        log::error!("client: transport manager went away");
                        break;
                    }
                },
                Some(key) = inputs.keys.recv() => self.on_key(key),
                Some(data) = inputs.audio.recv() => {
                    let actions = self.gate.push_audio(&data);
                    self.apply(actions);
                }
                Some(signal) = self.gate_rx.recv() => {
                    let actions = self.gate.on_drain_elapsed(signal);
                    self.apply(actions);
                }
                Some(signal) = self.asr_rx.recv() => {
                    if let Err(e) = self.asr.on_signal(signal) {
                        log::warn!("ptt: ASR session unavailable for this press: {e}");
                        self.status.last_error = Some(e.to_string());
                    }
                }
                Some(result) = self.transcript_rx.recv() => self.on_transcript(result),
            }
            self.publish_status();
        }

        self.shutdown().await;
    }

    async fn shutdown(&mut self) {
        log::info!("client: shutting down");
        self.gate.stop();
        self.asr.stop();
        self.transport.stop().await;
        self.publish_status();
    }

    // -----------------------------------------------------------------------
    // Push-to-talk
    // -----------------------------------------------------------------------

    fn on_key(&mut self, key: HotkeyEvent) {
        let actions = match key {
            HotkeyEvent::PushToTalkPressed => self.gate.key_down(),
            HotkeyEvent::PushToTalkReleased => self.gate.key_up(),
        };
        self.apply(actions);
    }

    fn apply(&mut self, actions: Vec<GateAction>) {
        for action in actions {
            match action {
                GateAction::StartListening => {
                    self.status.last_error = None;
                    self.asr.ensure_active();
                    self.backend.recording_started();
                }
                GateAction::Forward(chunk) => {
                    self.asr.push_audio_chunk(chunk);
                }
                GateAction::Finished { chunks } => {
                    self.backend.recording_completed();
                    if chunks == 0 {
                        log::info!("ptt: press ended without audio");
                        self.asr.reset();
                    } else if self.asr.state() == AsrState::Idle {
                        // Session failed during this press; already surfaced.
                        log::debug!("ptt: no session to commit {chunks} chunks to");
                    } else {
                        self.await_transcript();
                    }
                }
            }
        }
    }

    fn await_transcript(&mut self) {
        let waiter = self.asr.commit_and_wait(None);
        let tx = self.transcript_tx.clone();
        tokio::spawn(async move {
            let result = waiter.await.unwrap_or(Err(AsrError::Cancelled));
            let _ = tx.send(result);
        });
    }

    fn on_transcript(&mut self, result: TranscriptResult) {
        match result {
            Ok(text) => self.deliver(text),
            Err(AsrError::Superseded) => log::debug!("asr: earlier transcript superseded"),
            Err(e) => {
                log::warn!("asr: no transcript: {e}");
                self.status.last_error = Some(e.to_string());
            }
        }
    }

    fn deliver(&mut self, text: String) {
        if text.trim().is_empty() {
            log::info!("asr: no usable transcript");
            return;
        }
        log::info!("asr: transcript {text:?}");
        self.dispatcher.on_transcript(&text);
        self.status.last_transcript = Some(text);
    }

    // -----------------------------------------------------------------------
    // Transport
    // -----------------------------------------------------------------------

    fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => log::info!("client: connected"),
            TransportEvent::Disconnected { error } => {
                if let Some(e) = error {
                    log::warn!("client: disconnected: {e}");
                }
                self.asr.on_transport_lost();
            }
            TransportEvent::Inbound(inbound) => self.route(inbound),
        }
    }

    fn route(&mut self, inbound: Inbound) {
        if let Some(event) = AsrEvent::from_inbound(&inbound, &self.namespace) {
            match self.asr.on_event(event, self.gate.is_listening()) {
                Some(AsrNotice::Unclaimed(text)) => self.deliver(text),
                Some(AsrNotice::RemoteError(e)) => self.status.last_error = Some(e.to_string()),
                None => {}
            }
            return;
        }
        if self.dispatcher.on_inbound(&inbound) {
            return;
        }

        match inbound {
            Inbound::Ack { event } => log::debug!("client: subscription to {event} acknowledged"),
            Inbound::Rpc(env) if !env.is_reply() => {
                let id = env.payload.id.clone();
                if self.inbound_tx.send(Inbound::Rpc(env)).is_err() {
                    if let Some(id) = id {
                        self.transport.respond(
                            id,
                            Err(RpcError {
                                code: RPC_METHOD_NOT_FOUND,
                                message: "method not found".into(),
                            }),
                        );
                    }
                }
            }
            other => {
                let _ = self.inbound_tx.send(other);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    fn publish_status(&mut self) {
        self.status.connection = self.transport.state();
        self.status.gate = self.gate.state();
        self.status.asr = self.asr.state();

        let status = &self.status;
        self.status_tx.send_if_modified(|current| {
            if current == status {
                return false;
            }
            log::debug!("client: {}", status.summary());
            *current = status.clone();
            true
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
