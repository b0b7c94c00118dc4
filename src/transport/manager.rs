//! The transport manager task and its handle.
//!
//! [`TransportManager`] runs as a single tokio task.  Every state change
//! happens inside that task in response to either a [`TransportHandle`]
//! command or an internal signal (connect outcome, inbound frame, timer
//! expiry), so ordering is the only concurrency concern:
//!
//! * at most one connect attempt is in flight (`connecting` guard);
//! * a failed attempt schedules exactly one retry, even when the handshake
//!   deadline and the connect error race;
//! * on open, the heartbeat and the subscription replay are written before
//!   any queued command is looked at, so no publish can overtake the replay.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use edge_voice_client::transport::{TransportManager, TransportSettings, WsConnector};
//!
//! # async fn example() {
//! let (events_tx, mut events_rx) = mpsc::unbounded_channel();
//! let transport = TransportManager::spawn(
//!     Arc::new(WsConnector),
//!     TransportSettings::default(),
//!     events_tx,
//! );
//! transport.subscribe("asr/result");
//! transport.start("ws://127.0.0.1:8080/ws");
//!
//! while let Some(event) = events_rx.recv().await {
//!     println!("{event:?}");
//! }
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::ConnectionConfig;
use crate::protocol::{decode, Heartbeat, Inbound, Outbound, PubSubEnvelope, RpcEnvelope, RpcError};
use crate::timer::Timer;

use super::link::{Connector, Frame, FrameSink, Link, CLOSE_ABNORMAL, CLOSE_NORMAL};
use super::{ConnectionState, RetryPolicy, SubscriptionRegistry, TransportError, TransportEvent};

const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// TransportSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TransportSettings {
    /// An attempt that has not opened by then is failed and retried.
    pub handshake_timeout: Duration,
    pub min_retry: Duration,
    pub max_retry: Duration,
    pub retry_multiplier: u32,
    /// `None` disables the periodic `ping`; one is still sent on open.
    pub heartbeat_interval: Option<Duration>,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(15),
            min_retry: super::backoff::DEFAULT_MIN_DELAY,
            max_retry: super::backoff::DEFAULT_MAX_DELAY,
            retry_multiplier: super::backoff::DEFAULT_MULTIPLIER,
            heartbeat_interval: Some(Duration::from_secs(30)),
        }
    }
}

impl TransportSettings {
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self {
            handshake_timeout: Duration::from_millis(config.handshake_timeout_ms),
            min_retry: Duration::from_millis(config.min_retry_ms),
            max_retry: Duration::from_millis(config.max_retry_ms),
            retry_multiplier: config.retry_multiplier,
            heartbeat_interval: (config.heartbeat_interval_secs > 0)
                .then(|| Duration::from_secs(config.heartbeat_interval_secs)),
        }
    }
}

// ---------------------------------------------------------------------------
// Commands and internal signals
// ---------------------------------------------------------------------------

type CallReply = oneshot::Sender<Result<Value, TransportError>>;

enum Command {
    Start(String),
    Send(Outbound),
    Subscribe(String),
    Unsubscribe(String),
    Call {
        method: String,
        params: Value,
        reply: CallReply,
    },
    Stop(oneshot::Sender<()>),
}

enum Signal {
    Retry(u64),
    Handshake(u64),
    Heartbeat(u64),
    Attempt {
        attempt: u64,
        result: Result<Link, TransportError>,
    },
    Frame {
        conn: u64,
        frame: Result<Frame, TransportError>,
    },
    ReadEnded {
        conn: u64,
    },
}

// ---------------------------------------------------------------------------
// TransportHandle
// ---------------------------------------------------------------------------

/// Cheap, clone-able front end to the manager task.
///
/// Every method is non-blocking except [`call`](Self::call) and
/// [`stop`](Self::stop).  Once the manager has stopped, sends are ignored
/// and calls fail with [`TransportError::Cancelled`].
#[derive(Clone)]
pub struct TransportHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl TransportHandle {
    /// Begin the connect loop.  No-op while already connecting or open.
    pub fn start(&self, url: impl Into<String>) {
        self.command(Command::Start(url.into()));
    }

    /// Send one envelope.  Dropped (and logged) when not open; nothing is
    /// queued for a later connection.
    pub fn send(&self, envelope: Outbound) {
        self.command(Command::Send(envelope));
    }

    pub fn subscribe(&self, event: &str) {
        self.command(Command::Subscribe(event.to_string()));
    }

    pub fn unsubscribe(&self, event: &str) {
        self.command(Command::Unsubscribe(event.to_string()));
    }

    pub fn publish(&self, event: &str, payload: Vec<Value>) {
        self.send(PubSubEnvelope::publish(event, payload).into());
    }

    /// Issue an RPC request and wait for the reply with the same id.
    ///
    /// Fails with [`TransportError::NotConnected`] when not open and with
    /// [`TransportError::ConnectionLost`] if the connection drops first.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Call {
            method: method.to_string(),
            params,
            reply,
        });
        rx.await.unwrap_or(Err(TransportError::Cancelled))
    }

    /// Answer a server-initiated RPC request.
    pub fn respond(&self, id: Value, outcome: Result<Value, RpcError>) {
        self.send(RpcEnvelope::reply(id, outcome).into());
    }

    /// Close with a normal-closure code, cancel every timer and fail every
    /// pending call.  Returns once the manager task has finished.
    pub async fn stop(&self) {
        let (ack, done) = oneshot::channel();
        self.command(Command::Stop(ack));
        let _ = done.await;
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    fn command(&self, cmd: Command) {
        if self.cmd_tx.send(cmd).is_err() {
            log::debug!("transport: manager already stopped, command ignored");
        }
    }
}

// ---------------------------------------------------------------------------
// TransportManager
// ---------------------------------------------------------------------------

pub struct TransportManager {
    connector: Arc<dyn Connector>,
    settings: TransportSettings,
    events: mpsc::UnboundedSender<TransportEvent>,
    sig_tx: mpsc::UnboundedSender<Signal>,
    state_tx: watch::Sender<ConnectionState>,

    url: Option<String>,
    state: ConnectionState,
    /// Single-flight guard: set when an attempt starts, cleared on its outcome.
    connecting: bool,
    retry: RetryPolicy,
    registry: SubscriptionRegistry,
    pending: HashMap<String, CallReply>,
    next_call_id: u64,

    attempt: u64,
    attempt_task: Option<JoinHandle<()>>,
    conn: u64,
    sink: Option<FrameSink>,
    reader: Option<JoinHandle<()>>,

    retry_timer: Timer<Signal>,
    handshake_timer: Timer<Signal>,
    heartbeat_timer: Timer<Signal>,
}

impl TransportManager {
    /// Spawn the manager task.  `events` receives every
    /// [`TransportEvent`]; the returned handle drives it.
    pub fn spawn(
        connector: Arc<dyn Connector>,
        settings: TransportSettings,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> TransportHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (sig_tx, sig_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let retry = RetryPolicy::new(
            settings.min_retry,
            settings.max_retry,
            settings.retry_multiplier,
        );

        let manager = Self {
            connector,
            settings,
            events,
            retry_timer: Timer::new(sig_tx.clone(), Signal::Retry),
            handshake_timer: Timer::new(sig_tx.clone(), Signal::Handshake),
            heartbeat_timer: Timer::new(sig_tx.clone(), Signal::Heartbeat),
            sig_tx,
            state_tx,
            url: None,
            state: ConnectionState::Disconnected,
            connecting: false,
            retry,
            registry: SubscriptionRegistry::new(),
            pending: HashMap::new(),
            next_call_id: 0,
            attempt: 0,
            attempt_task: None,
            conn: 0,
            sink: None,
            reader: None,
        };

        tokio::spawn(manager.run(cmd_rx, sig_rx));
        TransportHandle { cmd_tx, state_rx }
    }

    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
        mut sig_rx: mpsc::UnboundedReceiver<Signal>,
    ) {
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => {
                        if !self.on_command(cmd).await {
                            break;
                        }
                    }
                    None => {
                        self.shutdown().await;
                        break;
                    }
                },
                Some(sig) = sig_rx.recv() => self.on_signal(sig).await,
            }
        }
        log::info!("transport: manager stopped");
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Returns `false` once the manager should exit.
    async fn on_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Start(url) => self.start(url),
            Command::Send(out) => self.send(out).await,
            Command::Subscribe(event) => {
                if !self.registry.add(&event) {
                    log::debug!("transport: already subscribed to {event}");
                } else if self.state == ConnectionState::Open {
                    self.send(PubSubEnvelope::subscribe(event).into()).await;
                } else {
                    log::debug!("transport: subscription to {event} deferred until connected");
                }
            }
            Command::Unsubscribe(event) => {
                if self.registry.remove(&event) && self.state == ConnectionState::Open {
                    self.send(PubSubEnvelope::unsubscribe(event).into()).await;
                }
            }
            Command::Call {
                method,
                params,
                reply,
            } => self.call(method, params, reply).await,
            Command::Stop(ack) => {
                self.shutdown().await;
                let _ = ack.send(());
                return false;
            }
        }
        true
    }

    fn start(&mut self, url: String) {
        if self.connecting || self.state == ConnectionState::Open || self.retry_timer.is_armed() {
            log::debug!("transport: start ignored ({})", self.state.label());
            return;
        }
        log::info!("transport: connecting to {url}");
        self.url = Some(url);
        self.begin_attempt();
    }

    async fn call(&mut self, method: String, params: Value, reply: CallReply) {
        if self.state != ConnectionState::Open {
            log::warn!("transport: call {method} rejected, not connected");
            let _ = reply.send(Err(TransportError::NotConnected));
            return;
        }
        self.next_call_id += 1;
        let id = self.next_call_id.to_string();
        self.pending.insert(id.clone(), reply);
        self.send(RpcEnvelope::request(&id, &method, params).into()).await;
    }

    async fn send(&mut self, out: Outbound) {
        if self.state != ConnectionState::Open {
            log::debug!("transport: not connected, dropping {}", out.describe());
            return;
        }
        let text = match out.encode() {
            Ok(text) => text,
            Err(e) => {
                log::error!("transport: failed to encode {}: {e}", out.describe());
                return;
            }
        };
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        if let Err(e) = sink.send(Frame::Text(text)).await {
            self.connection_lost(e);
        }
    }

    // -----------------------------------------------------------------------
    // Connect / backoff
    // -----------------------------------------------------------------------

    fn begin_attempt(&mut self) {
        if self.connecting {
            log::warn!("transport: connect attempt already in flight");
            return;
        }
        let Some(url) = self.url.clone() else {
            return;
        };

        self.connecting = true;
        self.set_state(ConnectionState::Connecting);
        self.attempt += 1;

        let attempt = self.attempt;
        let connector = Arc::clone(&self.connector);
        let tx = self.sig_tx.clone();
        self.attempt_task = Some(tokio::spawn(async move {
            let result = connector.connect(&url).await;
            let _ = tx.send(Signal::Attempt { attempt, result });
        }));
        self.handshake_timer.schedule(self.settings.handshake_timeout);
    }

    async fn on_attempt(&mut self, attempt: u64, result: Result<Link, TransportError>) {
        if attempt != self.attempt || !self.connecting {
            // Raced the handshake deadline; that path already scheduled the retry.
            if let Ok(mut link) = result {
                let _ = link.sink.close().await;
            }
            return;
        }
        self.attempt_task = None;
        self.handshake_timer.cancel();
        match result {
            Ok(link) => self.on_open(link).await,
            Err(e) => self.fail_attempt(e),
        }
    }

    fn fail_attempt(&mut self, err: TransportError) {
        self.connecting = false;
        self.set_state(ConnectionState::Disconnected);
        log::warn!("transport: connect failed [{}]: {err}", err.class());
        self.schedule_retry();
    }

    fn schedule_retry(&mut self) {
        if self.retry_timer.is_armed() {
            log::debug!("transport: retry already scheduled");
            return;
        }
        let delay = self.retry.on_failure();
        log::info!(
            "transport: retrying in {} ms (failure #{})",
            delay.as_millis(),
            self.retry.failures()
        );
        self.retry_timer.schedule(delay);
    }

    async fn on_open(&mut self, link: Link) {
        self.connecting = false;
        self.conn += 1;

        let conn = self.conn;
        let Link { sink, mut stream } = link;
        let tx = self.sig_tx.clone();
        self.reader = Some(tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                if tx.send(Signal::Frame { conn, frame }).is_err() {
                    return;
                }
            }
            let _ = tx.send(Signal::ReadEnded { conn });
        }));
        self.sink = Some(sink);

        self.set_state(ConnectionState::Open);
        self.retry.reset();
        log::info!("transport: connected");

        self.send(Outbound::Heartbeat {
            beat: Heartbeat::Ping,
            json: false,
        })
        .await;
        for env in self.registry.replay() {
            if self.state != ConnectionState::Open {
                return;
            }
            self.send(env.into()).await;
        }
        if self.state != ConnectionState::Open {
            return;
        }
        self.arm_heartbeat();
        let _ = self.events.send(TransportEvent::Connected);
    }

    fn connection_lost(&mut self, err: TransportError) {
        if self.state != ConnectionState::Open {
            return;
        }
        log::warn!("transport: connection lost [{}]: {err}", err.class());
        self.teardown();
        self.set_state(ConnectionState::Disconnected);
        self.fail_pending(TransportError::ConnectionLost);
        let _ = self
            .events
            .send(TransportEvent::Disconnected { error: Some(err) });
        self.schedule_retry();
    }

    fn teardown(&mut self) {
        self.sink = None;
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.heartbeat_timer.cancel();
    }

    fn arm_heartbeat(&mut self) {
        if let Some(interval) = self.settings.heartbeat_interval {
            self.heartbeat_timer.schedule(interval);
        }
    }

    // -----------------------------------------------------------------------
    // Signals
    // -----------------------------------------------------------------------

    async fn on_signal(&mut self, sig: Signal) {
        match sig {
            Signal::Attempt { attempt, result } => self.on_attempt(attempt, result).await,
            Signal::Handshake(generation) => {
                if self.handshake_timer.fire(generation) && self.connecting {
                    if let Some(task) = self.attempt_task.take() {
                        task.abort();
                    }
                    self.fail_attempt(TransportError::HandshakeTimeout(
                        self.settings.handshake_timeout,
                    ));
                }
            }
            Signal::Retry(generation) => {
                if self.retry_timer.fire(generation)
                    && self.state == ConnectionState::Disconnected
                    && !self.connecting
                {
                    self.begin_attempt();
                }
            }
            Signal::Heartbeat(generation) => {
                if self.heartbeat_timer.fire(generation) && self.state == ConnectionState::Open {
                    self.send(Outbound::Heartbeat {
                        beat: Heartbeat::Ping,
                        json: false,
                    })
                    .await;
                    if self.state == ConnectionState::Open {
                        self.arm_heartbeat();
                    }
                }
            }
            Signal::Frame { conn, frame } => {
                if conn != self.conn || self.state != ConnectionState::Open {
                    return;
                }
                match frame {
                    Ok(Frame::Text(text)) => self.on_text(&text).await,
                    Ok(Frame::Close { code, reason }) => {
                        self.connection_lost(TransportError::Closed { code, reason })
                    }
                    Err(e) => self.connection_lost(e),
                }
            }
            Signal::ReadEnded { conn } => {
                if conn == self.conn {
                    self.connection_lost(TransportError::Closed {
                        code: CLOSE_ABNORMAL,
                        reason: "stream ended".into(),
                    });
                }
            }
        }
    }

    async fn on_text(&mut self, text: &str) {
        match decode(text) {
            Inbound::Heartbeat { beat, json } => {
                if let Some(reply) = beat.reply() {
                    self.send(Outbound::Heartbeat { beat: reply, json }).await;
                }
            }
            Inbound::Rpc(env) if env.is_reply() => self.resolve_call(env),
            Inbound::Unrecognized(_) => {}
            other => {
                let _ = self.events.send(TransportEvent::Inbound(other));
            }
        }
    }

    fn resolve_call(&mut self, env: RpcEnvelope) {
        let Some(id) = env.correlation_id() else {
            log::warn!("transport: RPC reply without usable id dropped");
            return;
        };
        let Some(reply) = self.pending.remove(&id) else {
            log::debug!("transport: reply for unknown call {id}");
            return;
        };
        let outcome = match (env.payload.error, env.payload.result) {
            (Some(e), _) => Err(TransportError::Rpc {
                code: e.code,
                message: e.message,
            }),
            (None, Some(v)) => Ok(v),
            (None, None) => Ok(Value::Null),
        };
        let _ = reply.send(outcome);
    }

    fn fail_pending(&mut self, err: TransportError) {
        for (_, reply) in self.pending.drain() {
            let _ = reply.send(Err(err.clone()));
        }
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    async fn shutdown(&mut self) {
        log::info!("transport: stopping");
        self.retry_timer.cancel();
        self.handshake_timer.cancel();
        self.heartbeat_timer.cancel();
        if let Some(task) = self.attempt_task.take() {
            task.abort();
        }
        self.connecting = false;

        if let Some(mut sink) = self.sink.take() {
            self.set_state(ConnectionState::Closing);
            let close = Frame::Close {
                code: CLOSE_NORMAL,
                reason: "client shutdown".into(),
            };
            if let Err(e) = sink.send(close).await {
                log::debug!("transport: close frame not delivered: {e}");
            }
            let _ = tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, sink.close()).await;
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }

        self.fail_pending(TransportError::Cancelled);
        self.set_state(ConnectionState::Disconnected);
        let _ = self.events.send(TransportEvent::Disconnected { error: None });
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
        self.state_tx.send_replace(state);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
