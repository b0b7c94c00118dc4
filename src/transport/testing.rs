//! In-memory [`Connector`] for tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::link::{Connector, Frame, Link, CLOSE_ABNORMAL};
use super::TransportError;

/// What the next `connect` call does.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Script {
    Refuse,
    Hang,
    Accept,
}

/// The far end of an accepted fake connection.
pub(crate) struct ServerEnd {
    pub rx: mpsc::UnboundedReceiver<Frame>,
    pub tx: mpsc::UnboundedSender<Result<Frame, TransportError>>,
}

impl ServerEnd {
    pub fn frames(&mut self) -> Vec<Frame> {
        let mut out = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            out.push(frame);
        }
        out
    }

    pub fn texts(&mut self) -> Vec<String> {
        self.frames()
            .into_iter()
            .filter_map(|f| match f {
                Frame::Text(t) => Some(t),
                Frame::Close { .. } => None,
            })
            .collect()
    }

    pub fn push(&self, text: &str) {
        let _ = self.tx.send(Ok(Frame::Text(text.to_string())));
    }

    pub fn close(&self, code: u16) {
        let _ = self.tx.send(Ok(Frame::Close {
            code,
            reason: "server closing".into(),
        }));
    }
}

pub(crate) struct FakeConnector {
    script: Mutex<VecDeque<Script>>,
    attempts: Mutex<Vec<Instant>>,
    accepted: mpsc::UnboundedSender<ServerEnd>,
}

impl FakeConnector {
    /// Once `script` is exhausted every further attempt is accepted.
    pub fn new(script: Vec<Script>) -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (accepted, accepted_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            script: Mutex::new(script.into()),
            attempts: Mutex::new(Vec::new()),
            accepted,
        });
        (connector, accepted_rx)
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, _url: &str) -> Result<Link, TransportError> {
        self.attempts.lock().unwrap().push(Instant::now());
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Accept);

        match step {
            Script::Refuse => Err(TransportError::ConnectionRefused("scripted".into())),
            Script::Hang => std::future::pending().await,
            Script::Accept => {
                let (client_tx, server_rx) = mpsc::unbounded_channel::<Frame>();
                let (server_tx, client_rx) =
                    mpsc::unbounded_channel::<Result<Frame, TransportError>>();

                let sink = futures_util::sink::unfold(client_tx, |tx, frame: Frame| async move {
                    tx.send(frame).map_err(|_| TransportError::Closed {
                        code: CLOSE_ABNORMAL,
                        reason: "server gone".into(),
                    })?;
                    Ok::<_, TransportError>(tx)
                });
                let stream = futures_util::stream::unfold(client_rx, |mut rx| async move {
                    rx.recv().await.map(|item| (item, rx))
                });

                let _ = self.accepted.send(ServerEnd {
                    rx: server_rx,
                    tx: server_tx,
                });
                Ok(Link {
                    sink: Box::pin(sink),
                    stream: Box::pin(stream),
                })
            }
        }
    }
}
