//! The remote side of an ASR session.
//!
//! [`AsrBackend`] is everything [`AsrSession`](super::AsrSession) needs from
//! the service: negotiate a session, stream audio, commit, and announce
//! recording boundaries.  [`RemoteAsr`] implements it over the transport;
//! tests use a recording fake.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;
use serde_json::json;

use crate::config::AsrConfig;
use crate::transport::TransportHandle;

use super::AsrError;

/// Parameters sent when negotiating a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionParams {
    pub provider: String,
    pub language: String,
    pub vad_enabled: bool,
    pub sample_rate: u32,
}

impl SessionParams {
    pub fn from_config(config: &AsrConfig) -> Self {
        Self {
            provider: config.provider.clone(),
            language: config.language.clone(),
            vad_enabled: config.vad_enabled,
            sample_rate: config.sample_rate,
        }
    }
}

#[async_trait]
pub trait AsrBackend: Send + Sync + 'static {
    /// Ask the service for a session.  Resolves on acknowledgement.
    async fn open_session(&self, params: &SessionParams) -> Result<(), AsrError>;

    fn send_audio(&self, seq: u64, chunk: &[u8]);

    /// End-of-utterance instruction, used only when server VAD is off.
    fn commit(&self);

    fn recording_started(&self);

    fn recording_completed(&self);
}

// ---------------------------------------------------------------------------
// RemoteAsr
// ---------------------------------------------------------------------------

/// [`AsrBackend`] that negotiates over RPC and streams over pub/sub.
///
/// | Operation             | Wire                                                |
/// |-----------------------|-----------------------------------------------------|
/// | `open_session`        | RPC `<session_method>` with [`SessionParams`]       |
/// | `send_audio`          | publish `<ns>/asr/audio` `[{"seq", "data": b64}]`   |
/// | `commit`              | publish `<ns>/asr/commit`                           |
/// | `recording_started`   | publish `<ns>/asr/recording_started`                |
/// | `recording_completed` | publish `<ns>/asr/recording_completed`              |
pub struct RemoteAsr {
    transport: TransportHandle,
    namespace: String,
    session_method: String,
}

impl RemoteAsr {
    pub fn new(transport: TransportHandle, config: &AsrConfig) -> Self {
        Self {
            transport,
            namespace: config.namespace.clone(),
            session_method: config.session_method.clone(),
        }
    }

    fn control_event(&self, name: &str) -> String {
        control_event(&self.namespace, name)
    }
}

/// `<ns>/asr/<name>`, or `asr/<name>` with an empty namespace.
pub fn control_event(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        format!("asr/{name}")
    } else {
        format!("{namespace}/asr/{name}")
    }
}

#[async_trait]
impl AsrBackend for RemoteAsr {
    async fn open_session(&self, params: &SessionParams) -> Result<(), AsrError> {
        let params = serde_json::to_value(params)
            .map_err(|e| AsrError::Remote(format!("encoding session params: {e}")))?;
        let ack = self
            .transport
            .call(&self.session_method, params)
            .await
            .map_err(AsrError::Negotiation)?;
        log::debug!("asr: session acknowledged: {ack}");
        Ok(())
    }

    fn send_audio(&self, seq: u64, chunk: &[u8]) {
        self.transport.publish(
            &self.control_event("audio"),
            vec![json!({ "seq": seq, "data": STANDARD.encode(chunk) })],
        );
    }

    fn commit(&self) {
        self.transport.publish(&self.control_event("commit"), Vec::new());
    }

    fn recording_started(&self) {
        self.transport
            .publish(&self.control_event("recording_started"), Vec::new());
    }

    fn recording_completed(&self) {
        self.transport
            .publish(&self.control_event("recording_completed"), Vec::new());
    }
}

// ---------------------------------------------------------------------------
// Test fake
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod fake {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Open,
        Audio(u64, usize),
        Commit,
        Started,
        Completed,
    }

    /// Records every call.  `open_session` succeeds after `open_delay`
    /// unless `fail_open` is set.
    #[derive(Default)]
    pub struct FakeAsr {
        pub calls: Mutex<Vec<Call>>,
        pub open_delay: Duration,
        pub fail_open: bool,
    }

    impl FakeAsr {
        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        pub fn audio_chunks(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c, Call::Audio(..)))
                .count()
        }

        pub fn commits(&self) -> usize {
            self.calls().iter().filter(|c| **c == Call::Commit).count()
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl AsrBackend for FakeAsr {
        async fn open_session(&self, _params: &SessionParams) -> Result<(), AsrError> {
            self.record(Call::Open);
            if !self.open_delay.is_zero() {
                tokio::time::sleep(self.open_delay).await;
            }
            if self.fail_open {
                Err(AsrError::Remote("no provider".into()))
            } else {
                Ok(())
            }
        }

        fn send_audio(&self, seq: u64, chunk: &[u8]) {
            self.record(Call::Audio(seq, chunk.len()));
        }

        fn commit(&self) {
            self.record(Call::Commit);
        }

        fn recording_started(&self) {
            self.record(Call::Started);
        }

        fn recording_completed(&self) {
            self.record(Call::Completed);
        }
    }
}
