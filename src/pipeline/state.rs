//! Gate state and the status snapshot published by the client.
//!
//! [`ClientStatus`] is the single source of truth for observers (a status
//! line, a future UI).  [`VoiceClient`](super::VoiceClient) owns the
//! `watch::Sender`; anyone holding a [`StatusReceiver`] sees every change.

use tokio::sync::watch;

use crate::asr::AsrState;
use crate::transport::ConnectionState;

// ---------------------------------------------------------------------------
// GateState
// ---------------------------------------------------------------------------

/// Push-to-talk gate states.
///
/// ```
/// use edge_voice_client::pipeline::GateState;
///
/// assert!(GateState::Pressed.accepts_audio());
/// assert!(GateState::Draining.accepts_audio());
/// assert!(!GateState::Released.accepts_audio());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GateState {
    /// Key up; captured audio is discarded.
    #[default]
    Released,
    /// Key held; audio is forwarded.
    Pressed,
    /// Key just released; in-flight audio is still forwarded until the
    /// drain window closes.
    Draining,
}

impl GateState {
    pub fn accepts_audio(&self) -> bool {
        matches!(self, GateState::Pressed | GateState::Draining)
    }

    pub fn label(&self) -> &'static str {
        match self {
            GateState::Released => "Released",
            GateState::Pressed => "Pressed",
            GateState::Draining => "Draining",
        }
    }
}

// ---------------------------------------------------------------------------
// ClientStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientStatus {
    pub connection: ConnectionState,
    pub gate: GateState,
    pub asr: AsrState,
    /// Last final transcript handed to the dispatcher.
    pub last_transcript: Option<String>,
    /// Cleared at the start of every press.
    pub last_error: Option<String>,
}

impl ClientStatus {
    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "conn={} ptt={} asr={}",
            self.connection.label(),
            self.gate.label(),
            self.asr.label()
        );
        if let Some(err) = &self.last_error {
            line.push_str(&format!(" error={err:?}"));
        }
        line
    }
}

pub type StatusReceiver = watch::Receiver<ClientStatus>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_status_is_idle_everywhere() {
        let status = ClientStatus::default();
        assert_eq!(status.connection, ConnectionState::Disconnected);
        assert_eq!(status.gate, GateState::Released);
        assert_eq!(status.asr, AsrState::Idle);
        assert!(status.last_transcript.is_none());
    }

    #[test]
    fn summary_includes_error_only_when_set() {
        let mut status = ClientStatus::default();
        assert_eq!(status.summary(), "conn=Disconnected ptt=Released asr=Idle");
        status.last_error = Some("boom".into());
        assert!(status.summary().ends_with("error=\"boom\""));
    }

    #[test]
    fn status_receiver_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<StatusReceiver>();
    }
}
