//! Remote speech-recognition session control.
//!
//! # State machine
//!
//! ```text
//!          ensure_active()            negotiated Ok
//!   Idle ───────────────▶ Connecting ──────────────▶ Active
//!    ▲                        │ Err / timeout          │ commit_and_wait()
//!    │◀───────────────────────┘                        ▼
//!    │◀── completed / deadline / remote error ──── Completing
//!    │◀── transport lost (any state, waiter gets "")
//! ```
//!
//! Audio pushed while `Connecting` is held and flushed in order once the
//! session is `Active`.  One [`PendingTranscription`] slot collects the
//! final text; it is settled by whichever of completion, deadline, remote
//! error or transport loss happens first, and only once.

pub mod backend;
pub mod events;
pub mod session;
pub mod waiter;

use std::time::Duration;

use thiserror::Error;

use crate::transport::TransportError;

pub use backend::{control_event, AsrBackend, RemoteAsr, SessionParams};
pub use events::{AsrEvent, CONSUMED_EVENTS};
pub use session::{AsrNotice, AsrSession, AsrSettings, AsrSignal};
pub use waiter::PendingTranscription;

/// What a transcription waiter settles with.  `Ok("")` means the session
/// ended without a usable transcript (e.g. the connection dropped).
pub type TranscriptResult = Result<String, AsrError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AsrError {
    #[error("ASR session negotiation failed: {0}")]
    Negotiation(TransportError),

    #[error("ASR session negotiation timed out after {0:?}")]
    NegotiationTimeout(Duration),

    #[error("remote ASR error: {0}")]
    Remote(String),

    #[error("transcription timeout, no text")]
    NoText,

    #[error("superseded by a newer transcription request")]
    Superseded,

    #[error("no active ASR session")]
    NotActive,

    #[error("ASR session cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AsrState {
    #[default]
    Idle,
    Connecting,
    Active,
    Completing,
}

impl AsrState {
    pub fn label(&self) -> &'static str {
        match self {
            AsrState::Idle => "Idle",
            AsrState::Connecting => "Connecting",
            AsrState::Active => "Active",
            AsrState::Completing => "Completing",
        }
    }
}
