//! Push-to-talk key events.
//!
//! The client consumes only [`HotkeyEvent`]s.  Where they come from is a
//! [`KeyEventSource`]: the global `rdev` listener ([`HotkeyListener`]) or
//! [`NullKeySource`] for headless runs.
//!
//! # Usage
//!
//! ```no_run
//! use tokio::sync::mpsc;
//! use edge_voice_client::hotkey::{parse_binding, HotkeyListener, KeyEventSource};
//!
//! let binding = parse_binding("F9", &["Ctrl".to_string()]).expect("bad binding");
//! let (tx, mut rx) = mpsc::unbounded_channel();
//! let mut listener = HotkeyListener::new(binding);
//! listener.start(tx).expect("listener thread");
//! ```

pub mod binding;
pub mod listener;

use thiserror::Error;
use tokio::sync::mpsc;

pub use binding::{parse_binding, parse_key, BindingTracker, HotkeyBinding, Modifier};
pub use listener::HotkeyListener;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyEvent {
    PushToTalkPressed,
    PushToTalkReleased,
}

#[derive(Debug, Error)]
pub enum HotkeyError {
    #[error("unknown key name {0:?}")]
    UnknownKey(String),

    #[error("unknown modifier {0:?}")]
    UnknownModifier(String),

    #[error("failed to spawn hotkey listener thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Anything that can deliver push-to-talk events.
pub trait KeyEventSource {
    fn start(&mut self, tx: mpsc::UnboundedSender<HotkeyEvent>) -> Result<(), HotkeyError>;

    fn stop(&mut self);
}

/// Never produces events.
#[derive(Debug, Default)]
pub struct NullKeySource {
    tx: Option<mpsc::UnboundedSender<HotkeyEvent>>,
}

impl KeyEventSource for NullKeySource {
    fn start(&mut self, tx: mpsc::UnboundedSender<HotkeyEvent>) -> Result<(), HotkeyError> {
        self.tx = Some(tx);
        Ok(())
    }

    fn stop(&mut self) {
        self.tx = None;
    }
}
