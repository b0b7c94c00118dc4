//! Push-to-talk pipeline: key events and microphone audio in, transcripts
//! out to the chat dispatcher.
//!
//! # Architecture
//!
//! ```text
//! KeyEventSource ──HotkeyEvent──┐
//!                               ▼
//! AudioCapture ──PCM──▶ VoiceClient::run()  ← single tokio task
//!                               │
//!                               ├─ PushToTalkGate   (Released / Pressed / Draining)
//!                               ├─ AsrSession       (Idle / Connecting / Active / Completing)
//!                               ├─ ChatDispatcher   (history, chat requests)
//!                               └─ TransportHandle  ──▶ TransportManager task
//!
//! ClientStatus (watch) ←─── read by anyone holding a StatusReceiver
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use edge_voice_client::config::AppConfig;
//! use edge_voice_client::pipeline::{ClientInputs, VoiceClient};
//! use edge_voice_client::transport::WsConnector;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let (client, outputs) = VoiceClient::connect(&config, Arc::new(WsConnector));
//!
//!     let (_keys_tx, keys) = mpsc::unbounded_channel();
//!     let (_audio_tx, audio) = mpsc::unbounded_channel();
//!     # drop(outputs);
//!
//!     client.run(ClientInputs { keys, audio }, std::future::pending()).await;
//! }
//! ```

pub mod gate;
pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use gate::{DrainElapsed, GateAction, PushToTalkGate};
pub use runner::{ClientInputs, ClientOutputs, VoiceClient};
pub use state::{ClientStatus, GateState, StatusReceiver};
