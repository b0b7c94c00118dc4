//! Push-to-talk voice client for the edge agent service.
//!
//! Holding the push-to-talk key streams microphone audio to a remote ASR
//! session over one reconnecting WebSocket.  Final transcripts are sent on
//! as chat requests and the replies are kept as conversation history.

pub mod asr;
pub mod audio;
pub mod chat;
pub mod config;
pub mod hotkey;
pub mod pipeline;
pub mod protocol;
pub mod timer;
pub mod transport;
