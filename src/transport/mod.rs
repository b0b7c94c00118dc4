//! Reconnecting transport to the edge agent service.
//!
//! # Architecture
//!
//! ```text
//! TransportHandle (clone-able)          TransportManager task
//!   start / send / subscribe  ──cmd──▶  ┌──────────────────────────────┐
//!   publish / call / stop               │ ConnectionState + RetryPolicy │
//!                                       │ SubscriptionRegistry          │
//!                                       │ pending calls (id → oneshot)  │
//!                                       │ retry / handshake / heartbeat │
//!                                       └──────────┬───────────────────┘
//!                                                  │ Link (Connector)
//!   TransportEvent::{Connected, Disconnected,  ◀───┘
//!                    Inbound}
//! ```
//!
//! The manager is the only owner of the connection.  Everything else talks
//! to it through [`TransportHandle`], so a reconnect is invisible to callers
//! apart from the [`TransportEvent::Connected`] / `Disconnected` events.

pub mod backoff;
pub mod link;
pub mod manager;
pub mod subscriptions;

#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::protocol::Inbound;

pub use backoff::RetryPolicy;
pub use link::{Connector, Frame, Link, WsConnector, CLOSE_ABNORMAL, CLOSE_NORMAL};
pub use manager::{TransportHandle, TransportManager, TransportSettings};
pub use subscriptions::SubscriptionRegistry;

// ---------------------------------------------------------------------------
// TransportError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("DNS lookup failed: {0}")]
    Dns(String),

    #[error("handshake did not complete within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("connection closed (code {code}): {reason}")]
    Closed { code: u16, reason: String },

    #[error("transport I/O error: {0}")]
    Io(String),

    #[error("not connected")]
    NotConnected,

    #[error("connection lost before a reply arrived")]
    ConnectionLost,

    #[error("transport stopped")]
    Cancelled,

    #[error("remote error {code}: {message}")]
    Rpc { code: i64, message: String },
}

impl TransportError {
    /// Short operator-facing class name used in reconnect log lines.
    pub fn class(&self) -> &'static str {
        match self {
            TransportError::ConnectionRefused(_) => "refused",
            TransportError::Dns(_) => "dns",
            TransportError::HandshakeTimeout(_) => "handshake-timeout",
            TransportError::Closed { .. } => "closed",
            TransportError::Io(_) => "io",
            TransportError::NotConnected => "not-connected",
            TransportError::ConnectionLost => "connection-lost",
            TransportError::Cancelled => "cancelled",
            TransportError::Rpc { .. } => "rpc",
        }
    }
}

// ---------------------------------------------------------------------------
// ConnectionState / TransportEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Open,
    Closing,
}

impl ConnectionState {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Open => "Open",
            ConnectionState::Closing => "Closing",
        }
    }
}

/// Notifications from the manager to its single consumer.
///
/// Heartbeats and RPC replies are consumed inside the manager and never
/// appear here.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The connection opened and subscriptions were replayed.
    Connected,
    /// The connection dropped.  `error` is `None` after [`TransportHandle::stop`].
    Disconnected { error: Option<TransportError> },
    Inbound(Inbound),
}

// ---------------------------------------------------------------------------
// Outbox
// ---------------------------------------------------------------------------

/// Fire-and-forget publish, the only transport operation the dispatcher
/// needs.  Lets it be tested without a running manager.
pub trait Outbox: Send + Sync {
    fn publish(&self, event: &str, payload: Vec<Value>);
}

impl Outbox for TransportHandle {
    fn publish(&self, event: &str, payload: Vec<Value>) {
        TransportHandle::publish(self, event, payload);
    }
}
