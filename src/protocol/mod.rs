//! Envelope protocol spoken with the edge agent service.
//!
//! Pure transforms only: [`decode`] turns a raw text frame into an
//! [`Inbound`] value and [`Outbound::encode`] does the reverse.  Nothing here
//! holds state or touches the connection.
//!
//! ```rust
//! use edge_voice_client::protocol::{decode, Inbound, Outbound, PubSubEnvelope};
//!
//! let frame = Outbound::from(PubSubEnvelope::subscribe("asr/result"))
//!     .encode()
//!     .unwrap();
//! assert!(matches!(decode(&frame), Inbound::PubSub(_)));
//! ```

pub mod envelope;

pub use envelope::{
    decode, Heartbeat, Inbound, JsonRpc, Outbound, PubSubEnvelope, PubSubKey, RpcEnvelope,
    RpcError, DIRECTION_OUTBOUND, PING, PONG,
};
