//! The physical connection behind the transport manager.
//!
//! [`Connector`] is the seam between the manager's retry/dispatch logic and
//! an actual socket.  [`WsConnector`] opens a WebSocket with
//! `tokio-tungstenite`; tests substitute an in-memory connector.

use std::io::ErrorKind;
use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{future, Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::{
    self,
    protocol::{frame::coding::CloseCode, CloseFrame},
    Message,
};

use super::TransportError;

/// WebSocket normal-closure code.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code reported when the stream ends without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;
const CLOSE_NO_STATUS: u16 = 1005;

/// A text-level frame; binary, ping and pong control frames are handled by
/// the socket layer and never reach the manager.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Close { code: u16, reason: String },
}

pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// An open connection, split into its write and read halves.
pub struct Link {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a connection to `url`.  Must not apply its own deadline; the
    /// manager enforces the handshake timeout.
    async fn connect(&self, url: &str) -> Result<Link, TransportError>;
}

// ---------------------------------------------------------------------------
// WsConnector
// ---------------------------------------------------------------------------

/// Opens `ws://` / `wss://` connections via `tokio-tungstenite`.
#[derive(Debug, Default, Clone)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Link, TransportError> {
        let (ws, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(classify)?;
        let (sink, stream) = ws.split();

        let sink = sink
            .sink_map_err(classify)
            .with(|frame: Frame| future::ready(Ok::<Message, TransportError>(to_message(frame))));

        let stream = stream.filter_map(|msg| future::ready(from_message(msg)));

        Ok(Link {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Close { code, reason } => Message::Close(Some(CloseFrame {
            code: CloseCode::from(code),
            reason: reason.into(),
        })),
    }
}

fn from_message(msg: Result<Message, tungstenite::Error>) -> Option<Result<Frame, TransportError>> {
    match msg {
        Ok(Message::Text(text)) => Some(Ok(Frame::Text(text.to_string()))),
        Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
            Ok(text) => Some(Ok(Frame::Text(text))),
            Err(_) => {
                log::debug!("transport: dropping non-UTF-8 binary frame ({} bytes)", bytes.len());
                None
            }
        },
        Ok(Message::Close(frame)) => Some(Ok(match frame {
            Some(cf) => Frame::Close {
                code: u16::from(cf.code),
                reason: cf.reason.to_string(),
            },
            None => Frame::Close {
                code: CLOSE_NO_STATUS,
                reason: String::new(),
            },
        })),
        Ok(_) => None,
        Err(e) => Some(Err(classify(e))),
    }
}

/// Map a socket-layer error onto the operator-facing classes.  Every class
/// gets the same retry treatment; the split only improves log lines.
pub fn classify(err: tungstenite::Error) -> TransportError {
    match err {
        tungstenite::Error::Io(io) => classify_io(&io),
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            TransportError::Closed {
                code: CLOSE_ABNORMAL,
                reason: "connection closed".into(),
            }
        }
        other => TransportError::Io(other.to_string()),
    }
}

fn classify_io(io: &std::io::Error) -> TransportError {
    if io.kind() == ErrorKind::ConnectionRefused {
        return TransportError::ConnectionRefused(io.to_string());
    }
    let text = io.to_string();
    let lowered = text.to_ascii_lowercase();
    if lowered.contains("failed to lookup address")
        || lowered.contains("name or service not known")
        || lowered.contains("nodename nor servname")
        || lowered.contains("no such host")
        || lowered.contains("temporary failure in name resolution")
    {
        return TransportError::Dns(text);
    }
    TransportError::Io(text)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refused_io_error_is_classified() {
        let err = tungstenite::Error::Io(std::io::Error::new(
            ErrorKind::ConnectionRefused,
            "connection refused",
        ));
        assert!(matches!(classify(err), TransportError::ConnectionRefused(_)));
    }

    #[test]
    fn lookup_failure_is_classified_as_dns() {
        let err = tungstenite::Error::Io(std::io::Error::new(
            ErrorKind::Other,
            "failed to lookup address information: Name or service not known",
        ));
        assert!(matches!(classify(err), TransportError::Dns(_)));
    }

    #[test]
    fn closed_socket_is_classified_as_closed() {
        assert!(matches!(
            classify(tungstenite::Error::ConnectionClosed),
            TransportError::Closed { code: CLOSE_ABNORMAL, .. }
        ));
    }

    #[test]
    fn close_frame_round_trips_code() {
        let msg = to_message(Frame::Close {
            code: CLOSE_NORMAL,
            reason: "bye".into(),
        });
        assert_eq!(
            from_message(Ok(msg)),
            Some(Ok(Frame::Close {
                code: CLOSE_NORMAL,
                reason: "bye".into()
            }))
        );
    }

    #[test]
    fn control_frames_are_swallowed() {
        assert_eq!(from_message(Ok(Message::Ping(Vec::new().into()))), None);
    }
}
