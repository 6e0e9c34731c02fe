use crate::socket::ConnectionId;
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The frame header carries a value this server does not accept.
    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),

    /// The header declares more bytes than the buffer holds.
    #[error("truncated frame: needed {needed} bytes, {available} available")]
    TruncatedFrame { needed: usize, available: usize },

    #[error("frame payload of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: u64, max: usize },

    /// A frame arrived with the final-fragment bit unset.
    #[error("fragmented messages are not supported")]
    Fragmented,

    #[error("handshake request has no Sec-WebSocket-Key")]
    HandshakeKeyMissing,

    #[error("handshake request exceeds {0} bytes")]
    HandshakeTooLarge(usize),

    #[error("handshake timed out")]
    HandshakeTimeout,

    #[error("handshake IO error: {0}")]
    HandshakeIo(#[source] io::Error),

    #[error("{0} is not connected")]
    NotConnected(ConnectionId),

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// The connection was closed by either side.
    #[error("connection closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_transport_faults() {
        let io = io::Error::new(io::ErrorKind::BrokenPipe, "gone");
        match Error::from(io) {
            Error::Transport(err) => assert_eq!(err.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            Error::NotConnected(ConnectionId::from("client-x")).to_string(),
            "client-x is not connected"
        );
    }

    #[test]
    fn display_truncated() {
        let err = Error::TruncatedFrame {
            needed: 10,
            available: 4,
        };
        assert_eq!(
            err.to_string(),
            "truncated frame: needed 10 bytes, 4 available"
        );
    }
}
