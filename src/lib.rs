//! A WebSocket server over raw TCP sockets.
//!
//! The server performs the HTTP Upgrade handshake itself, decodes client
//! frames and reports connection and message events to registered
//! [`Observer`]s. Messages are sent as single, unfragmented frames.

mod error;
pub use error::{Error, Result};

mod config;
pub use config::{Keepalive, ServerConfig};

pub mod frame;
pub use frame::{Frame, Opcode, TextEncoding};

pub mod handshake;

mod socket;
pub use socket::{Connection, ConnectionId, ConnectionState};

mod server;
pub use server::{Event, Observer, Server};
