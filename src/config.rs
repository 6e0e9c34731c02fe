//! Server configuration.

use crate::frame::TextEncoding;
use std::time::Duration;

/// Periodic ping settings for detecting dead peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keepalive {
    /// Time between pings.
    pub interval: Duration,
    /// How long a ping may go unanswered before the connection is dropped.
    pub timeout: Duration,
}

impl Keepalive {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

impl Default for Keepalive {
    fn default() -> Self {
        Self::new(Duration::from_secs(30), Duration::from_secs(10))
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Largest upgrade request accepted, in bytes.
    pub max_handshake_size: usize,
    /// Time allowed for a client to send its upgrade request.
    pub handshake_timeout: Duration,
    /// Largest payload accepted in a single frame, in bytes.
    pub max_payload_size: usize,
    /// Time allowed for writing one frame before the peer is treated as dead.
    pub write_timeout: Duration,
    pub keepalive: Option<Keepalive>,
    pub text_encoding: TextEncoding,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_handshake_size: 4096,
            handshake_timeout: Duration::from_secs(10),
            max_payload_size: 16 << 20,
            write_timeout: Duration::from_secs(10),
            keepalive: None,
            text_encoding: TextEncoding::default(),
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_handshake_size(mut self, size: usize) -> Self {
        self.max_handshake_size = size;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_max_payload_size(mut self, size: usize) -> Self {
        self.max_payload_size = size;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_keepalive(mut self, keepalive: Keepalive) -> Self {
        self.keepalive = Some(keepalive);
        self
    }

    pub fn with_text_encoding(mut self, encoding: TextEncoding) -> Self {
        self.text_encoding = encoding;
        self
    }
}
