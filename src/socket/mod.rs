use crate::config::Keepalive;
use crate::frame::{Frame, Opcode, TextEncoding};
use crate::server::Registry;
use crate::{Error, Result};
use bytes::Bytes;
use rand::{thread_rng, Rng};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

mod reader;
pub(crate) use reader::FrameReader;

mod shared;
use shared::Shared;

const ID_PREFIX: &str = "client";
const ID_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_LEN: usize = 16;

/// Identifies one accepted connection, e.g. `client-0f3k9x...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn generate() -> Self {
        let mut rng = thread_rng();
        let suffix: String = (0..ID_LEN)
            .map(|_| char::from(ID_CHARS[rng.gen_range(0..ID_CHARS.len())]))
            .collect();
        Self(format!("{}-{}", ID_PREFIX, suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for ConnectionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Closing,
    Closed,
}

/// One upgraded client connection.
///
/// The read half is owned by the connection's receive task; the write half
/// is shared so the server, the receive task and the keepalive task can all
/// send on it.
pub struct Connection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    encoding: TextEncoding,
    shared: Shared,
    awaiting_pong: AtomicBool,
    cancel: CancellationToken,
}

impl Connection {
    pub(crate) fn new<W>(
        peer_addr: SocketAddr,
        transport: W,
        encoding: TextEncoding,
        write_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            id: ConnectionId::generate(),
            peer_addr,
            encoding,
            shared: Shared::new(Box::new(transport), cancel.clone(), write_timeout),
            awaiting_pong: AtomicBool::new(false),
            cancel,
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Address of the remote end; unique among live connections.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// True between sending a ping and receiving the matching pong.
    pub fn is_awaiting_pong(&self) -> bool {
        self.awaiting_pong.load(Ordering::Acquire)
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub async fn send_frame(&self, frame: &Frame) -> Result<()> {
        trace!(client = %self.id, ?frame, "sending frame");
        self.shared.write_frame(frame).await
    }

    /// Sends `text` in a single text frame, using the configured encoding.
    pub async fn send_text(&self, text: &str) -> Result<()> {
        self.send_frame(&Frame::text(self.encoding.encode(text)))
            .await
    }

    pub async fn ping(&self, payload: impl Into<Bytes>) -> Result<()> {
        self.awaiting_pong.store(true, Ordering::Release);
        self.send_frame(&Frame::ping(payload)).await
    }

    /// Stops the receive task and closes the transport.
    ///
    /// Returns false if the connection was already closed.
    pub async fn close(&self) -> bool {
        self.cancel.cancel();
        self.shared.close().await
    }

    /// Reads and dispatches frames until the peer closes, a fault occurs or
    /// the connection is cancelled, then removes it from `registry`.
    pub(crate) async fn receive<R>(self: Arc<Self>, mut reader: FrameReader<R>, registry: Arc<Registry>)
    where
        R: AsyncRead + Unpin,
    {
        let res = loop {
            let frame = tokio::select! {
                _ = self.cancel.cancelled() => break Ok(()),
                frame = reader.next_frame() => frame,
            };

            match frame {
                Ok(frame) => match self.dispatch(frame, &registry).await {
                    Ok(true) => {}
                    Ok(false) => break Ok(()),
                    Err(err) => break Err(err),
                },
                Err(err) => break Err(err),
            }
        };

        match res {
            Ok(()) => debug!(client = %self.id, "connection closed"),
            Err(Error::Transport(err)) => debug!(client = %self.id, error = %err, "transport fault"),
            Err(err) => warn!(client = %self.id, error = %err, "closing connection"),
        }
        registry.disconnect(&self.id).await;
    }

    /// Handles one frame; returns false once the peer has asked to close.
    async fn dispatch(&self, frame: Frame, registry: &Registry) -> Result<bool> {
        trace!(client = %self.id, ?frame, "received frame");
        match frame.opcode {
            Opcode::Text | Opcode::Binary => {
                let text = self.encoding.decode(&frame.payload);
                registry.message_received(&self.id, &text);
            }
            Opcode::Close => {
                self.shared.begin_close();
                return Ok(false);
            }
            Opcode::Ping => self.send_frame(&Frame::pong(frame.payload)).await?,
            Opcode::Pong => self.awaiting_pong.store(false, Ordering::Release),
            Opcode::Continuation => {
                return Err(Error::MalformedFrame("continuation without a fragmented message"))
            }
            Opcode::Reserved(_) => return Err(Error::MalformedFrame("reserved opcode")),
        }
        Ok(true)
    }

    /// Pings the peer every `interval` and drops it when a pong does not
    /// arrive within `timeout`.
    pub(crate) async fn keepalive(self: Arc<Self>, keepalive: Keepalive, registry: Arc<Registry>) {
        let mut ticker = tokio::time::interval(keepalive.interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }
            if self.ping(Bytes::new()).await.is_err() {
                break;
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(keepalive.timeout) => {}
            }
            if self.is_awaiting_pong() {
                warn!(client = %self.id, "pong not received in time");
                break;
            }
        }
        registry.disconnect(&self.id).await;
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("awaiting_pong", &self.is_awaiting_pong())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encode_frame;
    use tokio::io::AsyncReadExt;

    fn connection_with_buffer(size: usize) -> (Connection, tokio::io::DuplexStream) {
        let (client, server) = tokio::io::duplex(size);
        let addr = "127.0.0.1:9000".parse().unwrap();
        let conn = Connection::new(
            addr,
            server,
            TextEncoding::Latin1,
            Duration::from_secs(10),
            CancellationToken::new(),
        );
        (conn, client)
    }

    fn connection() -> (Connection, tokio::io::DuplexStream) {
        connection_with_buffer(1024)
    }

    #[test]
    fn generated_ids() {
        let id = ConnectionId::generate();
        let suffix = id.as_str().strip_prefix("client-").unwrap();
        assert_eq!(suffix.len(), 16);
        assert!(suffix.bytes().all(|b| ID_CHARS.contains(&b)));
        assert_ne!(id, ConnectionId::generate());
    }

    #[tokio::test]
    async fn sends_unmasked_text() {
        let (conn, mut client) = connection();
        conn.send_text("hello").await.unwrap();

        let expected = encode_frame("hello", Opcode::Text);
        let mut buf = vec![0; expected.len()];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf[..], &expected[..]);
    }

    #[tokio::test]
    async fn ping_sets_pending_pong() {
        let (conn, mut client) = connection();
        assert!(!conn.is_awaiting_pong());
        conn.ping(&b"hb"[..]).await.unwrap();
        assert!(conn.is_awaiting_pong());

        let mut buf = [0; 4];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x89, 2, b'h', b'b']);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (conn, mut client) = connection();
        assert!(conn.close().await);
        assert!(!conn.close().await);
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(conn.cancel.is_cancelled());

        let mut buf = Vec::new();
        client.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, vec![0x88, 0x00]);

        assert!(matches!(conn.send_text("late").await, Err(Error::Closed)));
    }

    #[tokio::test]
    async fn close_frame_moves_to_closing() {
        let (conn, mut client) = connection();
        let registry = Registry::new();
        assert_eq!(conn.state(), ConnectionState::Open);

        assert!(!conn.dispatch(Frame::close(), &registry).await.unwrap());
        assert_eq!(conn.state(), ConnectionState::Closing);
        assert!(matches!(conn.send_text("after close").await, Err(Error::Closed)));

        assert!(conn.close().await);
        assert_eq!(conn.state(), ConnectionState::Closed);

        let mut buf = Vec::new();
        client.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, vec![0x88, 0x00]);
    }

    #[tokio::test]
    async fn close_interrupts_a_stalled_write() {
        let (conn, mut client) = connection_with_buffer(64);
        let conn = Arc::new(conn);

        let writer = tokio::spawn({
            let conn = conn.clone();
            async move { conn.send_text(&"x".repeat(10_000)).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!writer.is_finished());

        let closed = tokio::time::timeout(Duration::from_secs(3), conn.close()).await;
        assert_eq!(closed.ok(), Some(true));
        assert!(matches!(writer.await.unwrap(), Err(Error::Closed)));
        assert_eq!(conn.state(), ConnectionState::Closed);

        // the half-written frame is never followed by a close frame
        let mut buf = Vec::new();
        client.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf.len(), 64);
        assert_eq!(&buf[..2], &[0x81, 126]);
    }

    #[tokio::test]
    async fn stalled_write_times_out() {
        let (client, server) = tokio::io::duplex(64);
        let addr = "127.0.0.1:9001".parse().unwrap();
        let conn = Connection::new(
            addr,
            server,
            TextEncoding::Latin1,
            Duration::from_millis(100),
            CancellationToken::new(),
        );

        match conn.send_text(&"y".repeat(10_000)).await {
            Err(Error::Transport(err)) => assert_eq!(err.kind(), std::io::ErrorKind::TimedOut),
            other => panic!("unexpected {:?}", other),
        }
        drop(client);
    }
}
