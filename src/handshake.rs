//! The HTTP Upgrade exchange that opens a connection.

use crate::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::BytesMut;
use sha1::{Digest, Sha1};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

pub const SEC_WEBSOCKET_ACCEPT: &str = "Sec-WebSocket-Accept";
pub const SEC_WEBSOCKET_KEY: &str = "Sec-WebSocket-Key";

const GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
const KEY_MARKER: &str = "Sec-WebSocket-Key: ";
const KEY_LEN: usize = 24;
const TERMINATOR: &[u8] = b"\r\n\r\n";

/// Returns the 24 characters following `Sec-WebSocket-Key: ` in `request`.
pub fn extract_request_key(request: &str) -> Result<&str> {
    let start = request.find(KEY_MARKER).ok_or(Error::HandshakeKeyMissing)? + KEY_MARKER.len();
    let rest = &request[start..];
    let (last, ch) = rest
        .char_indices()
        .nth(KEY_LEN - 1)
        .ok_or(Error::HandshakeKeyMissing)?;
    Ok(&rest[..last + ch.len_utf8()])
}

/// Derives the `Sec-WebSocket-Accept` value for a client key.
pub fn accept(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(GUID.as_bytes());
    STANDARD.encode(sha1.finalize())
}

pub fn render_response(accept_key: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: WebSocket\r\n\
         Connection: Upgrade\r\n\
         {}: {}\r\n\r\n",
        SEC_WEBSOCKET_ACCEPT, accept_key
    )
}

/// Reads an upgrade request from `transport` and answers it.
///
/// Any bytes the client sent after the request are left in `read_buf`.
pub(crate) async fn perform<T>(
    transport: &mut T,
    read_buf: &mut BytesMut,
    max_size: usize,
    timeout: Duration,
) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let end = tokio::time::timeout(timeout, read_request(transport, read_buf, max_size))
        .await
        .map_err(|_| Error::HandshakeTimeout)??;

    let request = read_buf.split_to(end);
    let request: String = request.iter().map(|&b| char::from(b)).collect();
    let key = extract_request_key(&request)?;
    trace!(key, "upgrading connection");

    let response = render_response(&accept(key));
    transport
        .write_all(response.as_bytes())
        .await
        .map_err(Error::HandshakeIo)?;
    transport.flush().await.map_err(Error::HandshakeIo)
}

/// Reads until the blank line ending the request and returns its length.
async fn read_request<T>(transport: &mut T, read_buf: &mut BytesMut, max_size: usize) -> Result<usize>
where
    T: AsyncRead + Unpin,
{
    let mut searched = 0;
    loop {
        if let Some(pos) = read_buf[searched..]
            .windows(TERMINATOR.len())
            .position(|w| w == TERMINATOR)
        {
            return Ok(searched + pos + TERMINATOR.len());
        }
        if read_buf.len() >= max_size {
            return Err(Error::HandshakeTooLarge(max_size));
        }
        searched = read_buf.len().saturating_sub(TERMINATOR.len() - 1);

        let n = transport
            .read_buf(read_buf)
            .await
            .map_err(Error::HandshakeIo)?;
        if n == 0 {
            return Err(Error::HandshakeIo(std::io::ErrorKind::UnexpectedEof.into()));
        }
    }
}
