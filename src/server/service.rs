use super::Registry;
use crate::config::ServerConfig;
use crate::handshake;
use crate::socket::{Connection, FrameReader};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::warn;

/// Upgrades one accepted socket and runs it until it closes.
///
/// A failed handshake only drops this socket.
pub(crate) async fn serve(
    mut stream: TcpStream,
    peer: SocketAddr,
    config: Arc<ServerConfig>,
    registry: Arc<Registry>,
    cancel: CancellationToken,
    tasks: TaskTracker,
) {
    let _ = stream.set_nodelay(true);

    let mut read_buf = BytesMut::with_capacity(config.max_handshake_size);
    let upgrade = handshake::perform(
        &mut stream,
        &mut read_buf,
        config.max_handshake_size,
        config.handshake_timeout,
    );
    let res = tokio::select! {
        _ = cancel.cancelled() => return,
        res = upgrade => res,
    };
    if let Err(err) = res {
        warn!(peer = %peer, error = %err, "handshake failed");
        return;
    }

    let (reader, writer) = stream.into_split();
    let conn = Arc::new(Connection::new(
        peer,
        writer,
        config.text_encoding,
        config.write_timeout,
        cancel,
    ));
    registry.insert(conn.clone());

    if let Some(keepalive) = config.keepalive {
        tasks.spawn(conn.clone().keepalive(keepalive, registry.clone()));
    }

    let reader = FrameReader::new(reader, read_buf, config.max_payload_size);
    conn.receive(reader, registry).await;
}
