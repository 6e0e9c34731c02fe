use super::ConnectionState;
use crate::frame::Frame;
use crate::{Error, Result};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Upper bound on flushing the close frame to a peer that stopped reading.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

pub(crate) type Transport = Box<dyn AsyncWrite + Send + Unpin>;

pub(crate) struct Inner {
    pub(crate) transport: Transport,
    /// Set while a frame is being written. Still set after the write was
    /// abandoned halfway, in which case the stream can no longer be framed.
    pub(crate) partial: bool,
}

/// The write half of a connection, shared by every task that sends on it.
///
/// Writes race the connection's cancel token, so closing never waits on a
/// peer that has stopped reading.
pub(crate) struct Shared {
    inner: Mutex<Inner>,
    state: std::sync::Mutex<ConnectionState>,
    cancel: CancellationToken,
    write_timeout: Duration,
}

impl Shared {
    pub(crate) fn new(transport: Transport, cancel: CancellationToken, write_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                transport,
                partial: false,
            }),
            state: std::sync::Mutex::new(ConnectionState::Open),
            cancel,
            write_timeout,
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Moves an open connection to `Closing`; later sends fail with `Closed`.
    pub(crate) fn begin_close(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state == ConnectionState::Open {
            *state = ConnectionState::Closing;
        }
    }

    pub(crate) async fn write_frame(&self, frame: &Frame) -> Result<()> {
        let bytes = frame.encode();
        let write = async {
            let mut inner = self.inner.lock().await;
            if self.state() != ConnectionState::Open {
                return Err(Error::Closed);
            }

            inner.partial = true;
            let transport = &mut inner.transport;
            let res = tokio::time::timeout(self.write_timeout, async {
                match transport.write_all(&bytes).await {
                    Ok(()) => transport.flush().await,
                    Err(err) => Err(err),
                }
            })
            .await;

            match res {
                Ok(Ok(())) => {
                    inner.partial = false;
                    Ok(())
                }
                Ok(Err(err)) => Err(Error::Transport(err)),
                Err(_) => Err(Error::Transport(io::ErrorKind::TimedOut.into())),
            }
        };

        tokio::select! {
            _ = self.cancel.cancelled() => Err(Error::Closed),
            res = write => res,
        }
    }

    /// Sends a close frame and shuts the transport down.
    ///
    /// Returns false if the connection was already closed. The connection's
    /// cancel token must be cancelled first so that a blocked writer lets go
    /// of the transport.
    pub(crate) async fn close(&self) -> bool {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state == ConnectionState::Closed {
                return false;
            }
            *state = ConnectionState::Closing;
        }

        let mut inner = self.inner.lock().await;
        // a second close that waited on the lock finds the work done
        if self.state() == ConnectionState::Closed {
            return false;
        }

        let bytes = Frame::close().encode();
        let Inner { transport, partial } = &mut *inner;
        let _ = tokio::time::timeout(CLOSE_TIMEOUT, async {
            if *partial || transport.write_all(&bytes).await.is_ok() {
                let _ = transport.shutdown().await;
            }
        })
        .await;

        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = ConnectionState::Closed;
        true
    }
}
