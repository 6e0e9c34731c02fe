use crate::frame::{self, Frame};
use crate::{Error, Result};
use bytes::BytesMut;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

const READ_CHUNK: usize = 4096;

/// Reads whole frames from the read half of a connection.
///
/// The first two bytes decide how much header follows, so nothing past the
/// current frame is ever required before it can be decoded.
pub(crate) struct FrameReader<R> {
    transport: R,
    read_buf: BytesMut,
    max_payload_size: usize,
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    /// `read_buf` may already hold bytes received along with the handshake.
    pub(crate) fn new(transport: R, read_buf: BytesMut, max_payload_size: usize) -> Self {
        Self {
            transport,
            read_buf,
            max_payload_size,
        }
    }

    pub(crate) async fn next_frame(&mut self) -> Result<Frame> {
        self.fill(2).await?;
        let header_len = 2 + frame::header_len(&self.read_buf[..2])?;

        self.fill(header_len).await?;
        let header = frame::decode_header(&self.read_buf[..header_len])?;
        if header.payload_len > self.max_payload_size as u64 {
            return Err(Error::FrameTooLarge {
                len: header.payload_len,
                max: self.max_payload_size,
            });
        }

        // bounded by max_payload_size above
        let total = header.total_len() as usize;
        self.fill(total).await?;

        let mut buf = self.read_buf.split_to(total);
        frame::unmask_payload(&mut buf, &header)?;
        let payload = buf.split_off(header.payload_offset()).freeze();
        Ok(Frame::new(header.opcode, payload))
    }

    async fn fill(&mut self, len: usize) -> Result<()> {
        while self.read_buf.len() < len {
            self.read_buf.reserve((len - self.read_buf.len()).max(READ_CHUNK));
            if self.transport.read_buf(&mut self.read_buf).await? == 0 {
                return Err(Error::Transport(io::ErrorKind::UnexpectedEof.into()));
            }
        }
        Ok(())
    }
}
