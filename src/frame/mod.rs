//! RFC 6455 frame encoding and decoding.
//!
//! Inbound frames come from clients and must be masked; outbound frames are
//! written unmasked. Fragmented messages are rejected.

use crate::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

mod mask;
pub use mask::apply_mask;

mod text;
pub use text::TextEncoding;

const FIN: u8 = 0x80;
const RSV: u8 = 0x70;
const MASK: u8 = 0x80;
const OPCODE: u8 = 0x0F;
const LEN: u8 = 0x7F;

const LEN_16: u8 = 126;
const LEN_64: u8 = 127;

/// Largest payload that fits in the length byte itself.
pub const MAX_INLINE_LEN: usize = 125;

/// Length of a masking key.
pub const MASK_LEN: usize = 4;

/// Longest possible header: two fixed bytes, an 8 byte length and a key.
pub const MAX_HEADER_LEN: usize = 2 + 8 + MASK_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
    /// One of the codes RFC 6455 leaves unassigned.
    Reserved(u8),
}

impl Opcode {
    /// Reads an opcode from the low nibble of `byte`.
    pub fn from_u8(byte: u8) -> Self {
        match byte & OPCODE {
            0x0 => Opcode::Continuation,
            0x1 => Opcode::Text,
            0x2 => Opcode::Binary,
            0x8 => Opcode::Close,
            0x9 => Opcode::Ping,
            0xA => Opcode::Pong,
            n => Opcode::Reserved(n),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Opcode::Continuation => 0x0,
            Opcode::Text => 0x1,
            Opcode::Binary => 0x2,
            Opcode::Close => 0x8,
            Opcode::Ping => 0x9,
            Opcode::Pong => 0xA,
            Opcode::Reserved(n) => n & OPCODE,
        }
    }

    /// Close, ping and pong frames, plus the reserved control range.
    pub fn is_control(self) -> bool {
        self.as_u8() & 0x8 != 0
    }
}

/// Layout of one received frame, derived from its header bytes.
///
/// The payload starts right after the masking key, so the full frame spans
/// `key_offset + 4 + payload_len` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub opcode: Opcode,
    pub payload_len: u64,
    pub key_offset: usize,
}

impl FrameHeader {
    pub fn payload_offset(&self) -> usize {
        self.key_offset + MASK_LEN
    }

    /// Header, key and payload together.
    pub fn total_len(&self) -> u64 {
        self.payload_offset() as u64 + self.payload_len
    }
}

/// A complete frame with its payload already unmasked.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: Opcode,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(opcode: Opcode, payload: impl Into<Bytes>) -> Self {
        Self {
            opcode,
            payload: payload.into(),
        }
    }

    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Text, payload)
    }

    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Binary, payload)
    }

    pub fn close() -> Self {
        Self::new(Opcode::Close, Bytes::new())
    }

    pub fn ping(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Ping, payload)
    }

    pub fn pong(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Pong, payload)
    }

    /// Encodes the frame unmasked, as a server sends it.
    pub fn encode(&self) -> Bytes {
        encode_frame_bytes(&self.payload, self.opcode)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("opcode", &self.opcode)
            .field("len", &self.payload.len())
            .finish()
    }
}

fn truncated(needed: usize, available: usize) -> Error {
    Error::TruncatedFrame { needed, available }
}

/// Number of header bytes that follow the first two, including the key.
///
/// `head` must hold at least the first two bytes of a frame.
pub fn header_len(head: &[u8]) -> Result<usize> {
    let second = *head.get(1).ok_or_else(|| truncated(2, head.len()))?;
    let extended = match second & LEN {
        LEN_16 => 2,
        LEN_64 => 8,
        _ => 0,
    };
    let key = if second & MASK != 0 { MASK_LEN } else { 0 };
    Ok(extended + key)
}

/// Parses the header of a client frame starting at `buf[0]`.
pub fn decode_header(buf: &[u8]) -> Result<FrameHeader> {
    if buf.len() < 2 {
        return Err(truncated(2, buf.len()));
    }
    let (first, second) = (buf[0], buf[1]);

    if first & FIN == 0 {
        return Err(Error::Fragmented);
    }
    if first & RSV != 0 {
        return Err(Error::MalformedFrame("reserved bits set"));
    }
    if second & MASK == 0 {
        return Err(Error::MalformedFrame("client frame is not masked"));
    }
    let opcode = Opcode::from_u8(first);

    let (payload_len, key_offset) = match second & LEN {
        LEN_16 => {
            if buf.len() < 4 {
                return Err(truncated(4, buf.len()));
            }
            (u64::from(u16::from_be_bytes([buf[2], buf[3]])), 4)
        }
        LEN_64 => {
            if buf.len() < 10 {
                return Err(truncated(10, buf.len()));
            }
            let mut len = [0; 8];
            len.copy_from_slice(&buf[2..10]);
            let len = u64::from_be_bytes(len);
            if len >> 63 != 0 {
                return Err(Error::MalformedFrame("payload length has the high bit set"));
            }
            (len, 10)
        }
        n => (u64::from(n), 2),
    };

    if opcode.is_control() && payload_len > MAX_INLINE_LEN as u64 {
        return Err(Error::MalformedFrame("control frame payload too long"));
    }

    Ok(FrameHeader {
        opcode,
        payload_len,
        key_offset,
    })
}

/// Unmasks the payload of the frame in `buf` in place and returns it.
///
/// Fails with `TruncatedFrame` when `buf` is shorter than the frame.
pub fn unmask_payload<'a>(buf: &'a mut [u8], header: &FrameHeader) -> Result<&'a [u8]> {
    let total = usize::try_from(header.total_len())
        .map_err(|_| truncated(usize::MAX, buf.len()))?;
    if buf.len() < total {
        return Err(truncated(total, buf.len()));
    }

    let mut key = [0; MASK_LEN];
    key.copy_from_slice(&buf[header.key_offset..header.payload_offset()]);

    let payload = &mut buf[header.payload_offset()..total];
    apply_mask(payload, key);
    Ok(payload)
}

/// Unmasks the payload in place and reads it as Latin-1 text.
pub fn decode_payload(buf: &mut [u8], header: &FrameHeader) -> Result<String> {
    unmask_payload(buf, header).map(|payload| TextEncoding::Latin1.decode(payload))
}

fn put_header(buf: &mut BytesMut, opcode: Opcode, len: usize, mask: Option<[u8; 4]>) {
    buf.put_u8(FIN | opcode.as_u8());

    let mask_bit = if mask.is_some() { MASK } else { 0 };
    if len <= MAX_INLINE_LEN {
        buf.put_u8(mask_bit | len as u8);
    } else if len <= usize::from(u16::MAX) {
        buf.put_u8(mask_bit | LEN_16);
        buf.put_u16(len as u16);
    } else {
        buf.put_u8(mask_bit | LEN_64);
        buf.put_u64(len as u64);
    }

    if let Some(key) = mask {
        buf.put_slice(&key);
    }
}

/// Encodes an unmasked frame carrying `payload`.
pub fn encode_frame_bytes(payload: &[u8], opcode: Opcode) -> Bytes {
    let mut buf = BytesMut::with_capacity(MAX_HEADER_LEN + payload.len());
    put_header(&mut buf, opcode, payload.len(), None);
    buf.put_slice(payload);
    buf.freeze()
}

/// Encodes `text` as Latin-1 into an unmasked frame.
pub fn encode_frame(text: &str, opcode: Opcode) -> Bytes {
    encode_frame_bytes(&TextEncoding::Latin1.encode(text), opcode)
}

/// Encodes a masked frame, the way a client sends it.
pub fn encode_masked_frame(payload: &[u8], opcode: Opcode, key: [u8; 4]) -> Bytes {
    let mut buf = BytesMut::with_capacity(MAX_HEADER_LEN + payload.len());
    put_header(&mut buf, opcode, payload.len(), Some(key));

    let start = buf.len();
    buf.put_slice(payload);
    apply_mask(&mut buf[start..], key);
    buf.freeze()
}
