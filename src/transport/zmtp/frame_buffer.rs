//! ZMTP 3.0 frame encoding and incremental decoding.
//!
//! Wire layout of one frame:
//!
//! ```text
//! +-------+------------------+-----------+
//! | flags | size (1 or 8 B)  | body      |
//! +-------+------------------+-----------+
//! ```
//!
//! `flags` bit 0 is MORE (another frame of the same message follows), bit 1
//! is LONG (size is a 64-bit big-endian integer instead of one byte) and
//! bit 2 is COMMAND (a connection-level command, not message data).
//!
//! [`FrameBuffer`] accumulates partial reads and yields whole frames:
//! - `WaitingForHeader`: need the flags byte plus 1 or 8 size bytes
//! - `WaitingForBody`: header parsed, need N more body bytes

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{MdpError, Result};

/// Frame flag bits.
pub mod flags {
    pub const MORE: u8 = 0x01;
    pub const LONG: u8 = 0x02;
    pub const COMMAND: u8 = 0x04;
    /// Bits 3-7 must be zero.
    pub const RESERVED: u8 = 0xF8;
}

/// Largest frame body accepted by default (256 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: u64 = 256 * 1024 * 1024;

/// Largest size that fits the short (1 byte) encoding.
const SHORT_SIZE_MAX: usize = u8::MAX as usize;

/// Encoded frame header: flags plus 1 or 8 size bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    bytes: [u8; 9],
    len: usize,
}

impl FrameHeader {
    /// Header for a body of `size` bytes. LONG is set automatically.
    pub fn new(frame_flags: u8, size: usize) -> Self {
        let mut bytes = [0u8; 9];
        if size > SHORT_SIZE_MAX {
            bytes[0] = frame_flags | flags::LONG;
            bytes[1..9].copy_from_slice(&(size as u64).to_be_bytes());
            Self { bytes, len: 9 }
        } else {
            bytes[0] = frame_flags & !flags::LONG;
            bytes[1] = size as u8;
            Self { bytes, len: 2 }
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZmtpFrame {
    pub flags: u8,
    pub body: Bytes,
}

impl ZmtpFrame {
    #[inline]
    pub fn is_more(&self) -> bool {
        self.flags & flags::MORE != 0
    }

    #[inline]
    pub fn is_command(&self) -> bool {
        self.flags & flags::COMMAND != 0
    }
}

/// Append one frame to `dst`.
pub fn encode_frame(dst: &mut BytesMut, frame_flags: u8, body: &[u8]) {
    let header = FrameHeader::new(frame_flags, body.len());
    dst.reserve(header.as_bytes().len() + body.len());
    dst.put_slice(header.as_bytes());
    dst.put_slice(body);
}

/// Append a multipart message to `dst`, setting MORE on all but the last frame.
pub fn encode_message(dst: &mut BytesMut, frames: &[Bytes]) {
    let last = frames.len().saturating_sub(1);
    for (index, frame) in frames.iter().enumerate() {
        let frame_flags = if index < last { flags::MORE } else { 0 };
        encode_frame(dst, frame_flags, frame);
    }
}

/// Append a command frame to `dst`.
pub fn encode_command(dst: &mut BytesMut, body: &[u8]) {
    encode_frame(dst, flags::COMMAND, body);
}

#[derive(Debug, Clone, Copy)]
enum State {
    WaitingForHeader,
    WaitingForBody { flags: u8, remaining: usize },
}

/// Accumulates incoming bytes and extracts complete frames.
#[derive(Debug)]
pub struct FrameBuffer {
    buffer: BytesMut,
    state: State,
    max_frame_size: u64,
}

impl FrameBuffer {
    /// Default capacity 64KB, max frame size [`DEFAULT_MAX_FRAME_SIZE`].
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(max_frame_size: u64) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForHeader,
            max_frame_size,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Partial data is kept for the next push.
    ///
    /// # Errors
    ///
    /// Reserved flag bits set, or a frame larger than the configured maximum.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<ZmtpFrame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    fn try_extract_one(&mut self) -> Result<Option<ZmtpFrame>> {
        match self.state {
            State::WaitingForHeader => {
                let Some(&frame_flags) = self.buffer.first() else {
                    return Ok(None);
                };
                if frame_flags & flags::RESERVED != 0 {
                    return Err(MdpError::protocol(format!(
                        "ZMTP frame has reserved flag bits set: 0x{:02X}",
                        frame_flags
                    )));
                }

                let header_len = if frame_flags & flags::LONG != 0 { 9 } else { 2 };
                if self.buffer.len() < header_len {
                    return Ok(None);
                }

                let size = if header_len == 9 {
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(&self.buffer[1..9]);
                    u64::from_be_bytes(raw)
                } else {
                    u64::from(self.buffer[1])
                };
                if size > self.max_frame_size {
                    return Err(MdpError::protocol(format!(
                        "ZMTP frame size {} exceeds maximum {}",
                        size, self.max_frame_size
                    )));
                }

                let _ = self.buffer.split_to(header_len);
                let frame_flags = frame_flags & (flags::MORE | flags::COMMAND);

                if size == 0 {
                    return Ok(Some(ZmtpFrame {
                        flags: frame_flags,
                        body: Bytes::new(),
                    }));
                }

                self.state = State::WaitingForBody {
                    flags: frame_flags,
                    remaining: size as usize,
                };
                self.try_extract_one()
            }

            State::WaitingForBody { flags, remaining } => {
                if self.buffer.len() < remaining {
                    return Ok(None);
                }

                let body = self.buffer.split_to(remaining).freeze();
                self.state = State::WaitingForHeader;
                Ok(Some(ZmtpFrame { flags, body }))
            }
        }
    }

    /// Number of buffered bytes not yet returned as frames.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForBody { .. } => "WaitingForBody",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
