//! Majordomo protocol headers and command codes.
//!
//! ```text
//! header   MDPC01 (client role) | MDPW01 (worker role)
//! command  READY=0x01 REQUEST=0x02 REPLY=0x03 HEARTBEAT=0x04 DISCONNECT=0x05
//! ```

use bytes::Bytes;

/// Header frame sent by the client role.
pub const CLIENT: &[u8] = b"MDPC01";

/// Header frame sent by the worker role.
pub const WORKER: &[u8] = b"MDPW01";

/// Role announced in frame 1 of every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolHeader {
    /// `MDPC01`
    Client,
    /// `MDPW01`
    Worker,
}

impl ProtocolHeader {
    /// Wire representation of the header.
    #[inline]
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            ProtocolHeader::Client => CLIENT,
            ProtocolHeader::Worker => WORKER,
        }
    }

    /// Header as a frame (no allocation).
    #[inline]
    pub fn frame(self) -> Bytes {
        Bytes::from_static(self.as_bytes())
    }

    /// Match a received frame against the known headers.
    pub fn from_frame(frame: &[u8]) -> Option<Self> {
        match frame {
            CLIENT => Some(ProtocolHeader::Client),
            WORKER => Some(ProtocolHeader::Worker),
            _ => None,
        }
    }
}

/// Single-byte worker command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Ready = 0x01,
    Request = 0x02,
    Reply = 0x03,
    Heartbeat = 0x04,
    Disconnect = 0x05,
}

impl Command {
    /// Command byte.
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Command as a one-byte frame.
    pub fn frame(self) -> Bytes {
        match self {
            Command::Ready => Bytes::from_static(&[0x01]),
            Command::Request => Bytes::from_static(&[0x02]),
            Command::Reply => Bytes::from_static(&[0x03]),
            Command::Heartbeat => Bytes::from_static(&[0x04]),
            Command::Disconnect => Bytes::from_static(&[0x05]),
        }
    }

    /// Decode a command frame. Anything but a single known byte is `None`.
    pub fn from_frame(frame: &[u8]) -> Option<Self> {
        match frame {
            [0x01] => Some(Command::Ready),
            [0x02] => Some(Command::Request),
            [0x03] => Some(Command::Reply),
            [0x04] => Some(Command::Heartbeat),
            [0x05] => Some(Command::Disconnect),
            _ => None,
        }
    }
}
