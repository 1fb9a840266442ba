//! ZMTP 3.0 greeting and NULL security handshake.
//!
//! ```text
//! signature   0xFF 8×padding 0x7F
//! version     3 0
//! mechanism   "NULL" zero-padded to 20 bytes
//! as-server   0
//! filler      31 zero bytes
//! ```
//!
//! After the greetings both peers send a `READY` command carrying metadata
//! properties (`Socket-Type`, optionally `Identity`). A peer that refuses the
//! connection sends `ERROR` instead.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{MdpError, Result};

pub const GREETING_SIZE: usize = 64;
pub const VERSION_MAJOR: u8 = 3;
pub const VERSION_MINOR: u8 = 0;
pub const MECHANISM_NULL: &[u8] = b"NULL";

const MECHANISM_OFFSET: usize = 12;
const MECHANISM_LEN: usize = 20;

/// Our greeting: ZMTP 3.0, NULL mechanism, client role.
pub fn greeting() -> [u8; GREETING_SIZE] {
    let mut greeting = [0u8; GREETING_SIZE];
    greeting[0] = 0xFF;
    greeting[9] = 0x7F;
    greeting[10] = VERSION_MAJOR;
    greeting[11] = VERSION_MINOR;
    greeting[MECHANISM_OFFSET..MECHANISM_OFFSET + MECHANISM_NULL.len()]
        .copy_from_slice(MECHANISM_NULL);
    greeting
}

/// Validate the peer's greeting.
pub fn check_greeting(peer: &[u8; GREETING_SIZE]) -> Result<()> {
    if peer[0] != 0xFF || peer[9] & 0x01 == 0 {
        return Err(MdpError::Handshake(
            "peer did not send a ZMTP signature".to_string(),
        ));
    }
    if peer[10] < VERSION_MAJOR {
        return Err(MdpError::Handshake(format!(
            "peer speaks ZMTP {}.{}, need 3.0 or later",
            peer[10], peer[11]
        )));
    }

    let mechanism = &peer[MECHANISM_OFFSET..MECHANISM_OFFSET + MECHANISM_LEN];
    let end = mechanism
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(MECHANISM_LEN);
    if &mechanism[..end] != MECHANISM_NULL {
        return Err(MdpError::Handshake(format!(
            "unsupported security mechanism {:?}",
            String::from_utf8_lossy(&mechanism[..end])
        )));
    }
    Ok(())
}

/// Body of a `READY` command frame.
pub fn ready_command(socket_type: &str, identity: Option<&[u8]>) -> Bytes {
    let mut body = BytesMut::new();
    put_name(&mut body, "READY");
    put_property(&mut body, "Socket-Type", socket_type.as_bytes());
    if let Some(identity) = identity {
        put_property(&mut body, "Identity", identity);
    }
    body.freeze()
}

/// Body of an `ERROR` command frame.
pub fn error_command(reason: &str) -> Bytes {
    let reason = &reason.as_bytes()[..reason.len().min(u8::MAX as usize)];
    let mut body = BytesMut::new();
    put_name(&mut body, "ERROR");
    body.put_u8(reason.len() as u8);
    body.put_slice(reason);
    body.freeze()
}

fn put_name(dst: &mut BytesMut, name: &str) {
    dst.put_u8(name.len() as u8);
    dst.put_slice(name.as_bytes());
}

fn put_property(dst: &mut BytesMut, name: &str, value: &[u8]) {
    put_name(dst, name);
    dst.put_u32(value.len() as u32);
    dst.put_slice(value);
}

/// A decoded connection-level command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerCommand {
    Ready { properties: Vec<(String, Bytes)> },
    Error { reason: String },
    /// Any other command (PING, SUBSCRIBE, ...); ignored by a DEALER.
    Other { name: String },
}

impl PeerCommand {
    /// Parse a command frame body.
    pub fn parse(body: &Bytes) -> Result<Self> {
        let mut data = body.clone();
        if !data.has_remaining() {
            return Err(MdpError::Handshake("empty ZMTP command".to_string()));
        }
        let name_len = data.get_u8() as usize;
        if data.remaining() < name_len {
            return Err(MdpError::Handshake("truncated ZMTP command name".to_string()));
        }
        let name = data.split_to(name_len);

        match &name[..] {
            b"READY" => Ok(PeerCommand::Ready {
                properties: parse_properties(data)?,
            }),
            b"ERROR" => {
                let reason_len = if data.has_remaining() {
                    (data.get_u8() as usize).min(data.remaining())
                } else {
                    0
                };
                Ok(PeerCommand::Error {
                    reason: String::from_utf8_lossy(&data[..reason_len]).into_owned(),
                })
            }
            other => Ok(PeerCommand::Other {
                name: String::from_utf8_lossy(other).into_owned(),
            }),
        }
    }

    /// Look up a `READY` property; names are case-insensitive.
    pub fn property(&self, name: &str) -> Option<&Bytes> {
        match self {
            PeerCommand::Ready { properties } => properties
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value),
            _ => None,
        }
    }
}

fn parse_properties(mut data: Bytes) -> Result<Vec<(String, Bytes)>> {
    let truncated = || MdpError::Handshake("truncated READY metadata".to_string());

    let mut properties = Vec::new();
    while data.has_remaining() {
        let name_len = data.get_u8() as usize;
        if data.remaining() < name_len + 4 {
            return Err(truncated());
        }
        let name = String::from_utf8_lossy(&data.split_to(name_len)).into_owned();
        let value_len = data.get_u32() as usize;
        if data.remaining() < value_len {
            return Err(truncated());
        }
        properties.push((name, data.split_to(value_len)));
    }
    Ok(properties)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greeting_layout() {
        let g = greeting();
        assert_eq!(g[0], 0xFF);
        assert_eq!(&g[1..9], &[0u8; 8]);
        assert_eq!(g[9], 0x7F);
        assert_eq!(&g[10..12], &[3, 0]);
        assert_eq!(&g[12..16], b"NULL");
        assert_eq!(g[32], 0);
        assert!(g[33..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_check_own_greeting() {
        assert!(check_greeting(&greeting()).is_ok());
    }

    #[test]
    fn test_check_greeting_accepts_newer_minor() {
        let mut g = greeting();
        g[11] = 1;
        assert!(check_greeting(&g).is_ok());
    }

    #[test]
    fn test_check_greeting_rejects() {
        let mut g = greeting();
        g[0] = b'G';
        assert!(matches!(check_greeting(&g), Err(MdpError::Handshake(_))));

        let mut g = greeting();
        g[10] = 2;
        assert!(check_greeting(&g).unwrap_err().to_string().contains("ZMTP 2.0"));

        let mut g = greeting();
        g[12..17].copy_from_slice(b"PLAIN");
        assert!(check_greeting(&g).unwrap_err().to_string().contains("PLAIN"));
    }

    #[test]
    fn test_ready_command_layout() {
        let body = ready_command("DEALER", Some(b"w-1"));
        let mut expected = vec![5];
        expected.extend_from_slice(b"READY");
        expected.push(11);
        expected.extend_from_slice(b"Socket-Type");
        expected.extend_from_slice(&6u32.to_be_bytes());
        expected.extend_from_slice(b"DEALER");
        expected.push(8);
        expected.extend_from_slice(b"Identity");
        expected.extend_from_slice(&3u32.to_be_bytes());
        expected.extend_from_slice(b"w-1");
        assert_eq!(&body[..], &expected[..]);
    }

    #[test]
    fn test_parse_ready() {
        let command = PeerCommand::parse(&ready_command("ROUTER", None)).unwrap();
        assert_eq!(
            command.property("socket-type").map(|v| &v[..]),
            Some(&b"ROUTER"[..])
        );
        assert!(command.property("Identity").is_none());
    }

    #[test]
    fn test_parse_error() {
        let command = PeerCommand::parse(&error_command("go away")).unwrap();
        assert_eq!(
            command,
            PeerCommand::Error {
                reason: "go away".to_string()
            }
        );
    }

    #[test]
    fn test_parse_other() {
        let command = PeerCommand::parse(&Bytes::from_static(b"\x04PING\x00\x0a")).unwrap();
        assert_eq!(
            command,
            PeerCommand::Other {
                name: "PING".to_string()
            }
        );
    }

    #[test]
    fn test_parse_truncated() {
        assert!(PeerCommand::parse(&Bytes::new()).is_err());
        assert!(PeerCommand::parse(&Bytes::from_static(b"\x05REA")).is_err());

        let mut body = ready_command("DEALER", None).to_vec();
        body.truncate(body.len() - 2);
        assert!(PeerCommand::parse(&Bytes::from(body)).is_err());
    }
}
