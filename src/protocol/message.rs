//! Multipart message layouts.
//!
//! Every message starts with an empty separator frame:
//!
//! ```text
//! READY       "" MDPW01 0x01 <service>
//! HEARTBEAT   "" MDPW01 0x04
//! DISCONNECT  "" MDPW01 0x05
//! REPLY       "" MDPW01 0x03 <client> "" <body>
//! REQUEST     "" MDPC01 <service> <body>            (client role, outbound)
//! REQUEST     "" MDPW01 0x02 <client> "" <body>     (broker -> worker)
//! REPLY       "" MDPC01 <service> <body>            (broker -> client role)
//! ```
//!
//! # Example
//!
//! ```
//! use mdp_peer::protocol::{self, Body, BodyEncoding, Inbound, ProtocolHeader};
//!
//! let msg = protocol::request("echo", Body::from("ping"));
//! assert_eq!(msg.len(), 4);
//! assert!(msg[0].is_empty());
//!
//! // A broker relaying the reply back to a client
//! let header = protocol::open_envelope(&msg).unwrap();
//! assert_eq!(header, ProtocolHeader::Client);
//! let inbound = Inbound::parse(header, &msg, BodyEncoding::Text).unwrap();
//! assert!(matches!(inbound, Inbound::Reply(_)));
//! ```

use bytes::Bytes;

use super::body::{Body, BodyEncoding};
use super::command::{Command, ProtocolHeader};
use crate::error::{MdpError, Result};

/// An ordered list of frames, delivered atomically.
pub type Message = Vec<Bytes>;

/// Frames in READY.
pub const READY_FRAMES: usize = 4;
/// Frames in HEARTBEAT and DISCONNECT.
pub const HEARTBEAT_FRAMES: usize = 3;
/// Frames in REQUEST/REPLY addressed through the worker header.
pub const WORKER_ENVELOPE_FRAMES: usize = 6;
/// Frames in REQUEST/REPLY addressed through the client header.
pub const CLIENT_ENVELOPE_FRAMES: usize = 4;

/// A reply delivered to the client role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Service that produced the reply.
    pub service: String,
    pub body: Body,
}

/// A decoded message received by a worker session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Work for this worker, to be answered with a REPLY to `client`.
    Request { client: String, body: Body },
    Heartbeat,
    /// The broker is ending the session.
    Disconnect,
    /// Reply to a cross-service request this worker issued.
    Reply(Response),
}

/// Build a READY message announcing `service`.
pub fn ready(service: &str) -> Message {
    vec![
        Bytes::new(),
        ProtocolHeader::Worker.frame(),
        Command::Ready.frame(),
        Bytes::copy_from_slice(service.as_bytes()),
    ]
}

pub fn heartbeat() -> Message {
    vec![
        Bytes::new(),
        ProtocolHeader::Worker.frame(),
        Command::Heartbeat.frame(),
    ]
}

pub fn disconnect() -> Message {
    vec![
        Bytes::new(),
        ProtocolHeader::Worker.frame(),
        Command::Disconnect.frame(),
    ]
}

/// Build a REPLY addressed to `client`.
pub fn reply(client: &str, body: Body) -> Message {
    vec![
        Bytes::new(),
        ProtocolHeader::Worker.frame(),
        Command::Reply.frame(),
        Bytes::copy_from_slice(client.as_bytes()),
        Bytes::new(),
        body.into_bytes(),
    ]
}

/// Build a client-role REQUEST for `service`.
pub fn request(service: &str, body: Body) -> Message {
    vec![
        Bytes::new(),
        ProtocolHeader::Client.frame(),
        Bytes::copy_from_slice(service.as_bytes()),
        body.into_bytes(),
    ]
}

/// Validate the separator and header frames of a received message.
///
/// Requires at least three frames, an empty frame 0 and a known header in
/// frame 1.
pub fn open_envelope(message: &[Bytes]) -> Result<ProtocolHeader> {
    if message.len() < HEARTBEAT_FRAMES {
        return Err(MdpError::protocol(format!(
            "expected at least {} frames, got {}",
            HEARTBEAT_FRAMES,
            message.len()
        )));
    }
    if !message[0].is_empty() {
        return Err(MdpError::protocol("frame 0 is not an empty separator"));
    }
    ProtocolHeader::from_frame(&message[1]).ok_or_else(|| {
        MdpError::protocol(format!(
            "unknown protocol header {:?}",
            String::from_utf8_lossy(&message[1])
        ))
    })
}

/// Decode a REPLY received by the client role (exactly four frames).
///
/// Frame 0 and the header are not inspected.
pub fn parse_client_reply(message: &[Bytes], encoding: BodyEncoding) -> Result<Response> {
    expect_frames(message, CLIENT_ENVELOPE_FRAMES, "client reply")?;
    Ok(Response {
        service: text(&message[2]),
        body: Body::decode(message[3].clone(), encoding),
    })
}

impl Inbound {
    /// Decode a message whose envelope was accepted by [`open_envelope`].
    pub fn parse(header: ProtocolHeader, message: &[Bytes], encoding: BodyEncoding) -> Result<Self> {
        match header {
            ProtocolHeader::Client => Ok(Inbound::Reply(parse_client_reply(message, encoding)?)),
            ProtocolHeader::Worker => Self::parse_worker(message, encoding),
        }
    }

    fn parse_worker(message: &[Bytes], encoding: BodyEncoding) -> Result<Self> {
        let command = message
            .get(2)
            .ok_or_else(|| MdpError::protocol("worker message has no command frame"))?;
        match Command::from_frame(command) {
            Some(Command::Request) => {
                expect_frames(message, WORKER_ENVELOPE_FRAMES, "REQUEST")?;
                Ok(Inbound::Request {
                    client: text(&message[3]),
                    body: Body::decode(message[5].clone(), encoding),
                })
            }
            Some(Command::Heartbeat) => {
                expect_frames(message, HEARTBEAT_FRAMES, "HEARTBEAT")?;
                Ok(Inbound::Heartbeat)
            }
            Some(Command::Disconnect) => Ok(Inbound::Disconnect),
            Some(other) => Err(MdpError::protocol(format!(
                "unexpected command {:?} sent to worker",
                other
            ))),
            None => Err(MdpError::protocol(format!(
                "unknown command frame {:02x?}",
                &command[..]
            ))),
        }
    }
}

fn expect_frames(message: &[Bytes], expected: usize, kind: &str) -> Result<()> {
    if message.len() != expected {
        return Err(MdpError::protocol(format!(
            "{} expects {} frames, got {}",
            kind,
            expected,
            message.len()
        )));
    }
    Ok(())
}

fn text(frame: &Bytes) -> String {
    String::from_utf8_lossy(frame).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CLIENT, WORKER};

    fn frames(parts: &[&[u8]]) -> Message {
        parts.iter().map(|p| Bytes::copy_from_slice(p)).collect()
    }

    #[test]
    fn test_ready_layout() {
        let msg = ready("echo");
        assert_eq!(msg.len(), READY_FRAMES);
        assert_eq!(msg, frames(&[b"", WORKER, &[0x01], b"echo"]));
    }

    #[test]
    fn test_heartbeat_and_disconnect_layout() {
        assert_eq!(heartbeat(), frames(&[b"", WORKER, &[0x04]]));
        assert_eq!(disconnect(), frames(&[b"", WORKER, &[0x05]]));
    }

    #[test]
    fn test_reply_layout() {
        let msg = reply("client-1", Body::from("done"));
        assert_eq!(msg.len(), WORKER_ENVELOPE_FRAMES);
        assert_eq!(
            msg,
            frames(&[b"", WORKER, &[0x03], b"client-1", b"", b"done"])
        );
    }

    #[test]
    fn test_request_layout() {
        let msg = request("echo", Body::from(vec![0u8, 1, 2]));
        assert_eq!(msg, frames(&[b"", CLIENT, b"echo", &[0, 1, 2]]));
    }

    #[test]
    fn test_envelope_rejects_short_message() {
        let err = open_envelope(&frames(&[b"", WORKER])).unwrap_err();
        assert!(err.to_string().contains("at least 3 frames"));
    }

    #[test]
    fn test_envelope_rejects_missing_separator() {
        let err = open_envelope(&frames(&[b"x", WORKER, &[0x04]])).unwrap_err();
        assert!(matches!(err, MdpError::Protocol(_)));
    }

    #[test]
    fn test_envelope_rejects_unknown_header() {
        let err = open_envelope(&frames(&[b"", b"MDPX01", &[0x04]])).unwrap_err();
        assert!(err.to_string().contains("MDPX01"));
    }

    #[test]
    fn test_parse_request() {
        let msg = frames(&[b"", WORKER, &[0x02], b"client-7", b"", b"hello"]);
        let header = open_envelope(&msg).unwrap();
        let inbound = Inbound::parse(header, &msg, BodyEncoding::Text).unwrap();
        assert_eq!(
            inbound,
            Inbound::Request {
                client: "client-7".to_string(),
                body: Body::Text("hello".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_request_wrong_frame_count() {
        let msg = frames(&[b"", WORKER, &[0x02], b"client-7", b"hello"]);
        let err = Inbound::parse(ProtocolHeader::Worker, &msg, BodyEncoding::Text).unwrap_err();
        assert!(err.to_string().contains("REQUEST expects 6 frames, got 5"));
    }

    #[test]
    fn test_parse_without_command_frame() {
        let msg = frames(&[b"", WORKER]);
        let err = Inbound::parse(ProtocolHeader::Worker, &msg, BodyEncoding::Text).unwrap_err();
        assert!(matches!(err, MdpError::Protocol(_)));
        assert!(err.to_string().contains("no command frame"));
    }

    #[test]
    fn test_parse_heartbeat_strict_count() {
        let ok = frames(&[b"", WORKER, &[0x04]]);
        assert_eq!(
            Inbound::parse(ProtocolHeader::Worker, &ok, BodyEncoding::Text).unwrap(),
            Inbound::Heartbeat
        );

        let extra = frames(&[b"", WORKER, &[0x04], b"junk"]);
        assert!(Inbound::parse(ProtocolHeader::Worker, &extra, BodyEncoding::Text).is_err());
    }

    #[test]
    fn test_parse_disconnect() {
        let msg = frames(&[b"", WORKER, &[0x05]]);
        assert_eq!(
            Inbound::parse(ProtocolHeader::Worker, &msg, BodyEncoding::Text).unwrap(),
            Inbound::Disconnect
        );
    }

    #[test]
    fn test_parse_rejects_worker_side_commands() {
        let msg = frames(&[b"", WORKER, &[0x01], b"svc"]);
        assert!(Inbound::parse(ProtocolHeader::Worker, &msg, BodyEncoding::Text).is_err());

        let msg = frames(&[b"", WORKER, &[0x09]]);
        assert!(Inbound::parse(ProtocolHeader::Worker, &msg, BodyEncoding::Text).is_err());
    }

    #[test]
    fn test_parse_client_reply_binary() {
        let msg = frames(&[b"", CLIENT, b"svc", &[0xDE, 0xAD]]);
        let inbound = Inbound::parse(ProtocolHeader::Client, &msg, BodyEncoding::Binary).unwrap();
        assert_eq!(
            inbound,
            Inbound::Reply(Response {
                service: "svc".to_string(),
                body: Body::Binary(Bytes::from_static(&[0xDE, 0xAD])),
            })
        );
    }

    #[test]
    fn test_parse_client_reply_ignores_separator_content() {
        let msg = frames(&[b"?", b"??", b"svc", b"ok"]);
        let response = parse_client_reply(&msg, BodyEncoding::Text).unwrap();
        assert_eq!(response.service, "svc");
        assert_eq!(response.body, "ok");
    }

    #[test]
    fn test_parse_client_reply_wrong_count() {
        let msg = frames(&[b"", CLIENT, b"svc"]);
        assert!(parse_client_reply(&msg, BodyEncoding::Text).is_err());
    }
}
