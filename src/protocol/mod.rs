//! Protocol module - Majordomo headers, commands, and message layouts.
//!
//! This module is pure: it builds outbound messages and decodes inbound ones,
//! leaving timing and connection state to the sessions.

mod body;
mod command;
mod message;

pub use body::{Body, BodyEncoding};
pub use command::{Command, ProtocolHeader, CLIENT, WORKER};
pub use message::{
    disconnect, heartbeat, open_envelope, parse_client_reply, ready, reply, request, Inbound,
    Message, Response, CLIENT_ENVELOPE_FRAMES, HEARTBEAT_FRAMES, READY_FRAMES,
    WORKER_ENVELOPE_FRAMES,
};
