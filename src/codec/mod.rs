//! Codec module - structured body serialization.
//!
//! Bodies travel as opaque frames; [`MsgPackCodec`] is the helper behind
//! [`Body::pack`](crate::protocol::Body::pack) and
//! [`Body::unpack`](crate::protocol::Body::unpack) for peers that exchange
//! structured payloads instead of plain text.

mod msgpack;

pub use msgpack::MsgPackCodec;
