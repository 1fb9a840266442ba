//! Error types for mdp-peer.

use thiserror::Error;

/// Main error type for all session and transport operations.
#[derive(Debug, Error)]
pub enum MdpError {
    /// I/O error on the underlying socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading a session configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error for a packed body.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error for a packed body.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Malformed Majordomo message or ZMTP frame.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// ZMTP greeting or NULL handshake rejected.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Endpoint string could not be parsed or is not supported.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Session configuration rejected by a builder.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Connector could not open a channel.
    #[error("Connect failed: {0}")]
    Connect(String),

    /// The session task is gone.
    #[error("Session closed")]
    SessionClosed,
}

impl MdpError {
    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        MdpError::Protocol(msg.into())
    }
}

/// Result type alias using MdpError.
pub type Result<T> = std::result::Result<T, MdpError>;
