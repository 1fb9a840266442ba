//! ZMTP 3.0 DEALER transport.
//!
//! Speaks just enough of ZMTP to sit across from a ZeroMQ ROUTER: the
//! greeting, the NULL security handshake, and multipart message framing.
//! Each [`Channel`] gets its own connection task which keeps reconnecting
//! while the channel is open, like a ZeroMQ socket does.
//!
//! # Example
//!
//! ```ignore
//! use mdp_peer::transport::{Connector, ZmtpConnector};
//!
//! let connector = ZmtpConnector::default();
//! let mut channel = connector.open("echo-1", "tcp://127.0.0.1:5555")?;
//! channel.send(mdp_peer::protocol::ready("echo"));
//! ```

mod connection;
mod frame_buffer;
mod greeting;
mod writer;

use std::time::Duration;

use crate::error::{MdpError, Result};
use crate::transport::{self, Channel, Connector, Endpoint};

pub use frame_buffer::{
    encode_command, encode_frame, encode_message, flags, FrameBuffer, FrameHeader, ZmtpFrame,
    DEFAULT_MAX_FRAME_SIZE,
};
pub use greeting::{
    check_greeting, error_command, greeting, ready_command, PeerCommand, GREETING_SIZE,
};

/// Socket options of a DEALER connection.
#[derive(Debug, Clone)]
pub struct ZmtpOptions {
    /// Pause between connection attempts.
    pub reconnect_interval: Duration,
    /// Give up on a connect + handshake attempt after this long.
    pub handshake_timeout: Duration,
    /// Messages queued while disconnected; further messages are dropped.
    pub send_high_water_mark: usize,
    /// How long a closing channel may spend shutting the connection down.
    pub linger: Duration,
    /// Largest inbound frame accepted.
    pub max_frame_size: u64,
}

impl Default for ZmtpOptions {
    fn default() -> Self {
        Self {
            reconnect_interval: Duration::from_millis(100),
            handshake_timeout: Duration::from_secs(5),
            send_high_water_mark: 1000,
            linger: Duration::from_secs(1),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// [`Connector`] for `tcp://` and `ipc://` brokers.
#[derive(Debug, Clone, Default)]
pub struct ZmtpConnector {
    options: ZmtpOptions,
}

impl ZmtpConnector {
    pub fn new(options: ZmtpOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ZmtpOptions {
        &self.options
    }
}

impl Connector for ZmtpConnector {
    fn open(&self, identity: &str, endpoint: &str) -> Result<Channel> {
        let endpoint = Endpoint::parse(endpoint)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            MdpError::Connect("no tokio runtime to drive the connection".to_string())
        })?;

        let (channel, link) = transport::channel(identity);
        runtime.spawn(connection::drive(
            endpoint,
            identity.to_string(),
            link,
            self.options.clone(),
        ));
        Ok(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = ZmtpOptions::default();
        assert_eq!(options.reconnect_interval, Duration::from_millis(100));
        assert_eq!(options.send_high_water_mark, 1000);
        assert_eq!(options.linger, Duration::from_secs(1));
    }

    #[test]
    fn test_open_rejects_bad_endpoint() {
        let connector = ZmtpConnector::default();
        let err = connector.open("w-1", "udp://localhost:5555").unwrap_err();
        assert!(matches!(err, MdpError::InvalidEndpoint(_)));
    }

    #[test]
    fn test_open_outside_runtime() {
        let connector = ZmtpConnector::default();
        let err = connector.open("w-1", "tcp://127.0.0.1:5555").unwrap_err();
        assert!(matches!(err, MdpError::Connect(_)));
    }

    #[tokio::test]
    async fn test_open_unreachable_broker_still_queues() {
        let connector = ZmtpConnector::default();
        // Nothing listens on port 1; the driver keeps retrying in the background.
        let channel = connector.open("w-1", "tcp://127.0.0.1:1").unwrap();
        assert!(channel.send(vec![bytes::Bytes::from_static(b"queued")]));
        channel.close();
    }
}
