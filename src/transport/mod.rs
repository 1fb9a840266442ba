//! Transport module - the multipart message channel under a session.
//!
//! A [`Connector`] opens a [`Channel`] bound to a session identity and a
//! broker endpoint. The channel is a pair of unbounded queues serviced by a
//! transport driver task:
//!
//! ```text
//! Session ─► Channel::send ─► outbound queue ─► driver ─► broker
//! Session ◄─ Channel::recv ◄─ inbound queue  ◄─ driver ◄─ broker
//! ```
//!
//! Sending never blocks and never fails loudly (fire-and-forget); dropping the
//! channel tells the driver to flush and shut down.
//!
//! Two connectors are provided:
//! - [`ZmtpConnector`] - ZMTP 3.0 DEALER over `tcp://` and `ipc://`
//! - [`MemoryConnector`] - in-process, paired with a [`MemoryRouter`]

mod endpoint;
pub mod memory;
pub mod zmtp;

use tokio::sync::mpsc;

use crate::error::Result;
use crate::protocol::Message;

pub use endpoint::Endpoint;
pub use memory::{MemoryConnector, MemoryHub, MemoryRouter};
pub use zmtp::{ZmtpConnector, ZmtpOptions};

/// Opens channels to a broker endpoint.
///
/// `open` must not block: connection establishment happens in the
/// background and messages sent meanwhile are queued.
pub trait Connector: Send + Sync + 'static {
    /// Open a channel with routing id `identity` towards `endpoint`.
    fn open(&self, identity: &str, endpoint: &str) -> Result<Channel>;
}

/// Session side of an open connection.
#[derive(Debug)]
pub struct Channel {
    identity: String,
    outbound: mpsc::UnboundedSender<Message>,
    inbound: mpsc::UnboundedReceiver<Message>,
}

/// Driver side of an open connection, handed to the transport task.
#[derive(Debug)]
pub struct Link {
    /// Messages the session wants sent, in order.
    pub outbound: mpsc::UnboundedReceiver<Message>,
    /// Whole messages received from the broker.
    pub inbound: mpsc::UnboundedSender<Message>,
}

/// Create a connected [`Channel`] / [`Link`] pair.
pub fn channel(identity: &str) -> (Channel, Link) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

    let channel = Channel {
        identity: identity.to_string(),
        outbound: outbound_tx,
        inbound: inbound_rx,
    };
    let link = Link {
        outbound: outbound_rx,
        inbound: inbound_tx,
    };
    (channel, link)
}

impl Channel {
    /// Routing id this channel was opened with.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Queue a message for sending.
    ///
    /// Returns `false` if the driver is gone. Empty messages are ignored.
    pub fn send(&self, message: Message) -> bool {
        if message.is_empty() {
            return true;
        }
        self.outbound.send(message).is_ok()
    }

    /// Next whole message from the broker; `None` once the driver is gone.
    pub async fn recv(&mut self) -> Option<Message> {
        self.inbound.recv().await
    }

    /// Close the channel. Queued messages are still flushed by the driver.
    pub fn close(self) {}
}

/// Next message on an optional channel; pending forever when there is no
/// channel or its driver has gone away.
pub(crate) async fn next_message(channel: &mut Option<Channel>) -> Message {
    if let Some(channel) = channel {
        if let Some(message) = channel.recv().await {
            return message;
        }
    }
    std::future::pending().await
}
