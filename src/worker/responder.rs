//! Reply handle for worker requests.
//!
//! Every [`Request`](super::Request) carries a [`Responder`] addressed to the
//! client that issued it. Sending consumes the responder, so a request is
//! answered at most once.
//!
//! # Example
//!
//! ```ignore
//! while let Some(request) = events.requests.recv().await {
//!     let reply = format!("{} world!", request.body);
//!     request.responder.send(reply)?;
//! }
//! ```

use std::fmt;

use serde::Serialize;
use tokio::sync::mpsc;

use super::session::Command;
use crate::error::{MdpError, Result};
use crate::protocol::Body;

/// Sends the reply for one request back through its worker session.
///
/// Holds only a weak reference to the session, so outstanding responders do
/// not keep a dropped [`Worker`](super::Worker) alive.
pub struct Responder {
    client: String,
    session: mpsc::WeakUnboundedSender<Command>,
}

impl Responder {
    pub(crate) fn new(client: String, session: mpsc::WeakUnboundedSender<Command>) -> Self {
        Self { client, session }
    }

    /// Identity of the client waiting for this reply.
    #[inline]
    pub fn client(&self) -> &str {
        &self.client
    }

    /// Send `body` as the reply.
    ///
    /// If the worker is not connected when the reply is processed it is
    /// dropped and logged; the broker will not route a late reply anyway.
    ///
    /// # Errors
    ///
    /// [`MdpError::SessionClosed`] if the worker session has ended.
    pub fn send(self, body: impl Into<Body>) -> Result<()> {
        let session = self.session.upgrade().ok_or(MdpError::SessionClosed)?;
        session
            .send(Command::Reply {
                client: self.client,
                body: body.into(),
            })
            .map_err(|_| MdpError::SessionClosed)
    }

    /// Serialize `value` with MsgPack and send it as the reply.
    pub fn send_packed<T: Serialize>(self, value: &T) -> Result<()> {
        let body = Body::pack(value)?;
        self.send(body)
    }
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder")
            .field("client", &self.client)
            .finish()
    }
}
