//! Majordomo worker peer.
//!
//! A [`Worker`] registers a service with the broker, receives requests for
//! it, and sends each reply through the [`Responder`] attached to the
//! request. It keeps the broker connection alive with heartbeats and
//! reconnects on its own after a timeout or a broker DISCONNECT.
//!
//! The same session can also act as a client: [`Worker::send`] issues a
//! request to any service, and replies arrive on [`WorkerEvents::responses`].
//!
//! # Example
//!
//! ```ignore
//! use mdp_peer::Worker;
//!
//! let (worker, mut events) = Worker::builder("tcp://localhost:5555", "echo").build()?;
//! worker.start()?;
//!
//! while let Some(request) = events.requests.recv().await {
//!     let reply = request.body.clone();
//!     request.responder.send(reply)?;
//! }
//! ```

mod responder;
mod session;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::config::{Verbosity, WorkerConfig};
use crate::error::{MdpError, Result};
use crate::identity;
use crate::protocol::{Body, BodyEncoding, Response};
use crate::transport::{Connector, ZmtpConnector};

pub use responder::Responder;
use session::{Command, WorkerSession};

/// Connection state of a worker session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Not started, or stopped by the application.
    Stopped,
    /// Opening the channel to the broker.
    Connecting,
    /// READY sent; heartbeating.
    Active,
    /// Broker lost or disconnected us; a reconnect is scheduled.
    Timeout,
}

/// Snapshot of a worker session, from [`Worker::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerStatus {
    pub state: SessionState,
    /// Heartbeat periods left before the broker is declared lost.
    pub liveness: u32,
    /// Whether a channel to the broker is open.
    pub connected: bool,
    pub heartbeat_armed: bool,
    pub reconnect_pending: bool,
    /// Malformed or unexpected messages received so far.
    pub protocol_errors: u64,
}

/// A request for this worker's service.
#[derive(Debug)]
pub struct Request {
    /// Identity of the requesting client.
    pub client: String,
    pub body: Body,
    /// Reply handle addressed to `client`.
    pub responder: Responder,
}

/// Event streams of a worker session.
#[derive(Debug)]
pub struct WorkerEvents {
    /// Requests for the registered service.
    pub requests: mpsc::UnboundedReceiver<Request>,
    /// Replies to requests issued with [`Worker::send`].
    pub responses: mpsc::UnboundedReceiver<Response>,
}

/// Builder for [`Worker`].
///
/// # Example
///
/// ```ignore
/// let (worker, events) = Worker::builder("tcp://localhost:5555", "resize")
///     .heartbeat_interval(Duration::from_millis(1000))
///     .heartbeat_liveness(5)
///     .name("resizer")
///     .build()?;
/// ```
pub struct WorkerBuilder {
    broker: String,
    service: String,
    config: WorkerConfig,
    connector: Option<Arc<dyn Connector>>,
}

impl WorkerBuilder {
    pub fn new(broker: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            broker: broker.into(),
            service: service.into(),
            config: WorkerConfig::default(),
            connector: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Millisecond granularity; a non-zero interval below 1 ms becomes 1 ms.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval_ms = whole_millis(interval);
        self
    }

    /// Millisecond granularity, like [`heartbeat_interval`](Self::heartbeat_interval).
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay_ms = whole_millis(delay);
        self
    }

    pub fn heartbeat_liveness(mut self, liveness: u32) -> Self {
        self.config.heartbeat_liveness = liveness;
        self
    }

    pub fn verbosity(mut self, verbosity: Verbosity) -> Self {
        self.config.verbosity = verbosity;
        self
    }

    /// Identity prefix; defaults to the service name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    pub fn body_encoding(mut self, encoding: BodyEncoding) -> Self {
        self.config.body_encoding = encoding;
        self
    }

    /// Use a custom transport instead of ZMTP.
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Validate the configuration and spawn the session task.
    ///
    /// The session starts stopped; call [`Worker::start`] to connect.
    /// Must be called inside a tokio runtime.
    pub fn build(self) -> Result<(Worker, WorkerEvents)> {
        if self.broker.is_empty() {
            return Err(MdpError::Config("broker endpoint must not be empty".to_string()));
        }
        if self.service.is_empty() {
            return Err(MdpError::Config("service name must not be empty".to_string()));
        }
        self.config.validate()?;

        let prefix = self.config.name.as_deref().unwrap_or(&self.service);
        let identity = identity::generate(prefix);
        identity::validate(&identity)?;

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            MdpError::Config("a worker must be built inside a tokio runtime".to_string())
        })?;
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(ZmtpConnector::default()));

        let (commands, command_rx) = mpsc::unbounded_channel();
        let (request_tx, requests) = mpsc::unbounded_channel();
        let (response_tx, responses) = mpsc::unbounded_channel();

        let session = WorkerSession::new(
            identity.clone(),
            self.broker,
            self.service.clone(),
            self.config,
            connector,
            request_tx,
            response_tx,
            commands.downgrade(),
        );
        runtime.spawn(session.run(command_rx));

        let worker = Worker {
            identity,
            service: self.service,
            commands,
        };
        Ok((worker, WorkerEvents { requests, responses }))
    }
}

/// `duration` in milliseconds, rounded up so only a zero duration maps to 0.
fn whole_millis(duration: Duration) -> u64 {
    let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    if millis == 0 && !duration.is_zero() {
        1
    } else {
        millis
    }
}

/// Handle to a worker session.
///
/// Commands are queued to the session task and applied in order. Dropping
/// the handle stops the session (sending DISCONNECT if connected).
#[derive(Debug)]
pub struct Worker {
    identity: String,
    service: String,
    commands: mpsc::UnboundedSender<Command>,
}

impl Worker {
    pub fn builder(broker: impl Into<String>, service: impl Into<String>) -> WorkerBuilder {
        WorkerBuilder::new(broker, service)
    }

    /// Routing id, stable across reconnects.
    #[inline]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    #[inline]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Connect and register with the broker. No-op while connected.
    pub fn start(&self) -> Result<()> {
        self.command(Command::Start)
    }

    /// Disconnect, cancelling heartbeats and any pending reconnect.
    pub fn stop(&self) -> Result<()> {
        self.command(Command::Stop)
    }

    /// Request `service` in the client role; dropped if not connected.
    pub fn send(&self, service: impl Into<String>, body: impl Into<Body>) -> Result<()> {
        self.command(Command::Send {
            service: service.into(),
            body: body.into(),
        })
    }

    /// Current session state, after every previously queued command.
    pub async fn status(&self) -> Result<WorkerStatus> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::Status(tx))?;
        rx.await.map_err(|_| MdpError::SessionClosed)
    }

    fn command(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| MdpError::SessionClosed)
    }
}
