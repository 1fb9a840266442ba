//! Majordomo client peer.
//!
//! A [`Client`] sends requests to named services through the broker and
//! receives their replies as [`Response`] events. It has no heartbeat and no
//! automatic reconnect: the underlying transport retries the connection on
//! its own, and messages sent while stopped are dropped.
//!
//! # Example
//!
//! ```ignore
//! use mdp_peer::Client;
//!
//! let (client, mut responses) = Client::builder("tcp://localhost:5555").build()?;
//! client.start()?;
//! client.send("echo", "hello")?;
//!
//! if let Some(response) = responses.recv().await {
//!     println!("{}: {}", response.service, response.body);
//! }
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::config::{ClientConfig, Verbosity};
use crate::error::{MdpError, Result};
use crate::identity::{self, DEFAULT_CLIENT_NAME};
use crate::log::SessionLog;
use crate::protocol::{self, Body, BodyEncoding, Message, Response};
use crate::transport::{self, Channel, Connector, ZmtpConnector};

/// Stream of replies delivered to a client.
pub type Responses = mpsc::UnboundedReceiver<Response>;

/// Builder for configuring and creating a [`Client`].
pub struct ClientBuilder {
    broker: String,
    config: ClientConfig,
    connector: Option<Arc<dyn Connector>>,
}

impl ClientBuilder {
    pub fn new(broker: impl Into<String>) -> Self {
        Self {
            broker: broker.into(),
            config: ClientConfig::default(),
            connector: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Identity prefix. Default: `client`
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    pub fn body_encoding(mut self, encoding: BodyEncoding) -> Self {
        self.config.body_encoding = encoding;
        self
    }

    pub fn verbosity(mut self, verbosity: Verbosity) -> Self {
        self.config.verbosity = verbosity;
        self
    }

    /// Use a custom transport instead of ZMTP.
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Spawn the session task. The client starts stopped.
    ///
    /// Must be called inside a tokio runtime.
    pub fn build(self) -> Result<(Client, Responses)> {
        if self.broker.is_empty() {
            return Err(MdpError::Config(
                "broker endpoint must not be empty".to_string(),
            ));
        }
        let prefix = self.config.name.as_deref().unwrap_or(DEFAULT_CLIENT_NAME);
        let identity = identity::generate(prefix);
        identity::validate(&identity)?;

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            MdpError::Config("a client must be built inside a tokio runtime".to_string())
        })?;
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(ZmtpConnector::default()));

        let (commands, command_rx) = mpsc::unbounded_channel();
        let (response_tx, responses) = mpsc::unbounded_channel();

        let session = ClientSession {
            log: SessionLog::new(&identity, self.config.verbosity),
            identity: identity.clone(),
            broker: self.broker,
            config: self.config,
            connector,
            channel: None,
            responses: response_tx,
        };
        runtime.spawn(session.run(command_rx));

        Ok((Client { identity, commands }, responses))
    }
}

/// Handle to a client session.
///
/// Dropping the handle ends the session.
#[derive(Debug)]
pub struct Client {
    identity: String,
    commands: mpsc::UnboundedSender<Command>,
}

impl Client {
    pub fn builder(broker: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(broker)
    }

    #[inline]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Open the channel to the broker. No-op while started.
    pub fn start(&self) -> Result<()> {
        self.command(Command::Start)
    }

    /// Close the channel. No-op while stopped.
    pub fn stop(&self) -> Result<()> {
        self.command(Command::Stop)
    }

    /// Request `service`; dropped if the client is stopped.
    pub fn send(&self, service: impl Into<String>, body: impl Into<Body>) -> Result<()> {
        self.command(Command::Send {
            service: service.into(),
            body: body.into(),
        })
    }

    /// Whether the channel is open, after every previously queued command.
    pub async fn is_started(&self) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::IsStarted(tx))?;
        rx.await.map_err(|_| MdpError::SessionClosed)
    }

    fn command(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| MdpError::SessionClosed)
    }
}

#[derive(Debug)]
enum Command {
    Start,
    Stop,
    Send { service: String, body: Body },
    IsStarted(oneshot::Sender<bool>),
}

struct ClientSession {
    identity: String,
    broker: String,
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    log: SessionLog,
    channel: Option<Channel>,
    responses: mpsc::UnboundedSender<Response>,
}

impl ClientSession {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => {
                        self.stop();
                        return;
                    }
                },
                message = transport::next_message(&mut self.channel) => self.on_message(message),
            }
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Start => self.start(),
            Command::Stop => self.stop(),
            Command::Send { service, body } => self.send(&service, body),
            Command::IsStarted(tx) => {
                let _ = tx.send(self.channel.is_some());
            }
        }
    }

    fn start(&mut self) {
        if self.channel.is_some() {
            return;
        }
        match self.connector.open(&self.identity, &self.broker) {
            Ok(channel) => {
                self.log.event(format_args!(
                    "client starting: {} -> {}",
                    self.identity, self.broker
                ));
                self.channel = Some(channel);
            }
            Err(err) => {
                tracing::warn!(
                    identity = %self.identity,
                    broker = %self.broker,
                    "client could not connect: {}",
                    err
                );
            }
        }
    }

    fn stop(&mut self) {
        if let Some(channel) = self.channel.take() {
            self.log
                .event(format_args!("client stopping: {}", self.identity));
            channel.close();
        }
    }

    fn send(&mut self, service: &str, body: Body) {
        let Some(channel) = &self.channel else {
            self.log.event(format_args!(
                "client not started, request to {} dropped",
                service
            ));
            return;
        };
        let request = protocol::request(service, body);
        self.log.message(
            format_args!("client sending request to service: {}", service),
            &request,
        );
        if !channel.send(request) {
            tracing::debug!(identity = %self.identity, "transport gone, request dropped");
        }
    }

    fn on_message(&mut self, message: Message) {
        match protocol::parse_client_reply(&message, self.config.body_encoding) {
            Ok(response) => {
                self.log.message(
                    format_args!("client received reply from service: {}", response.service),
                    &message,
                );
                if self.responses.send(response).is_err() {
                    tracing::debug!(identity = %self.identity, "response dropped, no receiver");
                }
            }
            Err(err) => self.log.fault(&err),
        }
    }
}
