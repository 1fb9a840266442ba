//! Worker session task: connection lifecycle, heartbeat/liveness and
//! inbound dispatch.
//!
//! ```text
//!            start()                 heartbeat tick, liveness hits 0
//! Stopped ──────────► Active ───────────────────────────────► Timeout
//!    ▲                 │  ▲          or DISCONNECT from broker     │
//!    │     stop()      │  └──────── reconnect delay elapsed ───────┘
//!    └─────────────────┴────────────────────── stop() ─────────────┘
//! ```
//!
//! All state lives in [`WorkerSession`] and is only touched from its task;
//! the [`Worker`](super::Worker) handle talks to it through [`Command`]s.

use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, Interval, MissedTickBehavior, Sleep};

use super::responder::Responder;
use super::{Request, SessionState, WorkerStatus};
use crate::config::WorkerConfig;
use crate::error::Result;
use crate::log::SessionLog;
use crate::protocol::{self, Body, Inbound, Message, Response};
use crate::transport::{self, Channel, Connector};

/// Requests from the [`Worker`](super::Worker) handle and its responders.
#[derive(Debug)]
pub(crate) enum Command {
    Start,
    Stop,
    Send { service: String, body: Body },
    Reply { client: String, body: Body },
    Status(oneshot::Sender<WorkerStatus>),
}

pub(crate) struct WorkerSession {
    identity: String,
    broker: String,
    service: String,
    config: WorkerConfig,
    connector: Arc<dyn Connector>,
    log: SessionLog,

    state: SessionState,
    liveness: u32,
    channel: Option<Channel>,
    heartbeat: Option<Interval>,
    reconnect: Option<Pin<Box<Sleep>>>,
    protocol_errors: u64,

    requests: mpsc::UnboundedSender<Request>,
    responses: mpsc::UnboundedSender<Response>,
    responders: mpsc::WeakUnboundedSender<Command>,
}

impl WorkerSession {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        identity: String,
        broker: String,
        service: String,
        config: WorkerConfig,
        connector: Arc<dyn Connector>,
        requests: mpsc::UnboundedSender<Request>,
        responses: mpsc::UnboundedSender<Response>,
        responders: mpsc::WeakUnboundedSender<Command>,
    ) -> Self {
        let log = SessionLog::new(&identity, config.verbosity);
        Self {
            identity,
            broker,
            service,
            liveness: config.heartbeat_liveness,
            config,
            connector,
            log,
            state: SessionState::Stopped,
            channel: None,
            heartbeat: None,
            reconnect: None,
            protocol_errors: 0,
            requests,
            responses,
            responders,
        }
    }

    /// Process commands, inbound messages and timers until every
    /// [`Worker`](super::Worker) handle is gone, then stop.
    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => {
                        self.stop();
                        return;
                    }
                },
                message = transport::next_message(&mut self.channel) => {
                    self.on_message(message);
                }
                _ = next_tick(&mut self.heartbeat) => self.on_heartbeat(),
                _ = reconnect_due(&mut self.reconnect) => {
                    self.reconnect = None;
                    self.log.event(format_args!("worker reconnecting"));
                    self.start();
                }
            }
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Start => self.start(),
            Command::Stop => self.stop(),
            Command::Send { service, body } => self.send(&service, body),
            Command::Reply { client, body } => self.reply(&client, body),
            Command::Status(tx) => {
                let _ = tx.send(self.status());
            }
        }
    }

    /// Connect, announce the service and arm the heartbeat. No-op while
    /// connected.
    pub(crate) fn start(&mut self) {
        if self.channel.is_some() {
            return;
        }
        self.reconnect = None;
        self.state = SessionState::Connecting;

        let channel = match self.connector.open(&self.identity, &self.broker) {
            Ok(channel) => channel,
            Err(err) => {
                tracing::warn!(
                    identity = %self.identity,
                    broker = %self.broker,
                    "worker could not connect: {}",
                    err
                );
                self.schedule_reconnect();
                return;
            }
        };

        let ready = protocol::ready(&self.service);
        self.log.message(
            format_args!(
                "worker starting: {} ({}) -> {}",
                self.identity, self.service, self.broker
            ),
            &ready,
        );
        channel.send(ready);
        self.channel = Some(channel);
        self.liveness = self.config.heartbeat_liveness;

        let period = self.config.heartbeat_interval();
        let mut heartbeat = time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.heartbeat = Some(heartbeat);
        self.state = SessionState::Active;
    }

    /// Send DISCONNECT if connected, then release the channel and every
    /// timer, including a pending reconnect.
    pub(crate) fn stop(&mut self) {
        if let Some(channel) = &self.channel {
            let disconnect = protocol::disconnect();
            self.log
                .message(format_args!("worker stopping: {}", self.identity), &disconnect);
            channel.send(disconnect);
        } else if self.reconnect.is_some() {
            self.log
                .event(format_args!("worker stopping, reconnect cancelled"));
        }
        self.close();
        self.state = SessionState::Stopped;
    }

    fn close(&mut self) {
        self.heartbeat = None;
        self.reconnect = None;
        if let Some(channel) = self.channel.take() {
            channel.close();
        }
    }

    fn schedule_reconnect(&mut self) {
        self.state = SessionState::Timeout;
        self.reconnect = Some(Box::pin(time::sleep(self.config.reconnect_delay())));
    }

    pub(crate) fn on_heartbeat(&mut self) {
        self.liveness = self.liveness.saturating_sub(1);
        if self.liveness == 0 {
            self.log.event(format_args!(
                "worker timed out, reconnecting in {} ms",
                self.config.reconnect_delay_ms
            ));
            self.close();
            self.schedule_reconnect();
            return;
        }

        let heartbeat = protocol::heartbeat();
        self.log
            .message(format_args!("worker sending heartbeat"), &heartbeat);
        self.transmit(heartbeat);
    }

    pub(crate) fn on_message(&mut self, message: Message) {
        if let Err(err) = self.dispatch(message) {
            self.protocol_errors += 1;
            self.log.fault(&err);
        }
    }

    fn dispatch(&mut self, message: Message) -> Result<()> {
        let header = protocol::open_envelope(&message)?;
        self.liveness = self.config.heartbeat_liveness;

        match Inbound::parse(header, &message, self.config.body_encoding)? {
            Inbound::Request { client, body } => {
                self.log.message(
                    format_args!("worker received request from: {}", client),
                    &message,
                );
                let responder = Responder::new(client.clone(), self.responders.clone());
                let request = Request {
                    client,
                    body,
                    responder,
                };
                if self.requests.send(request).is_err() {
                    tracing::debug!(identity = %self.identity, "request dropped, no receiver");
                }
            }
            Inbound::Heartbeat => {
                self.log
                    .message(format_args!("worker received heartbeat"), &message);
            }
            Inbound::Disconnect => {
                self.log
                    .message(format_args!("worker received disconnect"), &message);
                self.log.event(format_args!(
                    "worker reconnecting in {} ms",
                    self.config.reconnect_delay_ms
                ));
                self.close();
                self.schedule_reconnect();
            }
            Inbound::Reply(response) => {
                self.log.message(
                    format_args!("worker received reply from service: {}", response.service),
                    &message,
                );
                if self.responses.send(response).is_err() {
                    tracing::debug!(identity = %self.identity, "response dropped, no receiver");
                }
            }
        }
        Ok(())
    }

    fn reply(&mut self, client: &str, body: Body) {
        if self.channel.is_none() {
            self.log.event(format_args!(
                "worker not connected, reply to {} dropped",
                client
            ));
            return;
        }
        let reply = protocol::reply(client, body);
        self.log
            .message(format_args!("worker sending reply to: {}", client), &reply);
        self.transmit(reply);
    }

    fn send(&mut self, service: &str, body: Body) {
        if self.channel.is_none() {
            self.log.event(format_args!(
                "worker not connected, request to {} dropped",
                service
            ));
            return;
        }
        let request = protocol::request(service, body);
        self.log.message(
            format_args!("worker sending request to service: {}", service),
            &request,
        );
        self.transmit(request);
    }

    fn transmit(&self, message: Message) {
        if let Some(channel) = &self.channel {
            if !channel.send(message) {
                tracing::debug!(identity = %self.identity, "transport gone, message dropped");
            }
        }
    }

    pub(crate) fn status(&self) -> WorkerStatus {
        WorkerStatus {
            state: self.state,
            liveness: self.liveness,
            connected: self.channel.is_some(),
            heartbeat_armed: self.heartbeat.is_some(),
            reconnect_pending: self.reconnect.is_some(),
            protocol_errors: self.protocol_errors,
        }
    }
}

async fn next_tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn reconnect_due(reconnect: &mut Option<Pin<Box<Sleep>>>) {
    match reconnect {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Command as MdpCommand, WORKER};
    use crate::transport::{MemoryHub, MemoryRouter};
    use bytes::Bytes;

    const BROKER: &str = "inproc://broker";

    struct Harness {
        session: WorkerSession,
        router: MemoryRouter,
        requests: mpsc::UnboundedReceiver<Request>,
        responses: mpsc::UnboundedReceiver<Response>,
        _commands: mpsc::UnboundedSender<Command>,
    }

    fn harness(config: WorkerConfig) -> Harness {
        let hub = MemoryHub::new();
        let router = hub.bind(BROKER).unwrap();
        let (req_tx, requests) = mpsc::unbounded_channel();
        let (resp_tx, responses) = mpsc::unbounded_channel();
        let (cmd_tx, _cmd_rx) = mpsc::unbounded_channel();
        let session = WorkerSession::new(
            "echo-1".to_string(),
            BROKER.to_string(),
            "echo".to_string(),
            config,
            Arc::new(hub.connector()),
            req_tx,
            resp_tx,
            cmd_tx.downgrade(),
        );
        Harness {
            session,
            router,
            requests,
            responses,
            _commands: cmd_tx,
        }
    }

    fn frames(parts: &[&[u8]]) -> Message {
        parts.iter().map(|p| Bytes::copy_from_slice(p)).collect()
    }

    async fn next_sent(router: &mut MemoryRouter) -> Message {
        router.recv().await.unwrap().1
    }

    #[tokio::test]
    async fn test_start_sends_ready_and_arms_heartbeat() {
        let mut h = harness(WorkerConfig::default());
        h.session.start();

        let status = h.session.status();
        assert_eq!(status.state, SessionState::Active);
        assert!(status.connected);
        assert!(status.heartbeat_armed);
        assert!(!status.reconnect_pending);
        assert_eq!(status.liveness, 3);

        assert_eq!(next_sent(&mut h.router).await, protocol::ready("echo"));
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let mut h = harness(WorkerConfig::default());
        h.session.start();
        h.session.start();
        h.session.start();

        assert_eq!(next_sent(&mut h.router).await, protocol::ready("echo"));
        tokio::task::yield_now().await;
        assert!(h.router.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_liveness_decays_to_timeout() {
        let mut h = harness(WorkerConfig::default());
        h.session.start();

        h.session.on_heartbeat();
        assert_eq!(h.session.status().liveness, 2);
        h.session.on_heartbeat();
        assert_eq!(h.session.status().liveness, 1);

        h.session.on_heartbeat();
        let status = h.session.status();
        assert_eq!(status.liveness, 0);
        assert_eq!(status.state, SessionState::Timeout);
        assert!(!status.connected);
        assert!(!status.heartbeat_armed);
        assert!(status.reconnect_pending);

        // READY, then one heartbeat per surviving tick; none on the fatal tick
        assert_eq!(next_sent(&mut h.router).await, protocol::ready("echo"));
        assert_eq!(next_sent(&mut h.router).await, protocol::heartbeat());
        assert_eq!(next_sent(&mut h.router).await, protocol::heartbeat());
        tokio::task::yield_now().await;
        assert!(h.router.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_liveness_of_one_times_out_on_first_tick() {
        let config = WorkerConfig {
            heartbeat_liveness: 1,
            ..WorkerConfig::default()
        };
        let mut h = harness(config);
        h.session.start();
        h.session.on_heartbeat();
        assert_eq!(h.session.status().state, SessionState::Timeout);
    }

    #[tokio::test]
    async fn test_inbound_message_resets_liveness() {
        let mut h = harness(WorkerConfig::default());
        h.session.start();
        h.session.on_heartbeat();
        h.session.on_heartbeat();
        assert_eq!(h.session.status().liveness, 1);

        h.session.on_message(protocol::heartbeat());
        assert_eq!(h.session.status().liveness, 3);
        assert_eq!(h.session.status().protocol_errors, 0);
    }

    #[tokio::test]
    async fn test_malformed_message_does_not_reset_liveness() {
        let mut h = harness(WorkerConfig::default());
        h.session.start();
        h.session.on_heartbeat();

        h.session.on_message(frames(&[b"junk", WORKER, &[0x04]]));
        h.session.on_message(frames(&[b""]));
        let status = h.session.status();
        assert_eq!(status.liveness, 2);
        assert_eq!(status.protocol_errors, 2);
        assert_eq!(status.state, SessionState::Active);
    }

    #[tokio::test]
    async fn test_invalid_command_resets_liveness_but_is_counted() {
        let mut h = harness(WorkerConfig::default());
        h.session.start();
        h.session.on_heartbeat();

        h.session.on_message(frames(&[b"", WORKER, &[0x09]]));
        h.session
            .on_message(frames(&[b"", WORKER, &[MdpCommand::Ready.code()], b"echo"]));
        let status = h.session.status();
        assert_eq!(status.liveness, 3);
        assert_eq!(status.protocol_errors, 2);
    }

    #[tokio::test]
    async fn test_request_is_delivered_with_responder() {
        let mut h = harness(WorkerConfig::default());
        h.session.start();
        h.session
            .on_message(frames(&[b"", WORKER, &[0x02], b"client-9", b"", b"hello"]));

        let request = h.requests.try_recv().unwrap();
        assert_eq!(request.client, "client-9");
        assert_eq!(request.body, "hello");
        assert_eq!(request.responder.client(), "client-9");
    }

    #[tokio::test]
    async fn test_short_request_is_a_protocol_error() {
        let mut h = harness(WorkerConfig::default());
        h.session.start();
        h.session
            .on_message(frames(&[b"", WORKER, &[0x02], b"client-9", b""]));

        assert!(h.requests.try_recv().is_err());
        assert_eq!(h.session.status().protocol_errors, 1);
    }

    #[tokio::test]
    async fn test_broker_disconnect_schedules_reconnect() {
        let mut h = harness(WorkerConfig::default());
        h.session.start();
        h.session.on_message(protocol::disconnect());

        let status = h.session.status();
        assert_eq!(status.state, SessionState::Timeout);
        assert!(!status.connected);
        assert!(status.reconnect_pending);
    }

    #[tokio::test]
    async fn test_stop_sends_disconnect_and_clears_timers() {
        let mut h = harness(WorkerConfig::default());
        h.session.start();
        h.session.stop();

        let status = h.session.status();
        assert_eq!(status.state, SessionState::Stopped);
        assert!(!status.connected);
        assert!(!status.heartbeat_armed);

        assert_eq!(next_sent(&mut h.router).await, protocol::ready("echo"));
        assert_eq!(next_sent(&mut h.router).await, protocol::disconnect());
    }

    #[tokio::test]
    async fn test_stop_cancels_pending_reconnect() {
        let mut h = harness(WorkerConfig::default());
        h.session.start();
        h.session.on_message(protocol::disconnect());
        assert!(h.session.status().reconnect_pending);

        h.session.stop();
        let status = h.session.status();
        assert!(!status.reconnect_pending);
        assert_eq!(status.state, SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_when_stopped_is_noop() {
        let mut h = harness(WorkerConfig::default());
        h.session.stop();
        h.session.stop();
        assert_eq!(h.session.status().state, SessionState::Stopped);
        assert!(h.router.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_open_failure_schedules_reconnect() {
        let mut h = harness(WorkerConfig::default());
        h.session.broker = "inproc://nowhere".to_string();
        h.session.start();

        let status = h.session.status();
        assert_eq!(status.state, SessionState::Timeout);
        assert!(!status.connected);
        assert!(status.reconnect_pending);
    }

    #[tokio::test]
    async fn test_reply_and_send_need_connection() {
        let mut h = harness(WorkerConfig::default());
        h.session.reply("client-1", Body::from("late"));
        h.session.send("other", Body::from("early"));
        assert!(h.router.try_recv().is_none());

        h.session.start();
        h.session.reply("client-1", Body::from("done"));
        h.session.send("other", Body::from("ask"));

        assert_eq!(next_sent(&mut h.router).await, protocol::ready("echo"));
        assert_eq!(
            next_sent(&mut h.router).await,
            protocol::reply("client-1", Body::from("done"))
        );
        assert_eq!(
            next_sent(&mut h.router).await,
            protocol::request("other", Body::from("ask"))
        );
    }

    #[tokio::test]
    async fn test_client_reply_is_routed_to_responses() {
        let mut h = harness(WorkerConfig::default());
        h.session.start();
        h.session
            .on_message(protocol::request("other", Body::from("answer")));

        let response = h.responses.try_recv().unwrap();
        assert_eq!(response.service, "other");
        assert_eq!(response.body, "answer");
    }
}
