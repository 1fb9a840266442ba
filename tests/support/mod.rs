//! Minimal in-process Majordomo broker for integration tests.
//!
//! Queues client requests per service, hands them to idle workers in
//! round-robin order, relays replies, and answers worker heartbeats.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use bytes::Bytes;
use mdp_peer::protocol::{self, Command, Message, CLIENT, WORKER};
use mdp_peer::transport::{MemoryHub, MemoryRouter};
use tokio::task::JoinHandle;

pub const BROKER: &str = "inproc://broker";

#[derive(Default)]
struct Service {
    idle: VecDeque<String>,
    pending: VecDeque<(String, Bytes)>,
}

#[derive(Default)]
struct Broker {
    services: HashMap<String, Service>,
    /// worker identity -> service
    workers: HashMap<String, String>,
}

/// Bind a broker on `hub` at [`BROKER`] and run it in the background.
pub fn spawn_broker(hub: &MemoryHub) -> JoinHandle<()> {
    let router = hub.bind(BROKER).expect("bind test broker");
    tokio::spawn(run(router))
}

async fn run(mut router: MemoryRouter) {
    let mut broker = Broker::default();
    while let Some((sender, message)) = router.recv().await {
        broker.handle(&router, sender, message);
    }
}

impl Broker {
    fn handle(&mut self, router: &MemoryRouter, sender: String, message: Message) {
        if message.len() < 3 || !message[0].is_empty() {
            return;
        }

        if &message[1][..] == CLIENT && message.len() == 4 {
            let service = text(&message[2]);
            self.services
                .entry(service.clone())
                .or_default()
                .pending
                .push_back((sender, message[3].clone()));
            self.dispatch(router, &service);
            return;
        }
        if &message[1][..] != WORKER {
            return;
        }

        match Command::from_frame(&message[2]) {
            Some(Command::Ready) if message.len() == 4 => {
                let service = text(&message[3]);
                // A reconnecting worker announces itself again under the same identity.
                for entry in self.services.values_mut() {
                    entry.idle.retain(|worker| worker != &sender);
                }
                self.workers.insert(sender.clone(), service.clone());
                self.services
                    .entry(service.clone())
                    .or_default()
                    .idle
                    .push_back(sender);
                self.dispatch(router, &service);
            }
            Some(Command::Reply) if message.len() == 6 => {
                let Some(service) = self.workers.get(&sender).cloned() else {
                    return;
                };
                let client = text(&message[3]);
                router.send(
                    &client,
                    vec![
                        Bytes::new(),
                        Bytes::from_static(CLIENT),
                        Bytes::from(service.clone()),
                        message[5].clone(),
                    ],
                );
                self.services
                    .entry(service.clone())
                    .or_default()
                    .idle
                    .push_back(sender);
                self.dispatch(router, &service);
            }
            Some(Command::Heartbeat) => {
                if self.workers.contains_key(&sender) {
                    router.send(&sender, protocol::heartbeat());
                }
            }
            Some(Command::Disconnect) => {
                if let Some(service) = self.workers.remove(&sender) {
                    if let Some(entry) = self.services.get_mut(&service) {
                        entry.idle.retain(|worker| worker != &sender);
                    }
                }
            }
            _ => {}
        }
    }

    fn dispatch(&mut self, router: &MemoryRouter, service: &str) {
        let Some(entry) = self.services.get_mut(service) else {
            return;
        };
        while !entry.idle.is_empty() && !entry.pending.is_empty() {
            let (Some(worker), Some((client, body))) =
                (entry.idle.pop_front(), entry.pending.pop_front())
            else {
                break;
            };
            let request = vec![
                Bytes::new(),
                Bytes::from_static(WORKER),
                Command::Request.frame(),
                Bytes::from(client.clone()),
                Bytes::new(),
                body.clone(),
            ];
            if !router.send(&worker, request) {
                // Worker vanished without DISCONNECT; keep the request for the next one.
                self.workers.remove(&worker);
                entry.pending.push_front((client, body));
            }
        }
    }
}

fn text(frame: &Bytes) -> String {
    String::from_utf8_lossy(frame).into_owned()
}

/// Let spawned session, transport and broker tasks run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Receive with a deadline so a broken test fails instead of hanging.
pub async fn recv_within<T>(
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<T>,
    ms: u64,
) -> Option<T> {
    tokio::time::timeout(Duration::from_millis(ms), rx.recv())
        .await
        .ok()
        .flatten()
}

/// Install a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
