//! In-process transport.
//!
//! A [`MemoryHub`] is a registry of named endpoints. [`MemoryHub::bind`]
//! creates a [`MemoryRouter`] - the broker side, which sees every message
//! tagged with the sender's identity, like a ZeroMQ ROUTER socket - and
//! [`MemoryConnector`] opens DEALER-like channels to it.
//!
//! ```
//! use mdp_peer::transport::{Connector, MemoryHub};
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let hub = MemoryHub::new();
//! let mut router = hub.bind("inproc://broker").unwrap();
//! let channel = hub.connector().open("w-1", "inproc://broker").unwrap();
//!
//! channel.send(vec![bytes::Bytes::from_static(b"hi")]);
//! let (from, message) = router.recv().await.unwrap();
//! assert_eq!(from, "w-1");
//! assert_eq!(&message[0][..], b"hi");
//! # }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::error::{MdpError, Result};
use crate::protocol::Message;
use crate::transport::{self, Channel, Connector};

#[derive(Debug)]
enum RouterEvent {
    Attached {
        identity: String,
        conn_id: u64,
        peer: mpsc::UnboundedSender<Message>,
    },
    Delivered {
        identity: String,
        message: Message,
    },
    Detached {
        identity: String,
        conn_id: u64,
    },
}

#[derive(Debug, Default)]
struct HubState {
    routers: Mutex<HashMap<String, mpsc::UnboundedSender<RouterEvent>>>,
    next_conn_id: AtomicU64,
    live_channels: AtomicUsize,
}

/// Registry of in-process endpoints. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct MemoryHub {
    state: Arc<HubState>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a router to `endpoint`.
    ///
    /// Fails if a live router is already bound there.
    pub fn bind(&self, endpoint: &str) -> Result<MemoryRouter> {
        let mut routers = self.lock_routers()?;
        if routers.get(endpoint).is_some_and(|tx| !tx.is_closed()) {
            return Err(MdpError::Connect(format!(
                "endpoint {} is already bound",
                endpoint
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        routers.insert(endpoint.to_string(), tx);

        Ok(MemoryRouter {
            endpoint: endpoint.to_string(),
            events: rx,
            peers: HashMap::new(),
            hub: self.clone(),
        })
    }

    /// A connector opening channels through this hub.
    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector { hub: self.clone() }
    }

    /// Channels currently open through this hub.
    ///
    /// A closed channel is counted until its forwarding task has noticed.
    pub fn live_channels(&self) -> usize {
        self.state.live_channels.load(Ordering::Acquire)
    }

    fn lock_routers(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, mpsc::UnboundedSender<RouterEvent>>>>
    {
        self.state
            .routers
            .lock()
            .map_err(|_| MdpError::Connect("memory hub registry poisoned".to_string()))
    }

    fn unbind(&self, endpoint: &str) {
        if let Ok(mut routers) = self.state.routers.lock() {
            if routers.get(endpoint).is_some_and(|tx| tx.is_closed()) {
                routers.remove(endpoint);
            }
        }
    }
}

/// [`Connector`] for endpoints bound on a [`MemoryHub`].
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    hub: MemoryHub,
}

impl Connector for MemoryConnector {
    fn open(&self, identity: &str, endpoint: &str) -> Result<Channel> {
        let router = self
            .hub
            .lock_routers()?
            .get(endpoint)
            .filter(|tx| !tx.is_closed())
            .cloned()
            .ok_or_else(|| MdpError::Connect(format!("nothing bound at {}", endpoint)))?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            MdpError::Connect("no tokio runtime to drive the connection".to_string())
        })?;

        let state = &self.hub.state;
        let conn_id = state.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let (channel, link) = transport::channel(identity);

        router
            .send(RouterEvent::Attached {
                identity: identity.to_string(),
                conn_id,
                peer: link.inbound,
            })
            .map_err(|_| MdpError::Connect(format!("router at {} went away", endpoint)))?;

        state.live_channels.fetch_add(1, Ordering::AcqRel);
        runtime.spawn(forward(
            identity.to_string(),
            conn_id,
            link.outbound,
            router,
            self.hub.clone(),
        ));
        Ok(channel)
    }
}

/// Carry one channel's outbound messages to its router.
async fn forward(
    identity: String,
    conn_id: u64,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    router: mpsc::UnboundedSender<RouterEvent>,
    hub: MemoryHub,
) {
    while let Some(message) = outbound.recv().await {
        let delivered = RouterEvent::Delivered {
            identity: identity.clone(),
            message,
        };
        if router.send(delivered).is_err() {
            break;
        }
    }
    let _ = router.send(RouterEvent::Detached { identity, conn_id });
    hub.state.live_channels.fetch_sub(1, Ordering::AcqRel);
}

/// Broker side of an in-process endpoint.
///
/// Unbinds the endpoint when dropped.
#[derive(Debug)]
pub struct MemoryRouter {
    endpoint: String,
    events: mpsc::UnboundedReceiver<RouterEvent>,
    peers: HashMap<String, (u64, mpsc::UnboundedSender<Message>)>,
    hub: MemoryHub,
}

impl MemoryRouter {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Next message and the identity of the peer that sent it.
    pub async fn recv(&mut self) -> Option<(String, Message)> {
        loop {
            let event = self.events.recv().await?;
            if let Some(delivered) = self.apply(event) {
                return Some(delivered);
            }
        }
    }

    /// Like [`recv`](Self::recv) but returns `None` instead of waiting.
    pub fn try_recv(&mut self) -> Option<(String, Message)> {
        while let Ok(event) = self.events.try_recv() {
            if let Some(delivered) = self.apply(event) {
                return Some(delivered);
            }
        }
        None
    }

    /// Route a message to the peer with `identity`.
    ///
    /// Returns `false` if no such peer is attached (messages to unknown
    /// peers are dropped, as on a ZeroMQ ROUTER).
    pub fn send(&self, identity: &str, message: Message) -> bool {
        self.peers
            .get(identity)
            .is_some_and(|(_, peer)| peer.send(message).is_ok())
    }

    /// Peers attached as of the last `recv`.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn is_attached(&self, identity: &str) -> bool {
        self.peers.contains_key(identity)
    }

    fn apply(&mut self, event: RouterEvent) -> Option<(String, Message)> {
        match event {
            RouterEvent::Attached {
                identity,
                conn_id,
                peer,
            } => {
                self.peers.insert(identity, (conn_id, peer));
                None
            }
            RouterEvent::Delivered { identity, message } => Some((identity, message)),
            RouterEvent::Detached { identity, conn_id } => {
                // A reconnect under the same identity may already have replaced this route.
                if self.peers.get(&identity).is_some_and(|(id, _)| *id == conn_id) {
                    self.peers.remove(&identity);
                }
                None
            }
        }
    }
}

impl Drop for MemoryRouter {
    fn drop(&mut self) {
        self.events.close();
        self.hub.unbind(&self.endpoint);
    }
}
