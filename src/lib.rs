//! # mdp-peer
//!
//! Majordomo Protocol (MDP) worker and client peers for Rust.
//!
//! A Majordomo broker routes requests from clients to workers by service
//! name. This crate implements the two peer roles that talk to such a
//! broker:
//!
//! - [`Worker`] registers a service, answers requests, heartbeats the broker
//!   and reconnects by itself when the broker goes quiet. A worker can also
//!   issue requests to other services (dual role).
//! - [`Client`] sends requests and receives replies.
//!
//! ## Architecture
//!
//! - **Sessions**: each peer is a tokio task owning its connection state;
//!   the `Worker`/`Client` handles send it commands and never block.
//! - **Protocol**: pure builders and parsers for the MDPC01/MDPW01 frames
//!   ([`protocol`]).
//! - **Transport**: a [`Connector`](transport::Connector) opens multipart
//!   channels. [`ZmtpConnector`](transport::ZmtpConnector) speaks ZMTP 3.0 as a
//!   DEALER to any ZeroMQ ROUTER broker; [`MemoryHub`](transport::MemoryHub)
//!   keeps everything in-process.
//!
//! ## Example
//!
//! ```ignore
//! use mdp_peer::{Client, Worker};
//!
//! #[tokio::main]
//! async fn main() -> mdp_peer::Result<()> {
//!     let (worker, mut events) = Worker::builder("tcp://localhost:5555", "echo").build()?;
//!     worker.start()?;
//!     tokio::spawn(async move {
//!         while let Some(request) = events.requests.recv().await {
//!             let reply = format!("{} world!", request.body);
//!             let _ = request.responder.send(reply);
//!         }
//!     });
//!
//!     let (client, mut responses) = Client::builder("tcp://localhost:5555").build()?;
//!     client.start()?;
//!     client.send("echo", "hello")?;
//!     println!("{}", responses.recv().await.unwrap().body);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod identity;
pub mod protocol;
pub mod transport;
pub mod worker;

mod log;

pub use client::{Client, ClientBuilder, Responses};
pub use config::{ClientConfig, Verbosity, WorkerConfig};
pub use error::{MdpError, Result};
pub use protocol::{Body, BodyEncoding, Response};
pub use worker::{
    Request, Responder, SessionState, Worker, WorkerBuilder, WorkerEvents, WorkerStatus,
};
