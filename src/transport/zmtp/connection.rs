//! Background driver for one DEALER connection.
//!
//! ```text
//!            ┌────────────── reconnect interval ──────────────┐
//!            ▼                                                │
//! connect ─► greeting ─► READY ─► pump (read ∥ batched write) ─┘ on loss
//!   ▲ outbound messages are kept in a backlog (up to the HWM)
//! ```
//!
//! The driver ends when the session drops its [`Channel`](crate::transport::Channel);
//! whatever is still queued then gets up to `linger` to reach the broker.

use std::collections::VecDeque;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use super::frame_buffer::{encode_command, FrameBuffer, ZmtpFrame};
use super::greeting::{check_greeting, greeting, ready_command, PeerCommand, GREETING_SIZE};
use super::writer::{collect_batch, write_batch};
use super::ZmtpOptions;
use crate::error::{MdpError, Result};
use crate::protocol::Message;
use crate::transport::{Endpoint, Link};

const READ_BUFFER_SIZE: usize = 64 * 1024;

type BoxedReader = Box<dyn AsyncRead + Unpin + Send>;
type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// A handshaken connection.
struct Connection {
    reader: BoxedReader,
    writer: BoxedWriter,
    frames: FrameBuffer,
    /// Frames that arrived in the same read as the peer's READY.
    early: Vec<ZmtpFrame>,
}

enum PumpExit {
    /// The session closed its channel.
    Closed,
    /// The connection failed; reconnect.
    Lost(MdpError),
}

/// Run the connection until the session closes its channel.
pub(crate) async fn drive(
    endpoint: Endpoint,
    identity: String,
    mut link: Link,
    options: ZmtpOptions,
) {
    let mut backlog: VecDeque<Message> = VecDeque::new();

    loop {
        let attempt = tokio::time::timeout(
            options.handshake_timeout,
            establish(&endpoint, &identity, options.max_frame_size),
        );
        tokio::pin!(attempt);

        let established = loop {
            tokio::select! {
                result = &mut attempt => break result,
                next = link.outbound.recv() => match next {
                    Some(message) => enqueue(&mut backlog, message, &options, &identity),
                    None => return flush_backlog(&endpoint, &identity, backlog, &options).await,
                },
            }
        };

        match established {
            Ok(Ok(mut connection)) => {
                tracing::debug!(%identity, %endpoint, "ZMTP connection established");
                match pump(&mut connection, &mut link, &mut backlog, &options).await {
                    PumpExit::Closed => return,
                    PumpExit::Lost(err) => {
                        tracing::warn!(%identity, %endpoint, "ZMTP connection lost: {}", err);
                    }
                }
            }
            Ok(Err(err)) => {
                tracing::debug!(%identity, %endpoint, "ZMTP connect failed: {}", err);
            }
            Err(_) => {
                tracing::debug!(%identity, %endpoint, "ZMTP handshake timed out");
            }
        }

        if link.inbound.is_closed() {
            while let Ok(message) = link.outbound.try_recv() {
                enqueue(&mut backlog, message, &options, &identity);
            }
            return flush_backlog(&endpoint, &identity, backlog, &options).await;
        }

        let pause = tokio::time::sleep(options.reconnect_interval);
        tokio::pin!(pause);
        loop {
            tokio::select! {
                _ = &mut pause => break,
                next = link.outbound.recv() => match next {
                    Some(message) => enqueue(&mut backlog, message, &options, &identity),
                    None => return flush_backlog(&endpoint, &identity, backlog, &options).await,
                },
            }
        }
    }
}

fn enqueue(
    backlog: &mut VecDeque<Message>,
    message: Message,
    options: &ZmtpOptions,
    identity: &str,
) {
    if backlog.len() >= options.send_high_water_mark {
        tracing::warn!(
            %identity,
            hwm = options.send_high_water_mark,
            "not connected and send queue full, dropping message"
        );
        return;
    }
    backlog.push_back(message);
}

async fn dial(endpoint: &Endpoint) -> Result<(BoxedReader, BoxedWriter)> {
    match endpoint {
        Endpoint::Tcp(address) => {
            let stream = TcpStream::connect(address.as_str()).await?;
            stream.set_nodelay(true)?;
            let (reader, writer) = stream.into_split();
            Ok((Box::new(reader), Box::new(writer)))
        }
        #[cfg(unix)]
        Endpoint::Ipc(path) => {
            let stream = tokio::net::UnixStream::connect(path).await?;
            let (reader, writer) = stream.into_split();
            Ok((Box::new(reader), Box::new(writer)))
        }
        #[cfg(not(unix))]
        Endpoint::Ipc(_) => Err(MdpError::InvalidEndpoint(
            "ipc:// endpoints need Unix domain sockets".to_string(),
        )),
    }
}

async fn establish(
    endpoint: &Endpoint,
    identity: &str,
    max_frame_size: u64,
) -> Result<Connection> {
    let (mut reader, mut writer) = dial(endpoint).await?;

    let mut hello = BytesMut::with_capacity(GREETING_SIZE + 64);
    hello.extend_from_slice(&greeting());
    encode_command(&mut hello, &ready_command("DEALER", Some(identity.as_bytes())));
    writer.write_all(&hello).await?;
    writer.flush().await?;

    let mut peer = [0u8; GREETING_SIZE];
    reader.read_exact(&mut peer).await?;
    check_greeting(&peer)?;

    let mut frames = FrameBuffer::with_max_frame_size(max_frame_size);
    let mut buf = vec![0u8; 4096];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Err(MdpError::Handshake(
                "peer closed the connection during handshake".to_string(),
            ));
        }

        let mut received = frames.push(&buf[..n])?.into_iter();
        while let Some(frame) = received.next() {
            if !frame.is_command() {
                return Err(MdpError::Handshake(
                    "peer sent a message before READY".to_string(),
                ));
            }
            match PeerCommand::parse(&frame.body)? {
                command @ PeerCommand::Ready { .. } => {
                    if let Some(socket_type) = command.property("Socket-Type") {
                        tracing::trace!(
                            peer_socket = %String::from_utf8_lossy(socket_type),
                            "ZMTP peer ready"
                        );
                    }
                    return Ok(Connection {
                        reader,
                        writer,
                        frames,
                        early: received.collect(),
                    });
                }
                PeerCommand::Error { reason } => {
                    return Err(MdpError::Handshake(format!("peer refused: {}", reason)));
                }
                PeerCommand::Other { name } => {
                    tracing::trace!(command = %name, "ignoring ZMTP command during handshake");
                }
            }
        }
    }
}

async fn pump(
    connection: &mut Connection,
    link: &mut Link,
    backlog: &mut VecDeque<Message>,
    options: &ZmtpOptions,
) -> PumpExit {
    let mut partial: Message = Vec::new();

    for frame in std::mem::take(&mut connection.early) {
        if !deliver(frame, &mut partial, &link.inbound) {
            return finish(connection, link, backlog, options).await;
        }
    }

    if !backlog.is_empty() {
        let pending: Vec<Message> = backlog.drain(..).collect();
        if let Err(err) = write_batch(&mut connection.writer, &pending).await {
            return PumpExit::Lost(err);
        }
    }

    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        tokio::select! {
            next = link.outbound.recv() => match next {
                Some(first) => {
                    let batch = collect_batch(first, &mut link.outbound);
                    if let Err(err) = write_batch(&mut connection.writer, &batch).await {
                        return PumpExit::Lost(err);
                    }
                }
                None => return finish(connection, link, backlog, options).await,
            },
            read = connection.reader.read(&mut buf) => match read {
                Ok(0) => {
                    return PumpExit::Lost(MdpError::Connect(
                        "peer closed the connection".to_string(),
                    ));
                }
                Ok(n) => match connection.frames.push(&buf[..n]) {
                    Ok(frames) => {
                        for frame in frames {
                            if !deliver(frame, &mut partial, &link.inbound) {
                                // Session gone; its last messages may still be queued.
                                return finish(connection, link, backlog, options).await;
                            }
                        }
                    }
                    Err(err) => return PumpExit::Lost(err),
                },
                Err(err) => return PumpExit::Lost(err.into()),
            },
        }
    }
}

/// Reassemble multipart messages; returns `false` once the session is gone.
fn deliver(
    frame: ZmtpFrame,
    partial: &mut Message,
    inbound: &mpsc::UnboundedSender<Message>,
) -> bool {
    if frame.is_command() {
        tracing::trace!("ignoring ZMTP command");
        return true;
    }

    let more = frame.is_more();
    partial.push(frame.body);
    if more {
        return true;
    }
    inbound.send(std::mem::take(partial)).is_ok()
}

/// Closed before ever connecting: one last attempt to deliver the backlog,
/// bounded by `linger`.
async fn flush_backlog(
    endpoint: &Endpoint,
    identity: &str,
    backlog: VecDeque<Message>,
    options: &ZmtpOptions,
) {
    if backlog.is_empty() || options.linger.is_zero() {
        return;
    }

    let dropped = backlog.len();
    let flush = async {
        let mut connection = establish(endpoint, identity, options.max_frame_size).await?;
        let pending: Vec<Message> = backlog.into_iter().collect();
        write_batch(&mut connection.writer, &pending).await?;
        connection.writer.shutdown().await?;
        Ok::<(), MdpError>(())
    };
    match tokio::time::timeout(options.linger, flush).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            tracing::debug!(%identity, dropped, "ZMTP backlog flush failed: {}", err);
        }
        Err(_) => {
            tracing::debug!(%identity, dropped, "ZMTP linger expired with queued messages");
        }
    }
}

/// The session closed its channel: write everything it queued, then shut
/// the connection down, all within `linger`.
async fn finish(
    connection: &mut Connection,
    link: &mut Link,
    backlog: &mut VecDeque<Message>,
    options: &ZmtpOptions,
) -> PumpExit {
    let flush = async {
        if !backlog.is_empty() {
            let pending: Vec<Message> = backlog.drain(..).collect();
            write_batch(&mut connection.writer, &pending).await?;
        }
        while let Some(first) = link.outbound.recv().await {
            let batch = collect_batch(first, &mut link.outbound);
            write_batch(&mut connection.writer, &batch).await?;
        }
        connection.writer.shutdown().await?;
        Ok::<(), MdpError>(())
    };
    match tokio::time::timeout(options.linger, flush).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::debug!("ZMTP final flush failed: {}", err),
        Err(_) => tracing::debug!("ZMTP linger expired before shutdown completed"),
    }
    PumpExit::Closed
}
