//! Batched message writing with scatter/gather I/O.
//!
//! The connection driver drains whatever messages are queued (up to
//! [`MAX_BATCH_SIZE`]) and writes them with `write_vectored`, so a burst of
//! heartbeats and replies costs one syscall plus a flush.

use std::io::IoSlice;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use super::frame_buffer::{flags, FrameHeader};
use crate::error::{MdpError, Result};
use crate::protocol::Message;

/// Maximum messages written in one batch.
pub(crate) const MAX_BATCH_SIZE: usize = 64;

/// `first` plus whatever is already queued, up to [`MAX_BATCH_SIZE`].
pub(crate) fn collect_batch(
    first: Message,
    rx: &mut mpsc::UnboundedReceiver<Message>,
) -> Vec<Message> {
    let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
    batch.push(first);

    while batch.len() < MAX_BATCH_SIZE {
        match rx.try_recv() {
            Ok(message) => batch.push(message),
            Err(_) => break,
        }
    }
    batch
}

/// Write a batch of multipart messages as ZMTP frames and flush.
pub(crate) async fn write_batch<W>(writer: &mut W, batch: &[Message]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let headers: Vec<FrameHeader> = batch
        .iter()
        .flat_map(|message| {
            let last = message.len().saturating_sub(1);
            message.iter().enumerate().map(move |(index, frame)| {
                let frame_flags = if index < last { flags::MORE } else { 0 };
                FrameHeader::new(frame_flags, frame.len())
            })
        })
        .collect();
    if headers.is_empty() {
        return Ok(());
    }

    let mut segments: Vec<&[u8]> = Vec::with_capacity(headers.len() * 2);
    for (header, frame) in headers.iter().zip(batch.iter().flatten()) {
        segments.push(header.as_bytes());
        if !frame.is_empty() {
            segments.push(&frame[..]);
        }
    }

    let total_size: usize = segments.iter().map(|segment| segment.len()).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = remaining_slices(&segments, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(MdpError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// IoSlices for everything after the first `skip_bytes` bytes.
fn remaining_slices<'a>(segments: &[&'a [u8]], skip_bytes: usize) -> Vec<IoSlice<'a>> {
    let mut slices = Vec::with_capacity(segments.len());
    let mut offset = 0;

    for segment in segments {
        let end = offset + segment.len();
        if skip_bytes < end {
            let start = skip_bytes.saturating_sub(offset);
            slices.push(IoSlice::new(&segment[start..]));
        }
        offset = end;
    }
    slices
}
