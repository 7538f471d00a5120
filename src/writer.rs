//! Dedicated writer task for outbound frames.
//!
//! Callers never touch the socket. Requests, replies to daemon-initiated
//! calls and anything else the client emits go through one mpsc channel to
//! a single task that owns the write half, so frames never interleave.
//!
//! ```text
//! invoke()        ─┐
//! local method 1  ─┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► Socket
//! local method N  ─┘
//! ```
//!
//! Frames that are already queued get coalesced into one `write_vectored`.

use std::io::IoSlice;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::codec::EncodedFrame;
use crate::error::ConnError;
use crate::protocol::HEADER_SIZE;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// A frame ready to be written to the socket.
#[derive(Debug)]
pub struct OutboundFrame {
    /// Pre-encoded header.
    pub header: [u8; HEADER_SIZE],
    /// MessagePack payload.
    pub payload: Bytes,
}

impl OutboundFrame {
    /// Total size of this frame (header + payload).
    #[inline]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

impl From<EncodedFrame> for OutboundFrame {
    fn from(frame: EncodedFrame) -> Self {
        Self {
            header: frame.header.encode(),
            payload: frame.payload,
        }
    }
}

/// Handle for queueing frames on the writer task.
///
/// Cheap to clone; every clone feeds the same task.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
}

impl WriterHandle {
    /// Queue a frame.
    ///
    /// Fails with [`ConnError::Lost`] once the writer task has stopped.
    pub async fn send(&self, frame: impl Into<OutboundFrame>) -> Result<(), ConnError> {
        self.tx
            .send(frame.into())
            .await
            .map_err(|_| ConnError::Lost)
    }

    /// Check if the writer task is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The task ends cleanly when every handle is dropped, and with the I/O
/// error when the socket rejects a write.
pub fn spawn_writer_task<W>(
    writer: W,
    channel_capacity: usize,
) -> (WriterHandle, JoinHandle<std::io::Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(channel_capacity.max(1));
    let task = tokio::spawn(writer_loop(rx, writer));
    (WriterHandle { tx }, task)
}

async fn writer_loop<W>(mut rx: mpsc::Receiver<OutboundFrame>, mut writer: W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);

    while let Some(first) = rx.recv().await {
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        if let Err(e) = write_batch(&mut writer, &batch).await {
            tracing::warn!(error = %e, frames = batch.len(), "write failed");
            return Err(e);
        }
        tracing::trace!(frames = batch.len(), "batch written");
        batch.clear();
    }

    let _ = writer.shutdown().await;
    Ok(())
}

/// Write a batch of frames with scatter/gather I/O.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total_size: usize = batch.iter().map(OutboundFrame::size).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            ));
        }
        total_written += written;
    }

    writer.flush().await
}

/// IoSlices for everything past the first `skip_bytes` of the batch.
fn build_remaining_slices(batch: &[OutboundFrame], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len() * 2);
    let mut offset = 0;

    for frame in batch {
        let parts: [&[u8]; 2] = [&frame.header, &frame.payload];
        for part in parts {
            let end = offset + part.len();
            if !part.is_empty() && skip_bytes < end {
                let start = skip_bytes.saturating_sub(offset);
                slices.push(IoSlice::new(&part[start..]));
            }
            offset = end;
        }
    }

    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{request_parts, response_parts, Decoder, Frame};
    use crate::value::Value;
    use std::io::Cursor;
    use tokio::io::{duplex, AsyncReadExt};

    fn frame(id: u32) -> OutboundFrame {
        response_parts(id, &Value::from("abc")).unwrap().into()
    }

    #[test]
    fn test_outbound_frame_from_encoded() {
        let encoded = request_parts(42, "logLevel", &[]).unwrap();
        let size = encoded.size();
        let frame = OutboundFrame::from(encoded);
        assert_eq!(frame.size(), size);
        assert_eq!(&frame.header[..2], &[0x48, 0x47]);
    }

    #[tokio::test]
    async fn test_frames_reach_peer_in_order() {
        let (client, mut server) = duplex(64 * 1024);
        let (handle, _task) = spawn_writer_task(client, 16);

        for id in 1..=10u32 {
            handle.send(frame(id)).await.unwrap();
        }
        drop(handle);

        let mut bytes = Vec::new();
        server.read_to_end(&mut bytes).await.unwrap();

        let ids: Vec<_> = Decoder::new()
            .decode(&bytes)
            .map(|f| f.unwrap())
            .map(|f| match f {
                Frame::Response { id, .. } => id,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(ids, (1..=10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_send_after_task_stopped_is_lost() {
        let (client, server) = duplex(16);
        let (handle, task) = spawn_writer_task(client, 1);
        drop(server);

        // First write hits the closed pipe and stops the task.
        let _ = handle.send(frame(1)).await;
        assert!(task.await.unwrap().is_err());

        assert!(handle.is_closed());
        assert!(matches!(handle.send(frame(2)).await, Err(ConnError::Lost)));
    }

    #[tokio::test]
    async fn test_writer_shutdown_on_channel_close() {
        let (client, _server) = duplex(4096);
        let (handle, task) = spawn_writer_task(client, 4);
        drop(handle);
        assert!(task.await.unwrap().is_ok());
    }

    #[test]
    fn test_build_remaining_slices_partial_header() {
        let batch = vec![frame(1)];
        let payload_len = batch[0].payload.len();

        let slices = build_remaining_slices(&batch, 5);
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].len(), HEADER_SIZE - 5);
        assert_eq!(slices[1].len(), payload_len);

        let slices = build_remaining_slices(&batch, HEADER_SIZE + 1);
        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].len(), payload_len - 1);
    }

    #[test]
    fn test_build_remaining_slices_across_frames() {
        let batch = vec![frame(1), frame(2)];
        let first = batch[0].size();

        let slices = build_remaining_slices(&batch, first);
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].len(), HEADER_SIZE);
    }

    #[tokio::test]
    async fn test_write_batch_multiple() {
        let mut buf = Cursor::new(Vec::new());
        let batch: Vec<_> = (1..=5).map(frame).collect();
        let expected: usize = batch.iter().map(OutboundFrame::size).sum();

        write_batch(&mut buf, &batch).await.unwrap();
        assert_eq!(buf.into_inner().len(), expected);
    }
}
