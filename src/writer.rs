//! Dedicated writer task serializing all output onto the stream.
//!
//! Flow-control replies from the reader loop and commands issued by the
//! consumer both go through a cloneable [`WriterHandle`]. The handle feeds an
//! mpsc channel drained by a single writer task, so frames reach the wire
//! whole and in a total order.
//!
//! # Architecture
//!
//! ```text
//! Dispatcher (ack/newimage) ─┐
//! Link::send (user)         ─┼─► mpsc::Sender<OutboundMessage> ─► Writer Task ─► Stream
//! connect (first newimage)  ─┘
//! ```
//!
//! Every message carries a oneshot sender; the writer task reports the
//! outcome of the write back to whoever queued it.

use std::io::IoSlice;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{LinkError, Result};
use crate::protocol::{encode_message, LocalCommand};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Maximum messages to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 16;

/// A message ready to be written to the stream.
#[derive(Debug)]
pub struct OutboundMessage {
    /// Encoded bytes including the `<>` terminator.
    pub bytes: Bytes,
    /// Completion signal for the sender.
    done: Option<oneshot::Sender<Result<()>>>,
}

impl OutboundMessage {
    /// Encode a text message.
    pub fn text(text: &str) -> Self {
        Self {
            bytes: encode_message(text),
            done: None,
        }
    }

    /// Total size of this message on the wire.
    #[inline]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    fn with_completion(mut self) -> (Self, oneshot::Receiver<Result<()>>) {
        let (tx, rx) = oneshot::channel();
        self.done = Some(tx);
        (self, rx)
    }

    fn complete(self, result: Result<()>) {
        if let Some(done) = self.done {
            // Sender may have stopped waiting.
            let _ = done.send(result);
        }
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Channel capacity for the message queue.
    pub channel_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Handle for sending messages to the writer task.
///
/// This is cheaply cloneable and can be shared between the reader loop and
/// any number of consumer tasks.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundMessage>,
}

impl WriterHandle {
    /// Send a text message and wait until it has been written.
    ///
    /// # Errors
    ///
    /// - `ConnectionClosed` if the writer task is gone
    /// - `Write` if the stream rejected the bytes
    pub async fn send_message(&self, text: &str) -> Result<()> {
        let (message, done) = OutboundMessage::text(text).with_completion();

        self.tx
            .send(message)
            .await
            .map_err(|_| LinkError::ConnectionClosed)?;

        done.await.map_err(|_| LinkError::ConnectionClosed)?
    }

    /// Send a typed command and wait until it has been written.
    pub async fn send_command(&self, command: LocalCommand) -> Result<()> {
        self.send_message(&command.encode()).await
    }
}

/// Spawn the writer task and return a handle for sending messages.
///
/// # Returns
///
/// A tuple of `(WriterHandle, JoinHandle)`. The task ends cleanly once every
/// handle is dropped, or with an error on the first failed write.
pub fn spawn_writer_task<W>(writer: W, config: WriterConfig) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let task = tokio::spawn(writer_loop(rx, writer));
    (WriterHandle { tx }, task)
}

/// Main writer loop - receives messages and writes them to the stream.
async fn writer_loop<W>(mut rx: mpsc::Receiver<OutboundMessage>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(first) = rx.recv().await {
        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);

        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(message) => batch.push(message),
                Err(_) => break,
            }
        }

        match write_batch(&mut writer, &batch).await {
            Ok(()) => {
                for message in batch {
                    message.complete(Ok(()));
                }
            }
            Err(e) => {
                tracing::error!("Write failed: {}", e);
                for message in batch {
                    let err = std::io::Error::new(e.kind(), e.to_string());
                    message.complete(Err(LinkError::Write(err)));
                }
                return Err(LinkError::Write(e));
            }
        }
    }

    // All handles dropped.
    let _ = writer.shutdown().await;
    Ok(())
}

/// Write a batch of messages with scatter/gather I/O, in queue order.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundMessage]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total_size: usize = batch.iter().map(OutboundMessage::size).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "stream accepted no bytes",
            ));
        }
        total_written += written;
    }

    writer.flush().await
}

/// Build IoSlice array for remaining data after partial write.
fn build_remaining_slices(batch: &[OutboundMessage], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len());
    let mut start = 0;

    for message in batch {
        let end = start + message.size();
        if skip_bytes < end && !message.bytes.is_empty() {
            let offset = skip_bytes.saturating_sub(start);
            slices.push(IoSlice::new(&message.bytes[offset..]));
        }
        start = end;
    }

    slices
}
