//! Routing of decoded frames to the consumer, plus flow-control replies.
//!
//! Every received frame is answered exactly once:
//! - image → [`LinkEvent::Image`], then `newimage`
//! - text  → [`LinkEvent::Message`], then `ack`
//!
//! The peer waits for the reply before sending its next frame, so at most
//! one unacknowledged command and one unrequested image are ever in flight.

use std::sync::Arc;

use crate::error::{LinkError, Result};
use crate::event::{emit, EventSender, LinkEvent};
use crate::protocol::{Frame, LocalCommand};
use crate::stats::LinkCounters;
use crate::writer::WriterHandle;

/// Frame dispatcher owned by the reader loop of one connection.
pub(crate) struct Dispatcher {
    events: EventSender,
    writer: WriterHandle,
    counters: Arc<LinkCounters>,
}

impl Dispatcher {
    pub(crate) fn new(events: EventSender, writer: WriterHandle, counters: Arc<LinkCounters>) -> Self {
        Self {
            events,
            writer,
            counters,
        }
    }

    /// Deliver a frame and send its flow-control reply.
    ///
    /// # Errors
    ///
    /// Returns the write error if the reply could not be sent. The failure
    /// has already been reported as [`LinkEvent::WriteFailed`].
    pub async fn dispatch(&self, frame: Frame) -> Result<()> {
        let reply = match frame {
            Frame::Image(image) => {
                tracing::debug!(size = image.len(), "image received");
                self.counters.record_image();
                emit(&self.events, LinkEvent::Image(image));
                LocalCommand::NewImage
            }
            Frame::Text(tokens) => {
                tracing::debug!(?tokens, "message received");
                self.counters.record_message();
                emit(&self.events, LinkEvent::Message(tokens));
                LocalCommand::Ack
            }
        };

        self.reply(reply).await
    }

    /// Ask the peer for the next image.
    ///
    /// Sent once after connecting and after a rejected image frame has been
    /// consumed.
    pub async fn request_image(&self) -> Result<()> {
        self.reply(LocalCommand::NewImage).await
    }

    /// Report a malformed header. The connection stays up.
    pub fn protocol_error(&self, err: &LinkError) {
        tracing::warn!("Protocol error: {}", err);
        self.counters.record_protocol_error();
        emit(
            &self.events,
            LinkEvent::ProtocolError {
                reason: err.to_string(),
            },
        );
    }

    async fn reply(&self, command: LocalCommand) -> Result<()> {
        if let Err(e) = self.writer.send_command(command).await {
            tracing::warn!(reply = %command, "Failed to send reply: {}", e);
            self.counters.record_write_failure();
            emit(
                &self.events,
                LinkEvent::WriteFailed {
                    reason: e.to_string(),
                },
            );
            return Err(e);
        }
        Ok(())
    }
}
