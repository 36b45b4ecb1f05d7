//! Events delivered to the consumer of a [`Link`](crate::Link).

use bytes::Bytes;
use tokio::sync::mpsc;

/// Receiving end of the link's event queue.
pub type EventReceiver = mpsc::UnboundedReceiver<LinkEvent>;

pub(crate) type EventSender = mpsc::UnboundedSender<LinkEvent>;

/// Something the link observed, in decode order.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// Connection established. The first image has been requested.
    Connected,
    /// Connection ended, by `stop()` or because the stream failed.
    Disconnected { reason: String },
    /// Connection attempt failed. No retry is made.
    ConnectFailed { reason: String },
    /// A complete image arrived.
    Image(Bytes),
    /// A text command arrived, split into tokens.
    Message(Vec<String>),
    /// A malformed header was skipped. The connection stays up.
    ProtocolError { reason: String },
    /// A reply or command could not be written.
    WriteFailed { reason: String },
}

impl LinkEvent {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            LinkEvent::Connected => "connected",
            LinkEvent::Disconnected { .. } => "disconnected",
            LinkEvent::ConnectFailed { .. } => "connect_failed",
            LinkEvent::Image(_) => "image",
            LinkEvent::Message(_) => "message",
            LinkEvent::ProtocolError { .. } => "protocol_error",
            LinkEvent::WriteFailed { .. } => "write_failed",
        }
    }
}

/// Push an event, ignoring a consumer that has gone away.
pub(crate) fn emit(events: &EventSender, event: LinkEvent) {
    let name = event.name();
    if events.send(event).is_err() {
        tracing::trace!(event = name, "event receiver dropped");
    }
}
