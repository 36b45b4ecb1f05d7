//! # scopelink
//!
//! Client side of the microscope remote-control link: a framed text/image
//! protocol running over a single reliable byte stream (a radio-link socket).
//!
//! ## Architecture
//!
//! ```text
//! connect ─► Connector ─► stream ─┬─► reader loop ─► FrameParser ─► Dispatcher ─► LinkEvent queue
//!                                 │                                    │ ack / newimage
//!                                 └─◄ writer task ◄─ WriterHandle ◄────┴── Link::send
//! ```
//!
//! - **Peer → local**: comma-separated text commands, one per read, and
//!   `image,<n>,` headers followed by `n` bytes of JPEG
//! - **Local → peer**: `<>`-terminated text commands
//! - **Flow control**: every received frame is answered once (`ack` for
//!   text, `newimage` for images)
//!
//! ## Example
//!
//! ```ignore
//! use scopelink::{LinkBuilder, LinkEvent, LocalCommand, TcpConnector};
//!
//! #[tokio::main]
//! async fn main() {
//!     let (link, mut events) = LinkBuilder::new().build(TcpConnector);
//!     link.connect("192.168.4.1:5000").await;
//!
//!     while let Some(event) = events.recv().await {
//!         if let LinkEvent::Connected = event {
//!             link.send_command(LocalCommand::Record).await.ok();
//!         }
//!     }
//! }
//! ```

pub mod config;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod writer;

mod dispatcher;
mod event;
mod link;
mod stats;

pub use config::LinkConfig;
pub use error::{LinkError, Result};
pub use event::{EventReceiver, LinkEvent};
pub use link::{Link, LinkBuilder, LinkState};
pub use protocol::{Frame, LocalCommand, PeerCommand};
pub use stats::LinkStats;
#[cfg(unix)]
pub use transport::UnixConnector;
pub use transport::{Connector, TcpConnector};
