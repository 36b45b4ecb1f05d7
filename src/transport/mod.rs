//! Transport module - how a link obtains its byte stream.
//!
//! A [`Connector`] turns a target string into a connected, bidirectional
//! stream. Provided implementations:
//! - [`TcpConnector`] (`host:port`)
//! - [`UnixConnector`] (socket path, Unix only)
//!
//! Radio-link sockets (e.g. RFCOMM exposed by the platform) plug in by
//! implementing the same trait.

mod socket;

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};

pub use socket::TcpConnector;
#[cfg(unix)]
pub use socket::UnixConnector;

/// Boxed future type returned by connectors.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Opens the stream a link runs over.
pub trait Connector: Send + Sync + 'static {
    /// Connected stream type.
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Connect to `target`. Blocks until connected or failed.
    fn connect(&self, target: String) -> BoxFuture<'static, std::io::Result<Self::Stream>>;
}
