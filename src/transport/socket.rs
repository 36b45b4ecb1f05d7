//! Socket connectors.
//!
//! # Example
//!
//! ```ignore
//! use scopelink::transport::{Connector, TcpConnector};
//!
//! let stream = TcpConnector.connect("192.168.4.1:5000".to_string()).await?;
//! ```

use tokio::net::TcpStream;

use super::{BoxFuture, Connector};

// ============================================================================
// TCP
// ============================================================================

/// Connects over TCP. Target format: `host:port`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&self, target: String) -> BoxFuture<'static, std::io::Result<TcpStream>> {
        Box::pin(async move {
            let stream = TcpStream::connect(target.as_str()).await?;
            // Small control messages must not sit in Nagle's buffer.
            stream.set_nodelay(true)?;
            Ok(stream)
        })
    }
}

// ============================================================================
// Unix Domain Socket
// ============================================================================

#[cfg(unix)]
mod unix_impl {
    use tokio::net::UnixStream;

    use super::super::{BoxFuture, Connector};

    /// Connects to a Unix domain socket. Target format: filesystem path.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct UnixConnector;

    impl Connector for UnixConnector {
        type Stream = UnixStream;

        fn connect(&self, target: String) -> BoxFuture<'static, std::io::Result<UnixStream>> {
            Box::pin(async move { UnixStream::connect(target).await })
        }
    }
}

#[cfg(unix)]
pub use unix_impl::UnixConnector;
