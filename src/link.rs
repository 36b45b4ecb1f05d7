//! Link builder and connection manager.
//!
//! The [`LinkBuilder`] collects tunables and produces a [`Link`] plus the
//! receiving end of its event queue. The [`Link`] manages the lifecycle:
//! 1. `connect(target)` spawns a cancellable connection attempt
//! 2. On success: start writer task and reader loop, emit `Connected`,
//!    request the first image
//! 3. Reader loop parses chunks and hands frames to the dispatcher
//! 4. `stop()` or a stream failure tears everything down and emits exactly
//!    one `Disconnected`
//!
//! # Example
//!
//! ```ignore
//! use scopelink::{LinkBuilder, LinkEvent, TcpConnector};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (link, mut events) = LinkBuilder::new()
//!         .max_image_size(200_000)
//!         .build(TcpConnector);
//!
//!     link.connect("192.168.4.1:5000").await;
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             LinkEvent::Image(jpeg) => println!("image: {} bytes", jpeg.len()),
//!             LinkEvent::Disconnected { .. } => break,
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::{AbortHandle, JoinHandle};

use crate::config::LinkConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{LinkError, Result};
use crate::event::{emit, EventReceiver, EventSender, LinkEvent};
use crate::protocol::{FrameParser, LocalCommand};
use crate::stats::{LinkCounters, LinkStats};
use crate::transport::{BoxFuture, Connector};
use crate::writer::{spawn_writer_task, WriterHandle};

/// Lifecycle state of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

/// Builder for configuring and creating a [`Link`].
pub struct LinkBuilder {
    config: LinkConfig,
}

impl LinkBuilder {
    /// Create a new link builder with default settings.
    pub fn new() -> Self {
        Self {
            config: LinkConfig::default(),
        }
    }

    /// Replace all settings at once.
    pub fn config(mut self, config: LinkConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the largest accepted image.
    ///
    /// Default: 100 000 bytes
    pub fn max_image_size(mut self, bytes: usize) -> Self {
        self.config.max_image_size = bytes;
        self
    }

    /// Set the size of a single stream read.
    ///
    /// Default: 1024 bytes
    pub fn read_chunk_size(mut self, bytes: usize) -> Self {
        self.config.read_chunk_size = bytes;
        self
    }

    /// Set how many leading bytes of a chunk are read as header text.
    ///
    /// Default: 80 bytes
    pub fn header_scan_limit(mut self, bytes: usize) -> Self {
        self.config.header_scan_limit = bytes;
        self
    }

    /// Fail connection attempts that take longer than `timeout`.
    ///
    /// Default: wait indefinitely
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.config.connect_timeout_ms = Some(millis);
        self
    }

    /// Set the writer queue capacity.
    ///
    /// Default: 64
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Build the link around `connector`.
    ///
    /// Returns the link and the receiver for its events.
    pub fn build<C: Connector>(self, connector: C) -> (Link<C>, EventReceiver) {
        let (events, rx) = mpsc::unbounded_channel();
        let shared = Shared {
            connector,
            config: self.config,
            events,
            counters: Arc::new(LinkCounters::default()),
            inner: Mutex::new(Inner {
                state: LinkState::Disconnected,
                generation: 0,
                attempt: None,
                session: None,
            }),
        };
        (
            Link {
                shared: Arc::new(shared),
            },
            rx,
        )
    }
}

impl Default for LinkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Tasks and writer of an established connection.
struct Session {
    writer: WriterHandle,
    reader: JoinHandle<()>,
    writer_task: AbortHandle,
}

struct Inner {
    state: LinkState,
    /// Incremented by every `connect`; stale tasks compare against it.
    generation: u64,
    attempt: Option<JoinHandle<()>>,
    session: Option<Session>,
}

/// State shared by all clones of a [`Link`].
///
/// Background tasks only hold a [`Weak`] reference, so dropping the last
/// `Link` drops this and closes the connection.
struct Shared<C> {
    connector: C,
    config: LinkConfig,
    events: EventSender,
    counters: Arc<LinkCounters>,
    inner: Mutex<Inner>,
}

/// Who initiated a teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// `stop()`, a new `connect()` or the last handle going away.
    Caller,
    /// The reader task itself, after the stream ended or a write failed.
    Reader,
}

/// Connection manager for one logical link.
///
/// Cloning is cheap; all clones control the same connection. At most one
/// connection (or attempt) exists at a time. Dropping the last clone closes
/// the connection as [`stop`](Link::stop) would.
pub struct Link<C: Connector> {
    shared: Arc<Shared<C>>,
}

impl<C: Connector> Clone for Link<C> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<C: Connector> Link<C> {
    /// Start connecting to `target`.
    ///
    /// Any previous attempt or connection is torn down first. The outcome
    /// arrives as [`LinkEvent::Connected`] or [`LinkEvent::ConnectFailed`].
    pub async fn connect(&self, target: impl Into<String>) {
        let target = target.into();
        let mut inner = self.shared.inner.lock().await;

        inner.teardown(&self.shared.events, "reconnecting", Origin::Caller);

        inner.generation += 1;
        inner.state = LinkState::Connecting;
        tracing::info!(%target, "Connecting");

        let attempt = Attempt {
            link: Arc::downgrade(&self.shared),
            connecting: self.shared.connector.connect(target.clone()),
            timeout: self.shared.config.connect_timeout(),
            target,
            generation: inner.generation,
        };
        inner.attempt = Some(tokio::spawn(attempt.run()));
    }

    /// Cancel any attempt and close any connection.
    ///
    /// Idempotent: emits one `Disconnected` only if something was torn down.
    pub async fn stop(&self) {
        let mut inner = self.shared.inner.lock().await;
        inner.teardown(&self.shared.events, "stopped", Origin::Caller);
    }

    /// Send a text command to the peer and wait until it is written.
    ///
    /// A failed write also ends the connection.
    ///
    /// # Errors
    ///
    /// - `NotConnected` when no connection is active
    /// - `Write` / `ConnectionClosed` when the write fails
    pub async fn send(&self, command: &str) -> Result<()> {
        let writer = {
            let inner = self.shared.inner.lock().await;
            match (inner.state, &inner.session) {
                (LinkState::Connected, Some(session)) => session.writer.clone(),
                _ => return Err(LinkError::NotConnected),
            }
        };

        writer.send_message(command).await.inspect_err(|e| {
            tracing::warn!(command, "Send failed: {}", e);
            self.shared.counters.record_write_failure();
        })
    }

    /// Send a typed command to the peer.
    pub async fn send_command(&self, command: LocalCommand) -> Result<()> {
        self.send(&command.encode()).await
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> LinkState {
        self.shared.inner.lock().await.state
    }

    /// Check whether a connection is established.
    pub async fn is_connected(&self) -> bool {
        self.state().await == LinkState::Connected
    }

    /// Counters for the current (or last) connection.
    pub fn stats(&self) -> LinkStats {
        self.shared.counters.snapshot()
    }

    /// Settings this link was built with.
    pub fn config(&self) -> &LinkConfig {
        &self.shared.config
    }
}

impl<C> Drop for Shared<C> {
    fn drop(&mut self) {
        let Self { events, inner, .. } = self;
        inner.get_mut().teardown(events, "link dropped", Origin::Caller);
    }
}

impl Inner {
    /// Close whatever is open and emit `Disconnected` if anything was.
    fn teardown(&mut self, events: &EventSender, reason: &str, origin: Origin) {
        if let Some(attempt) = self.attempt.take() {
            attempt.abort();
        }

        if let Some(session) = self.session.take() {
            if origin == Origin::Caller {
                session.reader.abort();
            }
            session.writer_task.abort();
        }

        let previous = std::mem::replace(&mut self.state, LinkState::Disconnected);
        if previous != LinkState::Disconnected {
            tracing::info!(reason, "Disconnected");
            emit(
                events,
                LinkEvent::Disconnected {
                    reason: reason.to_string(),
                },
            );
        }
    }
}

/// One pending connection attempt.
struct Attempt<C: Connector> {
    link: Weak<Shared<C>>,
    connecting: BoxFuture<'static, std::io::Result<C::Stream>>,
    timeout: Option<Duration>,
    target: String,
    generation: u64,
}

impl<C: Connector> Attempt<C> {
    async fn run(self) {
        let Attempt {
            link,
            connecting,
            timeout,
            target,
            generation,
        } = self;

        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, connecting).await {
                Ok(result) => result.map_err(LinkError::Io),
                Err(_) => Err(LinkError::ConnectTimeout),
            },
            None => connecting.await.map_err(LinkError::Io),
        };

        // Every handle is gone; dropping the stream closes it.
        let Some(shared) = link.upgrade() else {
            return;
        };
        let mut inner = shared.inner.lock().await;
        if inner.generation != generation || inner.state != LinkState::Connecting {
            tracing::debug!(%target, "Discarding stale connection attempt");
            return;
        }
        inner.attempt = None;

        let stream = match result {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(%target, "Connection failed: {}", e);
                inner.state = LinkState::Disconnected;
                emit(
                    &shared.events,
                    LinkEvent::ConnectFailed {
                        reason: e.to_string(),
                    },
                );
                return;
            }
        };

        let (read_half, write_half) = tokio::io::split(stream);
        let (writer, writer_task) = spawn_writer_task(write_half, shared.config.writer_config());

        shared.counters.reset();
        inner.state = LinkState::Connected;
        emit(&shared.events, LinkEvent::Connected);

        let writer_abort = writer_task.abort_handle();
        let reader = ReaderTask {
            link: Arc::downgrade(&shared),
            dispatcher: Dispatcher::new(shared.events.clone(), writer.clone(), shared.counters.clone()),
            config: shared.config.clone(),
            counters: shared.counters.clone(),
            generation,
        };
        inner.session = Some(Session {
            writer,
            reader: tokio::spawn(reader.run(read_half, writer_task)),
            writer_task: writer_abort,
        });

        tracing::info!(%target, "Connected");
    }
}

/// Reader side of one connection.
struct ReaderTask<C> {
    link: Weak<Shared<C>>,
    dispatcher: Dispatcher,
    config: LinkConfig,
    counters: Arc<LinkCounters>,
    generation: u64,
}

impl<C: Connector> ReaderTask<C> {
    /// Read until the stream ends or the writer fails, then tear down.
    async fn run<R>(self, reader: R, mut writer_task: JoinHandle<Result<()>>)
    where
        R: AsyncRead + Unpin,
    {
        let reason = tokio::select! {
            biased;
            result = read_loop(reader, &self.dispatcher, &self.config, &self.counters) => match result {
                Ok(()) => "connection closed by peer".to_string(),
                Err(e) => {
                    tracing::error!("Read loop error: {}", e);
                    format!("device connection was lost: {e}")
                }
            },
            result = &mut writer_task => match result {
                Ok(Err(e)) => {
                    tracing::error!("Writer task error: {}", e);
                    format!("device connection was lost: {e}")
                }
                _ => "writer stopped".to_string(),
            },
        };

        let ReaderTask {
            link,
            dispatcher,
            generation,
            ..
        } = self;
        drop(dispatcher);

        let Some(shared) = link.upgrade() else {
            return;
        };
        let mut inner = shared.inner.lock().await;
        if inner.generation == generation {
            inner.teardown(&shared.events, &reason, Origin::Reader);
        }
    }
}

/// Main read loop - requests the first image, then reads chunks, parses
/// frames and dispatches them.
///
/// Returns `Ok(())` when the peer closes the stream.
async fn read_loop<R>(
    mut reader: R,
    dispatcher: &Dispatcher,
    config: &LinkConfig,
    counters: &LinkCounters,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    // The peer only sends images on request. Reply failures are reported by
    // the dispatcher and end the connection through the writer task.
    let _ = dispatcher.request_image().await;

    let mut parser = FrameParser::with_limits(config.max_image_size, config.header_scan_limit);
    let mut buf = vec![0u8; config.read_chunk_size.max(1)];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) => return Err(LinkError::Io(e)),
        };
        counters.record_bytes(n);

        let discarding = parser.is_discarding();
        match parser.push(&buf[..n]) {
            Ok(Some(frame)) => {
                let _ = dispatcher.dispatch(frame).await;
            }
            Ok(None) => {
                if discarding && !parser.is_discarding() {
                    let _ = dispatcher.request_image().await;
                }
            }
            Err(e) => {
                dispatcher.protocol_error(&e);
                // The rejected frame still needs its reply once consumed.
                if !parser.is_discarding() {
                    let _ = dispatcher.request_image().await;
                }
            }
        }
    }
}
