//! Integration tests for scopelink.
//!
//! A `tokio::io::duplex` pair stands in for the radio socket; the test body
//! plays the peer and follows its request/reply discipline (it waits for
//! `ack` / `newimage` before sending the next frame).

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use scopelink::protocol::{encode_image_header, split_messages};
use scopelink::transport::BoxFuture;
use scopelink::{Connector, LinkBuilder, LinkError, LinkEvent, LinkState, LocalCommand, PeerCommand};
use tokio::io::{duplex, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

/// Injected failure of a [`TestStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    None,
    /// Every write fails with `BrokenPipe`.
    Writes,
    /// Every read fails with `ConnectionReset`.
    Reads,
}

/// Local end of a duplex pair with an optional injected failure.
struct TestStream {
    inner: DuplexStream,
    fault: Fault,
}

impl AsyncRead for TestStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.fault == Fault::Reads {
            return Poll::Ready(Err(io::ErrorKind::ConnectionReset.into()));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for TestStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.fault == Fault::Writes {
            return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
        }
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Connector handing the far end of each new duplex pair to the test.
///
/// Special targets:
/// - `refuse` fails immediately, `hang` never completes
/// - `broken-writes` / `broken-reads` inject a stream failure
/// - `stall` uses a one-byte pipe, so writes block until the peer reads
struct DuplexConnector {
    peers: mpsc::UnboundedSender<DuplexStream>,
}

impl Connector for DuplexConnector {
    type Stream = TestStream;

    fn connect(&self, target: String) -> BoxFuture<'static, io::Result<TestStream>> {
        let peers = self.peers.clone();
        Box::pin(async move {
            let (capacity, fault) = match target.as_str() {
                "refuse" => return Err(io::ErrorKind::ConnectionRefused.into()),
                "hang" => std::future::pending().await,
                "broken-writes" => (1 << 20, Fault::Writes),
                "broken-reads" => (1 << 20, Fault::Reads),
                "stall" => (1, Fault::None),
                _ => (1 << 20, Fault::None),
            };
            let (local, peer) = duplex(capacity);
            let _ = peers.send(peer);
            Ok(TestStream { inner: local, fault })
        })
    }
}

fn setup(builder: LinkBuilder) -> (
    scopelink::Link<DuplexConnector>,
    scopelink::EventReceiver,
    mpsc::UnboundedReceiver<DuplexStream>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (link, events) = builder.build(DuplexConnector { peers: tx });
    (link, events, rx)
}

async fn next_event(events: &mut scopelink::EventReceiver) -> LinkEvent {
    timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

async fn assert_no_event(events: &mut scopelink::EventReceiver) {
    let extra = timeout(Duration::from_millis(100), events.recv()).await;
    assert!(extra.is_err(), "unexpected event: {:?}", extra);
}

/// Read from the peer end until `count` complete `<>` messages arrived.
async fn read_messages(peer: &mut DuplexStream, count: usize) -> Vec<Vec<String>> {
    let mut wire = Vec::new();
    let mut buf = [0u8; 256];
    loop {
        let messages = split_messages(&wire);
        if messages.len() >= count {
            return messages;
        }
        let n = timeout(WAIT, peer.read(&mut buf))
            .await
            .expect("timed out waiting for peer bytes")
            .unwrap();
        assert!(n > 0, "stream closed early");
        wire.extend_from_slice(&buf[..n]);
    }
}

async fn expect_reply(peer: &mut DuplexStream, reply: &str) {
    assert_eq!(read_messages(peer, 1).await, vec![vec![reply.to_string()]]);
}

/// Connect and consume the initial `Connected` + first `newimage` request.
async fn connected(builder: LinkBuilder) -> (
    scopelink::Link<DuplexConnector>,
    scopelink::EventReceiver,
    DuplexStream,
) {
    let (link, mut events, mut peers) = setup(builder);
    link.connect("scope").await;

    assert_eq!(next_event(&mut events).await, LinkEvent::Connected);
    let mut peer = timeout(WAIT, peers.recv()).await.unwrap().unwrap();
    expect_reply(&mut peer, "newimage").await;

    (link, events, peer)
}

#[tokio::test]
async fn test_connect_requests_first_image() {
    let (link, _events, _peer) = connected(LinkBuilder::new()).await;
    assert_eq!(link.state().await, LinkState::Connected);
}

#[tokio::test]
async fn test_text_command_is_delivered_and_acknowledged() {
    let (_link, mut events, mut peer) = connected(LinkBuilder::new()).await;

    peer.write_all(b"lockupdate,0.500,0.250").await.unwrap();

    let tokens = match next_event(&mut events).await {
        LinkEvent::Message(tokens) => tokens,
        other => panic!("expected message, got {other:?}"),
    };
    assert_eq!(tokens, vec!["lockupdate", "0.500", "0.250"]);
    assert_eq!(
        PeerCommand::parse(&tokens).unwrap(),
        PeerCommand::LockUpdate {
            offset: 0.5,
            sum: 0.25
        }
    );
    expect_reply(&mut peer, "ack").await;
}

#[tokio::test]
async fn test_image_across_chunks() {
    let (link, mut events, mut peer) = connected(LinkBuilder::new()).await;
    let jpeg: Vec<u8> = (0..20_000u32).map(|i| (i * 7 % 256) as u8).collect();

    let mut first = encode_image_header(jpeg.len()).into_bytes();
    first.extend_from_slice(&jpeg[..500]);
    peer.write_all(&first).await.unwrap();
    for chunk in jpeg[500..].chunks(3000) {
        peer.write_all(chunk).await.unwrap();
        tokio::task::yield_now().await;
    }

    match next_event(&mut events).await {
        LinkEvent::Image(image) => assert_eq!(image.as_ref(), &jpeg[..]),
        other => panic!("expected image, got {other:?}"),
    }
    expect_reply(&mut peer, "newimage").await;
    assert_eq!(link.stats().images_received, 1);
}

#[tokio::test]
async fn test_oversized_image_is_protocol_error_not_disconnect() {
    let (link, mut events, mut peer) = connected(LinkBuilder::new().max_image_size(1000)).await;

    peer.write_all(b"image,5000,\xFF\xD8").await.unwrap();
    match next_event(&mut events).await {
        LinkEvent::ProtocolError { reason } => assert!(reason.contains("exceeds maximum")),
        other => panic!("expected protocol error, got {other:?}"),
    }

    peer.write_all(&[0u8; 4998]).await.unwrap();
    expect_reply(&mut peer, "newimage").await;

    peer.write_all(b"stopfilm").await.unwrap();
    assert_eq!(
        next_event(&mut events).await,
        LinkEvent::Message(vec!["stopfilm".into()])
    );
    expect_reply(&mut peer, "ack").await;
    assert_eq!(link.state().await, LinkState::Connected);
    assert_eq!(link.stats().protocol_errors, 1);
}

#[tokio::test]
async fn test_send_round_trip() {
    let (link, _events, mut peer) = connected(LinkBuilder::new()).await;

    link.send_command(LocalCommand::ActionDown { x: 0.12, y: -0.45 })
        .await
        .unwrap();

    let mut buf = [0u8; 64];
    let n = peer.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"actiondown,0.120,-0.450<>");
    assert_eq!(
        split_messages(&buf[..n]),
        vec![vec!["actiondown", "0.120", "-0.450"]]
    );
}

#[tokio::test]
async fn test_concurrent_sends_stay_intact() {
    let (link, _events, mut peer) = connected(LinkBuilder::new()).await;

    let mut tasks = Vec::new();
    for i in 0..40 {
        let link = link.clone();
        tasks.push(tokio::spawn(async move {
            let text = if i % 2 == 0 { "ack" } else { "newimage" };
            link.send(text).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let messages = read_messages(&mut peer, 40).await;
    assert_eq!(messages.len(), 40);
    assert!(messages
        .iter()
        .all(|m| m == &vec!["ack".to_string()] || m == &vec!["newimage".to_string()]));
}

#[tokio::test]
async fn test_stop_twice_emits_one_disconnect() {
    let (link, mut events, _peer) = connected(LinkBuilder::new()).await;

    link.stop().await;
    link.stop().await;

    assert!(matches!(
        next_event(&mut events).await,
        LinkEvent::Disconnected { .. }
    ));
    assert_no_event(&mut events).await;
    assert_eq!(link.state().await, LinkState::Disconnected);
    assert!(matches!(link.send("record").await, Err(LinkError::NotConnected)));
}

#[tokio::test]
async fn test_stop_closes_stream() {
    let (link, _events, mut peer) = connected(LinkBuilder::new()).await;

    link.stop().await;

    let mut buf = [0u8; 16];
    let n = timeout(WAIT, peer.read(&mut buf)).await.unwrap().unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_peer_close_then_stop_emits_one_disconnect() {
    let (link, mut events, peer) = connected(LinkBuilder::new()).await;

    drop(peer);
    match next_event(&mut events).await {
        LinkEvent::Disconnected { reason } => assert!(reason.contains("closed")),
        other => panic!("expected disconnect, got {other:?}"),
    }

    link.stop().await;
    assert_no_event(&mut events).await;
}

#[tokio::test]
async fn test_connect_failure() {
    let (link, mut events, _peers) = setup(LinkBuilder::new());

    link.connect("refuse").await;

    assert!(matches!(
        next_event(&mut events).await,
        LinkEvent::ConnectFailed { .. }
    ));
    assert_eq!(link.state().await, LinkState::Disconnected);

    link.stop().await;
    assert_no_event(&mut events).await;
}

#[tokio::test]
async fn test_connect_timeout() {
    let (link, mut events, _peers) =
        setup(LinkBuilder::new().connect_timeout(Duration::from_millis(50)));

    link.connect("hang").await;

    match next_event(&mut events).await {
        LinkEvent::ConnectFailed { reason } => {
            assert_eq!(reason, LinkError::ConnectTimeout.to_string())
        }
        other => panic!("expected connect failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_stop_cancels_pending_attempt() {
    let (link, mut events, _peers) = setup(LinkBuilder::new());

    link.connect("hang").await;
    assert_eq!(link.state().await, LinkState::Connecting);

    link.stop().await;

    assert!(matches!(
        next_event(&mut events).await,
        LinkEvent::Disconnected { .. }
    ));
    assert_no_event(&mut events).await;
    assert_eq!(link.state().await, LinkState::Disconnected);
}

#[tokio::test]
async fn test_reconnect_replaces_connection() {
    let (link, mut events, mut peers) = setup(LinkBuilder::new());

    link.connect("first").await;
    assert_eq!(next_event(&mut events).await, LinkEvent::Connected);
    let mut first = peers.recv().await.unwrap();
    expect_reply(&mut first, "newimage").await;

    link.connect("second").await;
    assert!(matches!(
        next_event(&mut events).await,
        LinkEvent::Disconnected { .. }
    ));
    assert_eq!(next_event(&mut events).await, LinkEvent::Connected);
    let mut second = peers.recv().await.unwrap();
    expect_reply(&mut second, "newimage").await;

    // Old stream is closed, new one carries traffic.
    let mut buf = [0u8; 16];
    assert_eq!(first.read(&mut buf).await.unwrap(), 0);

    second.write_all(b"startfilm").await.unwrap();
    assert_eq!(
        next_event(&mut events).await,
        LinkEvent::Message(vec!["startfilm".into()])
    );
    expect_reply(&mut second, "ack").await;
}

#[tokio::test]
async fn test_events_preserve_decode_order() {
    let (link, mut events, mut peer) = connected(LinkBuilder::new()).await;

    peer.write_all(b"showgain,1").await.unwrap();
    expect_reply(&mut peer, "ack").await;

    let mut image = encode_image_header(3).into_bytes();
    image.extend_from_slice(b"abc");
    peer.write_all(&image).await.unwrap();
    expect_reply(&mut peer, "newimage").await;

    peer.write_all(b"gainchange,2").await.unwrap();
    expect_reply(&mut peer, "ack").await;

    assert_eq!(
        next_event(&mut events).await,
        LinkEvent::Message(vec!["showgain".into(), "1".into()])
    );
    assert!(matches!(next_event(&mut events).await, LinkEvent::Image(_)));
    assert_eq!(
        next_event(&mut events).await,
        LinkEvent::Message(vec!["gainchange".into(), "2".into()])
    );

    let stats = link.stats();
    assert_eq!(stats.messages_received, 2);
    assert_eq!(stats.images_received, 1);
}

#[tokio::test]
async fn test_rejected_image_body_is_skipped() {
    let (_link, mut events, mut peer) = connected(LinkBuilder::new().max_image_size(10)).await;

    peer.write_all(b"image,50,").await.unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        LinkEvent::ProtocolError { .. }
    ));

    // No reply until the whole rejected body has been consumed.
    let mut buf = [0u8; 32];
    assert!(timeout(Duration::from_millis(100), peer.read(&mut buf)).await.is_err());

    peer.write_all(&[0xFF; 50]).await.unwrap();
    expect_reply(&mut peer, "newimage").await;

    assert_no_event(&mut events).await;
    assert!(timeout(Duration::from_millis(100), peer.read(&mut buf)).await.is_err());
}

#[tokio::test]
async fn test_invalid_image_size_requests_next_image() {
    let (link, mut events, mut peer) = connected(LinkBuilder::new()).await;

    peer.write_all(b"image,12ab,").await.unwrap();
    match next_event(&mut events).await {
        LinkEvent::ProtocolError { reason } => assert!(reason.contains("12ab")),
        other => panic!("expected protocol error, got {other:?}"),
    }
    expect_reply(&mut peer, "newimage").await;
    assert_eq!(link.state().await, LinkState::Connected);
}

#[tokio::test]
async fn test_write_failure_ends_connection() {
    let (link, mut events, _peers) = setup(LinkBuilder::new());

    link.connect("broken-writes").await;

    assert_eq!(next_event(&mut events).await, LinkEvent::Connected);
    assert!(matches!(
        next_event(&mut events).await,
        LinkEvent::WriteFailed { .. }
    ));
    match next_event(&mut events).await {
        LinkEvent::Disconnected { reason } => assert!(reason.contains("Write failed")),
        other => panic!("expected disconnect, got {other:?}"),
    }

    assert_eq!(link.state().await, LinkState::Disconnected);
    assert!(matches!(link.send("record").await, Err(LinkError::NotConnected)));

    link.stop().await;
    assert_no_event(&mut events).await;
}

#[tokio::test]
async fn test_read_error_emits_one_disconnect() {
    let (link, mut events, _peers) = setup(LinkBuilder::new());

    link.connect("broken-reads").await;

    assert_eq!(next_event(&mut events).await, LinkEvent::Connected);
    match next_event(&mut events).await {
        LinkEvent::Disconnected { reason } => {
            assert!(reason.contains("device connection was lost"))
        }
        other => panic!("expected disconnect, got {other:?}"),
    }
    assert_eq!(link.state().await, LinkState::Disconnected);

    link.stop().await;
    assert_no_event(&mut events).await;
}

#[tokio::test]
async fn test_stop_during_first_request_reports_nothing_else() {
    let (link, mut events, mut peers) = setup(LinkBuilder::new());

    link.connect("stall").await;
    assert_eq!(next_event(&mut events).await, LinkEvent::Connected);
    let _peer = peers.recv().await.unwrap();

    // The first `newimage` is stuck in the one-byte pipe.
    tokio::task::yield_now().await;
    link.stop().await;

    assert!(matches!(
        next_event(&mut events).await,
        LinkEvent::Disconnected { .. }
    ));
    assert_no_event(&mut events).await;
}

#[tokio::test]
async fn test_dropping_last_handle_closes_stream() {
    let (link, mut events, mut peer) = connected(LinkBuilder::new()).await;
    let clone = link.clone();

    drop(link);
    let mut buf = [0u8; 16];
    assert!(timeout(Duration::from_millis(100), peer.read(&mut buf)).await.is_err());

    drop(clone);
    let n = timeout(WAIT, peer.read(&mut buf)).await.unwrap().unwrap();
    assert_eq!(n, 0);

    match next_event(&mut events).await {
        LinkEvent::Disconnected { reason } => assert_eq!(reason, "link dropped"),
        other => panic!("expected disconnect, got {other:?}"),
    }
}
