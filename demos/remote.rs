//! Remote - connect to a scope over TCP and print what arrives.
//!
//! This example demonstrates:
//! - Building a link with `LinkBuilder`
//! - Interpreting text frames with `PeerCommand`
//! - Forwarding raw commands with `send`
//!
//! # Running
//!
//! ```text
//! cargo run --example remote -- 192.168.4.1:5000
//! ```
//!
//! Lines typed on stdin are sent to the peer as raw commands
//! (e.g. `record`, `focusup`, `actiondown,0.100,0.200`).

use scopelink::{LinkBuilder, LinkEvent, PeerCommand, TcpConnector};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let target = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:5000".to_string());

    let (link, mut events) = LinkBuilder::new()
        .connect_timeout(std::time::Duration::from_secs(10))
        .build(TcpConnector);

    link.connect(target).await;

    // Forward stdin lines as commands.
    let input = link.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Err(e) = input.send(line).await {
                eprintln!("send failed: {}", e);
            }
        }
        input.stop().await;
    });

    while let Some(event) = events.recv().await {
        match event {
            LinkEvent::Connected => eprintln!("connected"),
            LinkEvent::Image(jpeg) => {
                eprintln!("image: {} bytes", jpeg.len());
            }
            LinkEvent::Message(tokens) => match PeerCommand::parse(&tokens) {
                Ok(command) => eprintln!("command: {:?}", command),
                Err(e) => eprintln!("unrecognized message {:?}: {}", tokens, e),
            },
            LinkEvent::ProtocolError { reason } | LinkEvent::WriteFailed { reason } => {
                eprintln!("warning: {}", reason);
            }
            LinkEvent::ConnectFailed { reason } | LinkEvent::Disconnected { reason } => {
                eprintln!("link down: {}", reason);
                break;
            }
        }
    }

    eprintln!("stats: {}", link.stats().to_json()?);
    Ok(())
}
