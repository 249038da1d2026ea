//! One-shot UDP client example
//!
//! Sends a single line to 127.0.0.1:9001 and closes. No heartbeat runs.

use std::error::Error;

use linesock::{SocketClient, TransportType};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    info!("Starting one-shot UDP client example...");

    let client = SocketClient::builder()
        .tag("oneshot")
        .address("127.0.0.1", 9001)
        .transport(TransportType::Udp, false)
        .send("PING")
        .build()?;

    client.closed().await;

    info!("Datagram sent, client state: {:?}", client.state());
    Ok(())
}
