//! Persistent TCP client example
//!
//! Connects to a line server on 127.0.0.1:9000, sends a few lines and prints
//! whatever comes back. Try it against `ncat -l 9000 --crlf`: leave the
//! server quiet and watch the heartbeat probe and the timeout close.

use std::error::Error;
use std::net::SocketAddr;
use std::time::Duration;

use linesock::{CloseReason, SocketClient, SocketError, SocketObserver, TransportType};
use tracing::{info, warn};

struct LogObserver;

impl SocketObserver for LogObserver {
    fn on_connected(&self, peer: SocketAddr) {
        info!("Connected to {}", peer);
    }

    fn on_connect_failed(&self, error: &SocketError) {
        warn!("Could not connect: {}", error);
    }

    fn on_message(&self, message: &str) {
        info!("Server says: {}", message);
    }

    fn on_idle(&self) {
        info!("Nothing happening...");
    }

    fn on_closed(&self, reason: &CloseReason) {
        info!("Connection closed: {}", reason);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    info!("Starting persistent TCP client example...");

    let client = SocketClient::builder()
        .tag("demo")
        .address("127.0.0.1", 9000)
        .transport(TransportType::Tcp, true)
        .heartbeat_interval(Duration::from_secs(1))
        .timers(Duration::from_secs(1), Duration::from_secs(10))
        .observer(LogObserver)
        .build()?;

    // Wait for the connection
    let mut state = client.state_receiver();
    state
        .wait_for(|state| state.is_connected() || *state == linesock::LifecycleState::Closed)
        .await?;

    if client.is_connected() {
        for line in ["hello", "from", "linesock"] {
            client.send(line)?;
        }
    }

    // Run until the heartbeat gives up or the server hangs up
    client.closed().await;

    info!("Client example completed");
    Ok(())
}
