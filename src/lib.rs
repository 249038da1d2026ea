//! # linesock
//!
//! A line-framed network client for TCP and UDP that keeps a long-lived,
//! heartbeat-monitored session open, or delivers a single payload and closes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use linesock::{SocketClient, SocketObserver, TransportType};
//!
//! struct Printer;
//!
//! impl SocketObserver for Printer {
//!     fn on_message(&self, message: &str) {
//!         println!("<- {message}");
//!     }
//! }
//!
//! # async fn run() -> Result<(), linesock::SocketError> {
//! let client = SocketClient::builder()
//!     .tag("orders")
//!     .address("127.0.0.1", 9000)
//!     .transport(TransportType::Tcp, true)
//!     .heartbeat_interval(Duration::from_secs(5))
//!     .timers(Duration::from_secs(3), Duration::from_secs(10))
//!     .observer(Printer)
//!     .build()?;
//!
//! // ... once connected
//! client.send("hello")?;
//! client.close();
//! # Ok(())
//! # }
//! ```
//!
//! ## Session modes
//!
//! - **Persistent**: the session stays open. When neither side has sent
//!   anything for the heartbeat interval a probe is written; if nothing comes
//!   back within the heartbeat timeout the session is closed with
//!   [`CloseReason::LivenessTimeout`]. A longer idle threshold produces a
//!   non-fatal [`SocketObserver::on_idle`] notification. A write the peer
//!   does not accept within the heartbeat timeout ends the session the same
//!   way.
//! - **One-shot**: the payload given to [`Builder::send`] is written right
//!   after connecting and the session closes. The connect deadline is fixed
//!   at 2 seconds, and [`SocketClient::send`] is not available.
//!
//! ## Wire format
//!
//! By default every message is UTF-8 text terminated by CRLF (`\r\n`) in both
//! directions, at most 1 MiB per line. Swap in another [`FramingStrategy`]
//! with [`Builder::framing`].
//!
//! ## Errors
//!
//! Configuration problems and sends without a live session fail
//! synchronously. Everything that happens after `build()` reaches the caller
//! only through the [`SocketObserver`], including queued messages that were
//! never written because the session closed first.

pub mod client;
pub mod codec;
pub mod config;
pub mod heartbeat;
pub mod observer;
pub mod tcp;
pub mod types;
pub mod udp;

mod transport;

// Re-export main types for convenience
pub use client::{LifecycleState, SocketClient};
pub use codec::{FramingStrategy, LineCodec, TextLineFraming, CRLF, DEFAULT_MAX_LINE_LENGTH};
pub use config::{Builder, Config, HeartbeatConfig};
pub use observer::{SocketEvent, SocketObserver};
pub use types::{CloseReason, SocketError, TransportType};
