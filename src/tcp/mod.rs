//! TCP transport.

pub mod client;

pub use client::TcpTransport;
