//! UDP transport.

pub mod client;

pub use client::{UdpTransport, MAX_DATAGRAM_SIZE};
