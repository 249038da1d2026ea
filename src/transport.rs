//! The closed set of transports a client can run over.

use std::net::SocketAddr;

use crate::codec::LineCodec;
use crate::tcp::TcpTransport;
use crate::types::{SocketError, TransportType};
use crate::udp::UdpTransport;

pub(crate) enum Transport {
    Tcp(TcpTransport),
    Udp(UdpTransport),
}

impl Transport {
    pub(crate) async fn connect(
        kind: TransportType,
        addr: &str,
        codec: LineCodec,
    ) -> Result<Self, SocketError> {
        match kind {
            TransportType::Tcp => TcpTransport::connect(addr, codec).await.map(Transport::Tcp),
            TransportType::Udp => UdpTransport::connect(addr, codec).await.map(Transport::Udp),
        }
    }

    pub(crate) fn peer_addr(&self) -> SocketAddr {
        match self {
            Transport::Tcp(t) => t.peer_addr(),
            Transport::Udp(t) => t.peer_addr(),
        }
    }

    pub(crate) async fn send(&mut self, message: String) -> Result<(), SocketError> {
        match self {
            Transport::Tcp(t) => t.send(message).await,
            Transport::Udp(t) => t.send(message).await,
        }
    }

    pub(crate) async fn next_message(&mut self) -> Option<Result<String, SocketError>> {
        match self {
            Transport::Tcp(t) => t.next_message().await,
            Transport::Udp(t) => t.next_message().await,
        }
    }

    pub(crate) async fn close(&mut self) -> Result<(), SocketError> {
        match self {
            Transport::Tcp(t) => t.close().await,
            Transport::Udp(t) => t.close().await,
        }
    }
}
