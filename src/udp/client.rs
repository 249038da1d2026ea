//! UDP client transport.
//!
//! UDP has no handshake: "connecting" binds an ephemeral local port and fixes
//! the remote endpoint with `UdpSocket::connect`, so only that peer's
//! datagrams are received. Datagrams are appended to one session buffer and
//! run through the line codec, so a line may span datagrams.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::BytesMut;
use tokio::net::{lookup_host, UdpSocket};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, info};

use crate::codec::LineCodec;
use crate::types::SocketError;

/// Largest datagram read in one call.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

pub struct UdpTransport {
    socket: UdpSocket,
    codec: LineCodec,
    read_buf: BytesMut,
    datagram: Vec<u8>,
    peer: SocketAddr,
}

impl UdpTransport {
    /// Resolve `addr`, bind a local socket of the same family and fix the
    /// remote endpoint.
    pub async fn connect(addr: &str, codec: LineCodec) -> Result<Self, SocketError> {
        let connect_err = |source: io::Error| SocketError::Connect {
            addr: addr.to_string(),
            source,
        };

        let peer = lookup_host(addr)
            .await
            .map_err(connect_err)?
            .next()
            .ok_or_else(|| {
                connect_err(io::Error::new(
                    io::ErrorKind::NotFound,
                    "address resolved to nothing",
                ))
            })?;

        let local = if peer.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(local).await.map_err(connect_err)?;
        socket.connect(peer).await.map_err(connect_err)?;
        info!(
            "UDP socket {} bound to peer {}",
            socket.local_addr()?,
            peer
        );

        Ok(Self {
            socket,
            codec,
            read_buf: BytesMut::new(),
            datagram: vec![0u8; MAX_DATAGRAM_SIZE],
            peer,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn local_addr(&self) -> Result<SocketAddr, SocketError> {
        self.socket.local_addr().map_err(SocketError::Io)
    }

    /// Frame one message and send it as a single datagram.
    pub async fn send(&mut self, message: String) -> Result<(), SocketError> {
        let mut buf = BytesMut::new();
        self.codec.encode(message, &mut buf)?;
        if buf.len() > MAX_DATAGRAM_SIZE {
            return Err(SocketError::FrameTooLarge {
                len: buf.len(),
                max: MAX_DATAGRAM_SIZE,
            });
        }
        self.socket.send(&buf).await?;
        debug!("Sent {} byte datagram to {}", buf.len(), self.peer);
        Ok(())
    }

    /// Next decoded message. Never returns `None`: UDP has no end-of-stream.
    ///
    /// Cancel safe: undecoded bytes stay in the session buffer.
    pub async fn next_message(&mut self) -> Option<Result<String, SocketError>> {
        loop {
            match self.codec.decode(&mut self.read_buf) {
                Ok(Some(message)) => return Some(Ok(message)),
                Ok(None) => {}
                Err(e) => return Some(Err(e)),
            }

            match self.socket.recv(&mut self.datagram).await {
                Ok(len) => {
                    debug!("Received {} byte datagram from {}", len, self.peer);
                    self.read_buf.extend_from_slice(&self.datagram[..len]);
                }
                // ICMP port-unreachable from an earlier send. Liveness is the
                // heartbeat's call, not the socket's.
                Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                    debug!("Peer {} unreachable: {}", self.peer, e);
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    /// Drop any partial line. The socket itself closes on drop.
    pub async fn close(&mut self) -> Result<(), SocketError> {
        if !self.read_buf.is_empty() {
            debug!(
                "Discarding {} undelimited bytes from {}",
                self.read_buf.len(),
                self.peer
            );
            self.read_buf.clear();
        }
        Ok(())
    }
}
