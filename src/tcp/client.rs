use std::net::SocketAddr;

use futures::SinkExt;
use tokio::net::TcpStream;
use tokio_stream::StreamExt;
use tokio_util::codec::Framed;
use tracing::{debug, info};

use crate::codec::LineCodec;
use crate::types::SocketError;

/// Connection-oriented line transport over a single `TcpStream`.
pub struct TcpTransport {
    framed: Framed<TcpStream, LineCodec>,
    peer: SocketAddr,
}

impl TcpTransport {
    /// Resolve `addr` and open a stream to it.
    pub async fn connect(addr: &str, codec: LineCodec) -> Result<Self, SocketError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| SocketError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        info!("TCP stream established to {}", peer);

        Ok(Self {
            framed: Framed::new(stream, codec),
            peer,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Frame and write one message.
    pub async fn send(&mut self, message: String) -> Result<(), SocketError> {
        self.framed.send(message).await
    }

    /// Next decoded message, or `None` once the peer closed the stream.
    pub async fn next_message(&mut self) -> Option<Result<String, SocketError>> {
        self.framed.next().await
    }

    /// Flush pending writes and shut down the write half.
    pub async fn close(&mut self) -> Result<(), SocketError> {
        debug!("Shutting down TCP stream to {}", self.peer);
        SinkExt::close(&mut self.framed).await
    }
}
