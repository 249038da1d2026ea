//! Shared types: transport selection, close reasons and the crate error.

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

/// Transport a client connects over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportType {
    /// Connection-oriented stream socket.
    #[default]
    Tcp,
    /// Connectionless datagram socket.
    Udp,
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportType::Tcp => f.write_str("tcp"),
            TransportType::Udp => f.write_str("udp"),
        }
    }
}

/// Why an established session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// `close()` was called or the handle was dropped.
    Requested,
    /// A one-shot session flushed its payload.
    Completed,
    /// The remote end closed the stream.
    PeerClosed,
    /// No traffic arrived within the heartbeat timeout after a probe.
    LivenessTimeout(Duration),
    /// An inbound line exceeded the framing limit.
    FrameTooLarge { len: usize, max: usize },
    /// Inbound bytes could not be decoded.
    Decode(String),
    /// Writing to the transport failed.
    SendFailed(String),
    /// Reading from the transport failed.
    Transport(String),
}

impl CloseReason {
    /// True for closes the client asked for itself.
    pub fn is_graceful(&self) -> bool {
        matches!(self, CloseReason::Requested | CloseReason::Completed)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Requested => f.write_str("close requested"),
            CloseReason::Completed => f.write_str("one-shot send completed"),
            CloseReason::PeerClosed => f.write_str("closed by peer"),
            CloseReason::LivenessTimeout(t) => write!(f, "no heartbeat response within {t:?}"),
            CloseReason::FrameTooLarge { len, max } => {
                write!(f, "inbound frame of {len} bytes exceeds limit of {max}")
            }
            CloseReason::Decode(e) => write!(f, "decode failure: {e}"),
            CloseReason::SendFailed(e) => write!(f, "send failure: {e}"),
            CloseReason::Transport(e) => write!(f, "transport failure: {e}"),
        }
    }
}

/// Errors produced by the client.
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("invalid configuration: {0}")]
    Validation(String),

    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("connect to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    #[error("no live session")]
    NotConnected,

    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },

    #[error("heartbeat timed out after {0:?}")]
    LivenessTimeout(Duration),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("{count} queued message(s) not sent before the session closed: {reason}")]
    Unsent { count: usize, reason: CloseReason },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SocketError {
    /// Map a session-ending read error onto the reason reported to the observer.
    pub(crate) fn into_close_reason(self) -> CloseReason {
        match self {
            SocketError::FrameTooLarge { len, max } => CloseReason::FrameTooLarge { len, max },
            SocketError::Decode(e) => CloseReason::Decode(e),
            SocketError::LivenessTimeout(t) => CloseReason::LivenessTimeout(t),
            other => CloseReason::Transport(other.to_string()),
        }
    }
}
