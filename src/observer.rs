//! Caller-facing event callbacks.
//!
//! The lifecycle task never calls the observer directly. It pushes
//! [`SocketEvent`]s onto a channel drained by one dispatcher task per client,
//! so callbacks run in the order events happened and a slow observer never
//! stalls socket I/O.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::types::{CloseReason, SocketError};

/// Receives lifecycle and message events. Every method defaults to a no-op.
pub trait SocketObserver: Send + Sync + 'static {
    fn on_connected(&self, _peer: SocketAddr) {}

    fn on_connect_failed(&self, _error: &SocketError) {}

    fn on_message(&self, _message: &str) {}

    /// A non-fatal error, e.g. an outbound payload the framing rejected.
    fn on_error(&self, _error: &SocketError) {}

    /// No application traffic for the idle threshold.
    fn on_idle(&self) {}

    fn on_closed(&self, _reason: &CloseReason) {}
}

impl<T: SocketObserver + ?Sized> SocketObserver for Arc<T> {
    fn on_connected(&self, peer: SocketAddr) {
        (**self).on_connected(peer)
    }

    fn on_connect_failed(&self, error: &SocketError) {
        (**self).on_connect_failed(error)
    }

    fn on_message(&self, message: &str) {
        (**self).on_message(message)
    }

    fn on_error(&self, error: &SocketError) {
        (**self).on_error(error)
    }

    fn on_idle(&self) {
        (**self).on_idle()
    }

    fn on_closed(&self, reason: &CloseReason) {
        (**self).on_closed(reason)
    }
}

/// Events emitted by the lifecycle task.
#[derive(Debug)]
pub enum SocketEvent {
    Connected(SocketAddr),
    ConnectFailed(SocketError),
    Message(String),
    Error(SocketError),
    Idle,
    Closed(CloseReason),
}

pub(crate) type EventSender = mpsc::UnboundedSender<SocketEvent>;

/// Drain `events`, logging each one and handing it to `observer`.
pub(crate) async fn dispatch(
    mut events: mpsc::UnboundedReceiver<SocketEvent>,
    observer: Option<Arc<dyn SocketObserver>>,
) {
    while let Some(event) = events.recv().await {
        match &event {
            SocketEvent::Connected(peer) => info!("Connected to {}", peer),
            SocketEvent::ConnectFailed(e) => warn!("Connect failed: {}", e),
            SocketEvent::Message(message) => debug!("Received {} bytes", message.len()),
            SocketEvent::Error(e) => warn!("Session error: {}", e),
            SocketEvent::Idle => debug!("Session idle"),
            SocketEvent::Closed(reason) => info!("Session closed: {}", reason),
        }

        let Some(observer) = observer.as_deref() else {
            continue;
        };
        match &event {
            SocketEvent::Connected(peer) => observer.on_connected(*peer),
            SocketEvent::ConnectFailed(e) => observer.on_connect_failed(e),
            SocketEvent::Message(message) => observer.on_message(message),
            SocketEvent::Error(e) => observer.on_error(e),
            SocketEvent::Idle => observer.on_idle(),
            SocketEvent::Closed(reason) => observer.on_closed(reason),
        }
    }
}
