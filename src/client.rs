//! Client handle and connection lifecycle.
//!
//! Each client runs one background task that owns the transport and is the
//! only writer of the lifecycle state:
//!
//! ```text
//! Init -> Connecting -> Connected -> Monitoring -> Closing -> Closed
//!              |             |                         ^
//!              v             +-- one-shot flush -------+
//!           Failed -> Closed
//! ```
//!
//! The handle talks to it through channels: outbound payloads over `mpsc`,
//! the close request through a `CancellationToken`, and the current state
//! back through `watch`. Observer events go out on their own channel (see
//! [`crate::observer`]).

use std::future;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, trace, warn, Instrument};

use crate::codec::LineCodec;
use crate::config::{Builder, Config};
use crate::heartbeat::{LivenessAction, LivenessMonitor, Timer};
use crate::observer::{dispatch, EventSender, SocketEvent};
use crate::transport::Transport;
use crate::types::{CloseReason, SocketError};

/// Lifecycle of a client's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Init,
    Connecting,
    Connected,
    /// Persistent session under heartbeat supervision
    Monitoring,
    Closing,
    Closed,
    Failed,
}

impl LifecycleState {
    /// True while a live session exists.
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected | Self::Monitoring)
    }
}

/// Running client. Created by [`Builder::build`].
///
/// Dropping the handle of a persistent client closes it. A one-shot client
/// keeps going until its payload is sent, so `build()` can be fire-and-forget.
pub struct SocketClient {
    config: Config,
    state_rx: watch::Receiver<LifecycleState>,
    outbound_tx: mpsc::UnboundedSender<String>,
    shutdown: CancellationToken,
}

impl SocketClient {
    pub fn builder() -> Builder {
        Builder::new()
    }

    fn start(config: Config) -> Result<Self, SocketError> {
        let runtime = Handle::try_current().map_err(|e| {
            SocketError::Validation(format!("a Tokio runtime is required to start the client: {e}"))
        })?;

        let (state_tx, state_rx) = watch::channel(LifecycleState::Init);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let span = info_span!("socket", tag = %config.tag, transport = %config.transport);
        runtime.spawn(dispatch(event_rx, config.observer.clone()).instrument(span.clone()));

        let engine = Engine {
            config: config.clone(),
            state_tx,
            outbound_rx,
            events: event_tx,
            shutdown: shutdown.clone(),
        };
        runtime.spawn(engine.run().instrument(span));

        Ok(Self {
            config,
            state_rx,
            outbound_tx,
            shutdown,
        })
    }

    /// Queue `message` for the live session. Returns immediately; write
    /// failures are reported to the observer.
    ///
    /// One-shot clients only send the payload given to [`Builder::send`].
    pub fn send(&self, message: impl Into<String>) -> Result<(), SocketError> {
        if !self.config.persistent {
            return Err(SocketError::Validation(
                "one-shot clients send only the payload given to the builder".into(),
            ));
        }
        if !self.is_connected() {
            return Err(SocketError::NotConnected);
        }
        self.outbound_tx
            .send(message.into())
            .map_err(|_| SocketError::NotConnected)
    }

    pub fn is_connected(&self) -> bool {
        self.state_rx.borrow().is_connected()
    }

    /// Request the session to close. Safe to call any number of times, in any
    /// state; only the first call has an effect.
    pub fn close(&self) {
        if !self.shutdown.is_cancelled() {
            debug!(tag = %self.config.tag, "Close requested");
        }
        self.shutdown.cancel();
    }

    pub fn state(&self) -> LifecycleState {
        *self.state_rx.borrow()
    }

    /// Watch state transitions.
    pub fn state_receiver(&self) -> watch::Receiver<LifecycleState> {
        self.state_rx.clone()
    }

    /// Wait until the background task has released the transport.
    pub async fn closed(&self) {
        let mut state_rx = self.state_rx.clone();
        let _ = state_rx
            .wait_for(|state| *state == LifecycleState::Closed)
            .await;
    }

    pub fn tag(&self) -> &str {
        &self.config.tag
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for SocketClient {
    fn drop(&mut self) {
        if self.config.persistent {
            self.shutdown.cancel();
        }
    }
}

impl Builder {
    /// Validate the settings and start the client on the current Tokio
    /// runtime. Nothing is spawned if validation fails.
    pub fn build(self) -> Result<SocketClient, SocketError> {
        SocketClient::start(self.into_config()?)
    }
}

/// State owned by the background task.
struct Engine {
    config: Config,
    state_tx: watch::Sender<LifecycleState>,
    outbound_rx: mpsc::UnboundedReceiver<String>,
    events: EventSender,
    shutdown: CancellationToken,
}

impl Engine {
    async fn run(mut self) {
        let addr = self.config.address();
        let connect_timeout = self.config.connect_timeout;
        self.set_state(LifecycleState::Connecting);
        info!("Connecting to {} (timeout {:?})", addr, connect_timeout);

        let codec = LineCodec::new(self.config.framing.clone());
        let attempt = timeout(
            connect_timeout,
            Transport::connect(self.config.transport, &addr, codec),
        );
        let result = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                debug!("Close requested while connecting, abandoning attempt");
                self.set_state(LifecycleState::Closed);
                return;
            }
            result = attempt => result,
        };

        let mut transport = match result {
            Ok(Ok(transport)) => transport,
            Ok(Err(e)) => return self.fail(e),
            Err(_) => {
                return self.fail(SocketError::ConnectTimeout {
                    addr,
                    timeout: connect_timeout,
                })
            }
        };

        self.set_state(LifecycleState::Connected);
        self.emit(SocketEvent::Connected(transport.peer_addr()));

        let reason = if self.config.persistent {
            self.monitor(&mut transport).await
        } else {
            self.flush_pending(&mut transport).await
        };

        self.set_state(LifecycleState::Closing);
        self.release(&mut transport, &reason).await;
        self.set_state(LifecycleState::Closed);
        self.emit(SocketEvent::Closed(reason));
    }

    fn fail(self, error: SocketError) {
        warn!("Connection attempt failed: {}", error);
        self.set_state(LifecycleState::Failed);
        self.emit(SocketEvent::ConnectFailed(error));
        self.set_state(LifecycleState::Closed);
    }

    /// One-shot mode: send the pending payload, then close.
    async fn flush_pending(&self, transport: &mut Transport) -> CloseReason {
        let Some(payload) = self.config.pending_payload.clone() else {
            debug!("No pending payload, closing one-shot session");
            return CloseReason::Completed;
        };

        match self.write(transport, payload).await {
            Ok(()) => {
                debug!("One-shot payload sent");
                CloseReason::Completed
            }
            Err(e) => e.into_close_reason(),
        }
    }

    /// Persistent mode: relay traffic under heartbeat supervision until
    /// something ends the session.
    async fn monitor(&mut self, transport: &mut Transport) -> CloseReason {
        let Some(heartbeat) = self.config.heartbeat.clone() else {
            warn!("Persistent session without heartbeat settings");
            return CloseReason::Transport("missing heartbeat configuration".into());
        };
        let mut liveness = LivenessMonitor::new(heartbeat, Instant::now());
        self.set_state(LifecycleState::Monitoring);

        loop {
            let timer = liveness.arm();
            let step = {
                let outbound_rx = &mut self.outbound_rx;
                let io = async {
                    tokio::select! {
                        inbound = transport.next_message() => Step::Inbound(inbound),
                        outbound = outbound_rx.recv() => Step::Outbound(outbound),
                    }
                };
                // I/O before the timer: an ack arriving with the deadline wins.
                tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => return CloseReason::Requested,
                    step = io => step,
                    fired = wait_for(timer) => Step::Timer(fired),
                }
            };

            match step {
                Step::Inbound(Some(Ok(message))) => {
                    if let Some(reason) = self.on_inbound(transport, &mut liveness, message).await {
                        return reason;
                    }
                }
                Step::Inbound(Some(Err(e))) => {
                    warn!("Inbound stream failed: {}", e);
                    return e.into_close_reason();
                }
                Step::Inbound(None) => return CloseReason::PeerClosed,
                Step::Outbound(Some(message)) => match self.write(transport, message).await {
                    Ok(()) => liveness.on_outbound(Instant::now()),
                    Err(WriteError::Rejected(e @ SocketError::FrameTooLarge { .. })) => {
                        self.emit(SocketEvent::Error(e))
                    }
                    Err(e) => return e.into_close_reason(),
                },
                Step::Outbound(None) => return CloseReason::Requested,
                Step::Timer(fired) => {
                    for action in liveness.fire(fired, Instant::now()) {
                        match action {
                            LivenessAction::SendProbe => {
                                debug!("Session quiet, sending heartbeat probe");
                                let probe = liveness.config().probe.clone();
                                if let Err(e) = self.write(transport, probe).await {
                                    return e.into_close_reason();
                                }
                            }
                            LivenessAction::ProbeTimedOut => {
                                let waited = liveness.config().timeout;
                                warn!("No response to heartbeat probe within {:?}", waited);
                                return SocketError::LivenessTimeout(waited).into_close_reason();
                            }
                            LivenessAction::Idle => self.emit(SocketEvent::Idle),
                        }
                    }
                }
            }
        }
    }

    /// Classify one inbound message. Returns a close reason if answering a
    /// peer probe failed.
    async fn on_inbound(
        &self,
        transport: &mut Transport,
        liveness: &mut LivenessMonitor,
        message: String,
    ) -> Option<CloseReason> {
        let now = Instant::now();
        let heartbeat = liveness.config();

        if message == heartbeat.probe {
            let reply = heartbeat
                .reply_to_probe
                .then(|| heartbeat.probe_ack.clone())
                .flatten();
            liveness.on_inbound(now, false);
            trace!("Peer heartbeat probe received");
            if let Some(ack) = reply {
                if let Err(e) = self.write(transport, ack).await {
                    return Some(e.into_close_reason());
                }
            }
            return None;
        }

        if heartbeat.is_probe_ack(&message) {
            let forward = heartbeat.forward_probe_ack;
            liveness.on_inbound(now, false);
            trace!("Heartbeat ack received");
            if forward {
                self.emit(SocketEvent::Message(message));
            }
            return None;
        }

        liveness.on_inbound(now, true);
        self.emit(SocketEvent::Message(message));
        None
    }

    /// Write one message. Gives up when the session is asked to close or the
    /// peer stops draining for longer than the write timeout.
    async fn write(&self, transport: &mut Transport, message: String) -> Result<(), WriteError> {
        let limit = self.config.write_timeout();
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(WriteError::Abandoned(CloseReason::Requested)),
            result = timeout(limit, transport.send(message)) => match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(WriteError::Rejected(e)),
                Err(_) => {
                    warn!("Peer did not accept a write within {:?}", limit);
                    Err(WriteError::Abandoned(CloseReason::LivenessTimeout(limit)))
                }
            },
        }
    }

    /// Stop accepting sends, flush what was queued if the close was
    /// graceful, and close the transport. Both steps are bounded by the
    /// write timeout; whatever did not go out is reported to the observer.
    async fn release(&mut self, transport: &mut Transport, reason: &CloseReason) {
        self.outbound_rx.close();
        let mut queued = Vec::new();
        while let Ok(message) = self.outbound_rx.try_recv() {
            queued.push(message);
        }

        let limit = self.config.write_timeout();
        let total = queued.len();
        let mut sent = 0usize;
        if reason.is_graceful() && total > 0 {
            let flush = timeout(limit, async {
                for message in queued {
                    transport.send(message).await?;
                    sent += 1;
                }
                Ok::<(), SocketError>(())
            })
            .await;
            match flush {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Failed to flush queued messages on close: {}", e),
                Err(_) => warn!("Flushing queued messages timed out after {:?}", limit),
            }
        }

        let unsent = total - sent;
        if unsent > 0 {
            warn!("Dropped {} queued messages on close", unsent);
            self.emit(SocketEvent::Error(SocketError::Unsent {
                count: unsent,
                reason: reason.clone(),
            }));
        }

        match timeout(limit, transport.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Error while closing transport: {}", e),
            Err(_) => debug!("Transport close timed out after {:?}", limit),
        }
        info!("Session closed: {}", reason);
    }

    fn set_state(&self, state: LifecycleState) {
        let previous = self.state_tx.send_replace(state);
        trace!("Lifecycle {:?} -> {:?}", previous, state);
    }

    fn emit(&self, event: SocketEvent) {
        // The dispatcher only goes away with the runtime.
        let _ = self.events.send(event);
    }
}

/// What woke the monitor loop.
enum Step {
    Inbound(Option<Result<String, SocketError>>),
    Outbound(Option<String>),
    Timer(Timer),
}

/// Why a write did not go out.
enum WriteError {
    /// The transport refused or failed the write.
    Rejected(SocketError),
    /// The write was cut short; the session ends for this reason.
    Abandoned(CloseReason),
}

impl WriteError {
    fn into_close_reason(self) -> CloseReason {
        match self {
            WriteError::Rejected(e) => CloseReason::SendFailed(e.to_string()),
            WriteError::Abandoned(reason) => reason,
        }
    }
}

/// Resolve when `timer` is due; never resolves without one.
async fn wait_for(timer: Option<Timer>) -> Timer {
    match timer {
        Some(timer) => {
            sleep_until(timer.at).await;
            timer
        }
        None => future::pending().await,
    }
}
