//! Client configuration.
//!
//! [`Builder`] collects settings, [`Builder::into_config`] validates them once
//! and yields an immutable [`Config`]. `Builder::build` (in the client module)
//! then starts the client.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::codec::{FramingStrategy, TextLineFraming};
use crate::observer::SocketObserver;
use crate::types::{SocketError, TransportType};

/// Tag used in log spans when none is set.
pub const DEFAULT_TAG: &str = "SocketClient";

/// Connect deadline for persistent clients unless overridden.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Connect deadline for one-shot clients; not configurable.
pub const ONE_SHOT_CONNECT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Heartbeat settings for persistent sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Quiet time before a probe is sent
    pub interval: Duration,
    /// How long to wait for inbound traffic after a probe
    pub timeout: Duration,
    /// Quiet time before the observer is told the session is idle
    pub idle_threshold: Duration,
    /// Probe payload
    pub probe: String,
    /// Inbound payload recognized as the probe response
    pub probe_ack: Option<String>,
    /// Whether recognized acks are also delivered as messages
    pub forward_probe_ack: bool,
    /// Whether to answer the peer's own probes with `probe_ack`
    pub reply_to_probe: bool,
}

impl HeartbeatConfig {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);
    pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_secs(10);
    pub const DEFAULT_PROBE: &'static str = "ping";
    pub const DEFAULT_PROBE_ACK: &'static str = "pong";

    /// True if `message` is the configured probe response.
    pub fn is_probe_ack(&self, message: &str) -> bool {
        self.probe_ack.as_deref() == Some(message)
    }

    fn validate(&self) -> Result<(), SocketError> {
        for (name, value) in [
            ("heartbeat interval", self.interval),
            ("heartbeat timeout", self.timeout),
            ("idle threshold", self.idle_threshold),
        ] {
            if value.is_zero() {
                return Err(SocketError::Validation(format!("{name} must be positive")));
            }
        }
        Ok(())
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Self::DEFAULT_INTERVAL,
            timeout: Self::DEFAULT_TIMEOUT,
            idle_threshold: Self::DEFAULT_IDLE_THRESHOLD,
            probe: Self::DEFAULT_PROBE.to_string(),
            probe_ack: Some(Self::DEFAULT_PROBE_ACK.to_string()),
            forward_probe_ack: true,
            reply_to_probe: true,
        }
    }
}

/// Validated, immutable client configuration.
#[derive(Clone)]
pub struct Config {
    pub(crate) tag: String,
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) transport: TransportType,
    pub(crate) persistent: bool,
    pub(crate) connect_timeout: Duration,
    pub(crate) heartbeat: Option<HeartbeatConfig>,
    pub(crate) framing: Arc<dyn FramingStrategy>,
    pub(crate) observer: Option<Arc<dyn SocketObserver>>,
    pub(crate) pending_payload: Option<String>,
}

impl Config {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, as handed to the resolver.
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn transport(&self) -> TransportType {
        self.transport
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Heartbeat settings; `Some` exactly when the client is persistent.
    pub fn heartbeat(&self) -> Option<&HeartbeatConfig> {
        self.heartbeat.as_ref()
    }

    pub fn framing(&self) -> &Arc<dyn FramingStrategy> {
        &self.framing
    }

    pub fn pending_payload(&self) -> Option<&str> {
        self.pending_payload.as_deref()
    }

    /// How long a single write may wait on a peer that is not draining
    /// before the session gives up on it.
    pub fn write_timeout(&self) -> Duration {
        self.heartbeat
            .as_ref()
            .map_or(self.connect_timeout, |heartbeat| heartbeat.timeout)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("tag", &self.tag)
            .field("address", &self.address())
            .field("transport", &self.transport)
            .field("persistent", &self.persistent)
            .field("connect_timeout", &self.connect_timeout)
            .field("heartbeat", &self.heartbeat)
            .field("framing", &self.framing)
            .field("observer", &self.observer.is_some())
            .field("pending_payload", &self.pending_payload)
            .finish()
    }
}

/// Collects client settings; see `Builder::build` to start a client.
pub struct Builder {
    tag: String,
    address: Option<(String, u16)>,
    transport: TransportType,
    persistent: bool,
    connect_timeout: Duration,
    heartbeat: HeartbeatConfig,
    framing: Option<Arc<dyn FramingStrategy>>,
    observer: Option<Arc<dyn SocketObserver>>,
    pending_payload: Option<String>,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            tag: DEFAULT_TAG.to_string(),
            address: None,
            transport: TransportType::Tcp,
            persistent: true,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            heartbeat: HeartbeatConfig::default(),
            framing: None,
            observer: None,
            pending_payload: None,
        }
    }
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport and session mode. `persistent = false` makes a one-shot
    /// client that sends the payload given to [`send`](Self::send) and closes.
    pub fn transport(mut self, transport: TransportType, persistent: bool) -> Self {
        self.transport = transport;
        self.persistent = persistent;
        self
    }

    /// Name shown in every log line of this client.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Remote endpoint. Required.
    pub fn address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.address = Some((host.into(), port));
        self
    }

    /// Probe response timeout and idle threshold.
    pub fn timers(mut self, heartbeat_timeout: Duration, idle_threshold: Duration) -> Self {
        self.heartbeat.timeout = heartbeat_timeout;
        self.heartbeat.idle_threshold = idle_threshold;
        self
    }

    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat.interval = interval;
        self
    }

    /// Connect deadline for persistent clients. One-shot clients always use
    /// [`ONE_SHOT_CONNECT_TIMEOUT`].
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn probe(mut self, probe: impl Into<String>) -> Self {
        self.heartbeat.probe = probe.into();
        self
    }

    /// Probe response to recognize, or `None` to treat all traffic alike.
    pub fn probe_ack(mut self, ack: Option<String>) -> Self {
        self.heartbeat.probe_ack = ack;
        self
    }

    pub fn forward_probe_ack(mut self, forward: bool) -> Self {
        self.heartbeat.forward_probe_ack = forward;
        self
    }

    pub fn reply_to_probe(mut self, reply: bool) -> Self {
        self.heartbeat.reply_to_probe = reply;
        self
    }

    pub fn framing(mut self, strategy: impl FramingStrategy) -> Self {
        self.framing = Some(Arc::new(strategy));
        self
    }

    pub fn observer(mut self, observer: impl SocketObserver) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Payload a one-shot client sends right after connecting.
    pub fn send(mut self, payload: impl Into<String>) -> Self {
        self.pending_payload = Some(payload.into());
        self
    }

    /// Validate and freeze the settings.
    pub fn into_config(self) -> Result<Config, SocketError> {
        let Some((host, port)) = self.address else {
            return Err(SocketError::Validation("address and port are required".into()));
        };
        if host.trim().is_empty() {
            return Err(SocketError::Validation("host must not be empty".into()));
        }
        if port == 0 {
            return Err(SocketError::Validation("port must be non-zero".into()));
        }

        let (connect_timeout, heartbeat) = if self.persistent {
            if self.connect_timeout.is_zero() {
                return Err(SocketError::Validation("connect timeout must be positive".into()));
            }
            self.heartbeat.validate()?;
            (self.connect_timeout, Some(self.heartbeat))
        } else {
            (ONE_SHOT_CONNECT_TIMEOUT, None)
        };

        let pending_payload = match (self.persistent, self.pending_payload) {
            (true, Some(_)) => {
                warn!(tag = %self.tag, "pending payload ignored for persistent client; use send() after connecting");
                None
            }
            (_, payload) => payload,
        };

        let framing: Arc<dyn FramingStrategy> = match self.framing {
            Some(framing) => framing,
            None => Arc::new(TextLineFraming::default()),
        };

        Ok(Config {
            tag: self.tag,
            host,
            port,
            transport: self.transport,
            persistent: self.persistent,
            connect_timeout,
            heartbeat,
            framing,
            observer: self.observer,
            pending_payload,
        })
    }
}
