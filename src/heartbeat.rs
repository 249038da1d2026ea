//! Liveness monitoring for persistent sessions.
//!
//! [`LivenessMonitor`] is a pure state machine: the session loop feeds it I/O
//! observations and fires the [`Timer`] it hands out, and the monitor answers
//! with [`LivenessAction`]s. Time is always passed in, which keeps the
//! monitor deterministic under test.
//!
//! ```text
//! Active --(interval without traffic)--> WaitingForProbeAck
//! WaitingForProbeAck --(inbound traffic)--> Active
//! WaitingForProbeAck --(timeout)--> TimedOut
//! ```
//!
//! Idle detection runs beside this: once no application message has moved in
//! either direction for the idle threshold, [`LivenessAction::Idle`] is
//! reported once, and again only after traffic resumes and stops.

use tokio::time::Instant;

use crate::config::HeartbeatConfig;

/// Heartbeat state of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessState {
    Active,
    WaitingForProbeAck,
    TimedOut,
}

/// What the session loop must do after a timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessAction {
    /// Write the probe message.
    SendProbe,
    /// Nothing arrived after the probe; close the session.
    ProbeTimedOut,
    /// Tell the observer the session is idle.
    Idle,
}

/// A scheduled wake-up. Stale timers are ignored by [`LivenessMonitor::fire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    pub at: Instant,
    pub generation: u64,
}

#[derive(Debug)]
pub struct LivenessMonitor {
    config: HeartbeatConfig,
    state: LivenessState,
    /// Last traffic that restarts the probe interval
    last_traffic: Instant,
    /// Last application message in either direction
    last_message: Instant,
    probe_deadline: Option<Instant>,
    idle_reported: bool,
    generation: u64,
    probes_sent: u64,
}

impl LivenessMonitor {
    pub fn new(config: HeartbeatConfig, now: Instant) -> Self {
        Self {
            config,
            state: LivenessState::Active,
            last_traffic: now,
            last_message: now,
            probe_deadline: None,
            idle_reported: false,
            generation: 0,
            probes_sent: 0,
        }
    }

    pub fn state(&self) -> LivenessState {
        self.state
    }

    pub fn config(&self) -> &HeartbeatConfig {
        &self.config
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn probes_sent(&self) -> u64 {
        self.probes_sent
    }

    /// Anything arrived from the peer. `application` is false for heartbeat
    /// probes and acks, which prove liveness but do not end an idle period.
    pub fn on_inbound(&mut self, now: Instant, application: bool) {
        if self.state == LivenessState::TimedOut {
            return;
        }
        self.state = LivenessState::Active;
        self.probe_deadline = None;
        self.last_traffic = now;
        if application {
            self.last_message = now;
            self.idle_reported = false;
        }
        self.generation += 1;
    }

    /// An application message was written. Outbound traffic says nothing about
    /// the peer, so a pending probe countdown keeps running.
    pub fn on_outbound(&mut self, now: Instant) {
        if self.state == LivenessState::TimedOut {
            return;
        }
        if self.state == LivenessState::Active {
            self.last_traffic = now;
        }
        self.last_message = now;
        self.idle_reported = false;
        self.generation += 1;
    }

    fn idle_deadline(&self) -> Option<Instant> {
        (!self.idle_reported).then(|| self.last_message + self.config.idle_threshold)
    }

    fn heartbeat_deadline(&self) -> Option<Instant> {
        match self.state {
            LivenessState::Active => Some(self.last_traffic + self.config.interval),
            LivenessState::WaitingForProbeAck => self.probe_deadline,
            LivenessState::TimedOut => None,
        }
    }

    /// Earliest pending deadline, stamped with the current generation.
    pub fn arm(&self) -> Option<Timer> {
        if self.state == LivenessState::TimedOut {
            return None;
        }
        let at = match (self.heartbeat_deadline(), self.idle_deadline()) {
            (Some(a), Some(b)) => a.min(b),
            (a, b) => a.or(b)?,
        };
        Some(Timer {
            at,
            generation: self.generation,
        })
    }

    /// Handle a fired timer. Timers armed before the last state change are
    /// discarded and yield no actions.
    pub fn fire(&mut self, timer: Timer, now: Instant) -> Vec<LivenessAction> {
        if timer.generation != self.generation || self.state == LivenessState::TimedOut {
            return Vec::new();
        }

        let mut actions = Vec::new();
        match self.state {
            LivenessState::WaitingForProbeAck => {
                if self.probe_deadline.is_some_and(|deadline| now >= deadline) {
                    self.state = LivenessState::TimedOut;
                    self.probe_deadline = None;
                    self.generation += 1;
                    return vec![LivenessAction::ProbeTimedOut];
                }
            }
            LivenessState::Active => {
                if now >= self.last_traffic + self.config.interval {
                    self.state = LivenessState::WaitingForProbeAck;
                    self.probe_deadline = Some(now + self.config.timeout);
                    self.probes_sent += 1;
                    actions.push(LivenessAction::SendProbe);
                }
            }
            LivenessState::TimedOut => {}
        }

        if self.idle_deadline().is_some_and(|deadline| now >= deadline) {
            self.idle_reported = true;
            actions.push(LivenessAction::Idle);
        }

        if !actions.is_empty() {
            self.generation += 1;
        }
        actions
    }
}
