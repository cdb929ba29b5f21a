//! Session state machine for pocket-relay.
//!
//! This module provides a pure, side-effect-free state machine for the single
//! active companion connection. The state machine takes events as input and
//! produces a new state plus a list of actions to execute.
//!
//! The actual I/O (connecting, writing frames, arming timers) is performed by
//! relay-client, not by this module.

use relay_types::Frame;
use std::time::Duration;

/// Session state machine - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No connection and no pending reconnect. Initial state, and where an
    /// explicit stop or an exhausted retry budget leaves the session.
    Idle,
    /// Connection attempt in progress.
    Connecting {
        /// Which attempt this is (0 for the first try after a connect or a loss).
        attempt: u32,
    },
    /// Connected; frames flow and the change poller runs.
    Open,
    /// Disconnected, waiting for the reconnect timer.
    Closed {
        /// Attempt number the pending reconnect will use.
        attempt: u32,
    },
}

impl SessionState {
    /// Create a new state machine in the Idle state.
    pub fn new() -> Self {
        Self::Idle
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller (relay-client)
    /// is responsible for executing the returned actions in order.
    pub fn on_event(self, event: Event, policy: &ReconnectPolicy) -> (Self, Vec<Action>) {
        match (self, event) {
            // connect() supersedes whatever is live
            (Self::Idle, Event::ConnectRequested) => (
                Self::Connecting { attempt: 0 },
                vec![
                    Action::Connect,
                    Action::EmitEvent(SessionEvent::Connecting { attempt: 0 }),
                ],
            ),
            (Self::Open, Event::ConnectRequested) => (
                Self::Connecting { attempt: 0 },
                vec![
                    Action::StopPoller,
                    Action::Disconnect,
                    Action::Connect,
                    Action::EmitEvent(SessionEvent::Connecting { attempt: 0 }),
                ],
            ),
            (Self::Connecting { .. }, Event::ConnectRequested) => (
                Self::Connecting { attempt: 0 },
                vec![
                    Action::Disconnect,
                    Action::Connect,
                    Action::EmitEvent(SessionEvent::Connecting { attempt: 0 }),
                ],
            ),
            (Self::Closed { .. }, Event::ConnectRequested) => (
                Self::Connecting { attempt: 0 },
                vec![
                    Action::CancelReconnect,
                    Action::Connect,
                    Action::EmitEvent(SessionEvent::Connecting { attempt: 0 }),
                ],
            ),

            // From Connecting
            (Self::Connecting { .. }, Event::TransportOpened) => (
                Self::Open,
                vec![Action::StartPoller, Action::EmitEvent(SessionEvent::Opened)],
            ),
            (Self::Connecting { attempt }, Event::ConnectFailed { error }) => {
                let mut actions = vec![Action::EmitEvent(SessionEvent::ConnectFailed {
                    attempt,
                    error,
                })];
                let next = schedule_retry(attempt.saturating_add(1), policy, &mut actions);
                (next, actions)
            }
            // Some transports report a refused handshake as a close.
            (Self::Connecting { attempt }, Event::TransportClosed { reason }) => {
                let mut actions = vec![Action::EmitEvent(SessionEvent::ConnectFailed {
                    attempt,
                    error: reason,
                })];
                let next = schedule_retry(attempt.saturating_add(1), policy, &mut actions);
                (next, actions)
            }

            // From Open
            (Self::Open, Event::FrameReceived { frame }) => {
                (Self::Open, vec![Action::Dispatch { frame }])
            }
            (Self::Open, Event::TransportClosed { reason }) => {
                let mut actions = vec![
                    Action::StopPoller,
                    Action::EmitEvent(SessionEvent::Closed { reason }),
                ];
                let next = schedule_retry(0, policy, &mut actions);
                (next, actions)
            }

            // From Closed
            (Self::Closed { attempt }, Event::ReconnectTimer) => (
                Self::Connecting { attempt },
                vec![
                    Action::Connect,
                    Action::EmitEvent(SessionEvent::Connecting { attempt }),
                ],
            ),

            // Explicit stop, distinct from a peer-initiated close
            (Self::Open, Event::StopRequested) => (
                Self::Idle,
                vec![
                    Action::StopPoller,
                    Action::Disconnect,
                    Action::EmitEvent(SessionEvent::Stopped),
                ],
            ),
            (Self::Connecting { .. }, Event::StopRequested) => (
                Self::Idle,
                vec![Action::Disconnect, Action::EmitEvent(SessionEvent::Stopped)],
            ),
            (Self::Closed { .. }, Event::StopRequested) => (
                Self::Idle,
                vec![
                    Action::CancelReconnect,
                    Action::EmitEvent(SessionEvent::Stopped),
                ],
            ),

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Check if frames may currently be sent.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Check if currently trying to (re)connect.
    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting { .. } | Self::Closed { .. })
    }

    /// Short lowercase name, for logs and status output.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting { .. } => "connecting",
            Self::Open => "open",
            Self::Closed { .. } => "closed",
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Enter `Closed { attempt }` with a reconnect timer, or give up.
fn schedule_retry(attempt: u32, policy: &ReconnectPolicy, actions: &mut Vec<Action>) -> SessionState {
    if policy.gives_up(attempt) {
        actions.push(Action::EmitEvent(SessionEvent::GaveUp { attempts: attempt }));
        return SessionState::Idle;
    }

    let delay = policy.delay(attempt);
    actions.push(Action::StartReconnectTimer { delay });
    actions.push(Action::EmitEvent(SessionEvent::ReconnectScheduled { attempt, delay }));
    SessionState::Closed { attempt }
}

/// Events that can occur in the session lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Owner asked to connect (to a new or the same endpoint).
    ConnectRequested,
    /// Transport reached the open state.
    TransportOpened,
    /// Transport could not be established.
    ConnectFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// Transport closed (peer went away, network dropped, ...).
    TransportClosed {
        /// Reason for the close.
        reason: String,
    },
    /// A well-formed frame arrived.
    FrameReceived {
        /// The decoded frame.
        frame: Frame,
    },
    /// Reconnect timer fired.
    ReconnectTimer,
    /// Owner asked to stop relaying.
    StopRequested,
}

/// Actions to be executed by relay-client.
///
/// These are instructions, not side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Open a new transport connection to the session's endpoint.
    Connect,
    /// Close the current transport without triggering reconnection.
    Disconnect,
    /// Start the change poller timer.
    StartPoller,
    /// Stop the change poller timer.
    StopPoller,
    /// Hand a frame to the command dispatcher.
    Dispatch {
        /// The frame to dispatch.
        frame: Frame,
    },
    /// Arm the reconnect timer.
    StartReconnectTimer {
        /// Delay before attempting reconnection.
        delay: Duration,
    },
    /// Disarm any pending reconnect timer.
    CancelReconnect,
    /// Publish an event to the session's owner.
    EmitEvent(SessionEvent),
}

/// Events published to the session's owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A connection attempt started.
    Connecting {
        /// Attempt number.
        attempt: u32,
    },
    /// The connection is open.
    Opened,
    /// An open connection was lost.
    Closed {
        /// Reason for the close.
        reason: String,
    },
    /// A connection attempt failed.
    ConnectFailed {
        /// Attempt number that failed.
        attempt: u32,
        /// Error message describing the failure.
        error: String,
    },
    /// A reconnect is scheduled.
    ReconnectScheduled {
        /// Attempt number the reconnect will use.
        attempt: u32,
        /// Delay before it fires.
        delay: Duration,
    },
    /// The retry budget is exhausted; the session is Idle.
    GaveUp {
        /// Number of failed attempts.
        attempts: u32,
    },
    /// The session was stopped by its owner.
    Stopped,
    /// A command handler failed; the connection stays open.
    CommandFailed {
        /// Verb of the failed command.
        verb: String,
        /// Error message describing the failure.
        error: String,
    },
    /// A poll tick was abandoned.
    PollFailed {
        /// Error message describing the failure.
        error: String,
    },
}

/// Reconnection backoff policy.
///
/// Delay for attempt `n` is `min(cap, base * 2^n)` plus uniform jitter in
/// `0..=max_jitter`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect.
    pub base: Duration,
    /// Upper bound of the exponential part.
    pub cap: Duration,
    /// Upper bound of the random jitter added on top.
    pub max_jitter: Duration,
    /// Give up after this many consecutive failed attempts (`None` = never).
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
            max_jitter: Duration::from_secs(1),
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Policy without jitter, for deterministic scheduling.
    pub fn fixed(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            max_jitter: Duration::ZERO,
            max_attempts: None,
        }
    }

    /// Set the retry budget.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Whether attempt `attempt` exceeds the retry budget.
    pub fn gives_up(&self, attempt: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempt >= max)
    }

    /// Calculate the reconnection delay for an attempt, jitter included.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay(attempt) + random_jitter(self.max_jitter)
    }

    /// The capped exponential part of the delay.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        // 2^31 already overflows any sane base; clamp the shift.
        let factor = 1u32 << attempt.min(31);
        self.base.saturating_mul(factor).min(self.cap)
    }
}

/// Uniform jitter in `0..=max`. Falls back to none if the OS RNG fails.
fn random_jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }

    let mut bytes = [0u8; 8];
    match getrandom::getrandom(&mut bytes) {
        Ok(()) => Duration::from_millis(u64::from_le_bytes(bytes) % (max_ms + 1)),
        Err(_) => Duration::ZERO,
    }
}
