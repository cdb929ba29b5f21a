//! The relay session.
//!
//! One actor task owns the [`SessionState`] machine and interprets its
//! actions. Everything that touches the session (owner commands, transport
//! callbacks, handler replies, poll results, timers) arrives on the actor's
//! channels and is processed one at a time.
//!
//! # Connections
//!
//! Each `Connect` action bumps the session *generation* and spawns a link
//! task for it. The link owns the transport halves: a reader loop feeding
//! inbound text to the actor, and a single writer task draining an outbound
//! queue. Every message a link (or a handler, or a poll) sends back is tagged
//! with its generation; anything tagged with a stale generation is dropped.
//!
//! # Polling
//!
//! While Open, the change poller runs with a fixed delay between the end of
//! one tick and the start of the next. The cursor is created at the first
//! open and survives reconnects; it only advances after a tick's frames were
//! queued on a still-open connection.

use crate::dispatcher::Dispatcher;
use crate::poller::{ChangePoller, PollBatch, PollError};
use crate::transport::{Connection, Transport};
use relay_core::{Action, Event, PollCursor, ReconnectPolicy, SessionEvent, SessionState};
use relay_types::{Endpoint, Frame, PeerUri};
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default delay between poll ticks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

const CONTROL_BUFFER: usize = 32;
const EVENT_BUFFER: usize = 64;

/// Errors returned by [`SessionHandle`].
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session task has exited.
    #[error("session stopped")]
    Stopped,
}

/// Session tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Reconnect backoff.
    pub reconnect: ReconnectPolicy,
    /// Delay between poll ticks.
    pub poll_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Snapshot of the session for observers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionStatus {
    /// Current state.
    pub state: SessionState,
    /// Endpoint the session is (or was last) relaying to.
    pub endpoint: Option<Endpoint>,
    /// Poll cursor in ms, once the first connection opened.
    pub cursor_ms: Option<i64>,
}

enum Control {
    Connect(Endpoint),
    Send(Frame),
    Stop,
    Shutdown,
}

enum Internal {
    Opened {
        generation: u64,
        outbound: mpsc::UnboundedSender<String>,
    },
    ConnectFailed {
        generation: u64,
        error: String,
    },
    Closed {
        generation: u64,
        reason: String,
    },
    Inbound {
        generation: u64,
        text: String,
    },
    Replies {
        generation: u64,
        verb: String,
        result: Result<Vec<Frame>, crate::dispatcher::DispatchError>,
    },
    Polled {
        generation: u64,
        result: Result<PollBatch, PollError>,
    },
}

/// Cloneable handle to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    control: mpsc::Sender<Control>,
    status: watch::Receiver<SessionStatus>,
    events: broadcast::Sender<SessionEvent>,
}

impl std::fmt::Debug for Control {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Control::Connect(endpoint) => write!(f, "Connect({endpoint})"),
            Control::Send(frame) => write!(f, "Send({frame:?})"),
            Control::Stop => f.write_str("Stop"),
            Control::Shutdown => f.write_str("Shutdown"),
        }
    }
}

impl SessionHandle {
    /// Spawn the session actor on the current runtime. It starts Idle.
    pub fn spawn<T: Transport>(
        transport: T,
        dispatcher: Dispatcher,
        poller: ChangePoller,
        config: SessionConfig,
    ) -> Self {
        let (control_tx, control_rx) = mpsc::channel(CONTROL_BUFFER);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SessionStatus::default());
        let (events_tx, _) = broadcast::channel(EVENT_BUFFER);

        let actor = SessionActor {
            transport: Arc::new(transport),
            dispatcher: Arc::new(dispatcher),
            poller: Arc::new(poller),
            config,
            state: SessionState::new(),
            endpoint: None,
            generation: 0,
            link: None,
            cursor: None,
            next_poll: None,
            poll_in_flight: None,
            reconnect_at: None,
            control_rx,
            internal_tx,
            internal_rx,
            status_tx,
            events_tx: events_tx.clone(),
        };
        tokio::spawn(actor.run());

        Self {
            control: control_tx,
            status: status_rx,
            events: events_tx,
        }
    }

    /// Relay to `endpoint`, replacing any current connection.
    pub async fn connect(&self, endpoint: Endpoint) -> Result<(), SessionError> {
        self.command(Control::Connect(endpoint)).await
    }

    /// Queue a frame for the peer. Dropped unless the session is Open.
    pub async fn send(&self, frame: Frame) -> Result<(), SessionError> {
        self.command(Control::Send(frame)).await
    }

    /// Stop relaying: close the connection, cancel reconnects, go Idle.
    ///
    /// The session can be connected again afterwards.
    pub async fn stop(&self) -> Result<(), SessionError> {
        self.command(Control::Stop).await
    }

    /// Stop relaying and end the session task. Waits for it to exit.
    pub async fn shutdown(&self) {
        if self.control.send(Control::Shutdown).await.is_err() {
            return;
        }
        let mut status = self.status.clone();
        while status.changed().await.is_ok() {}
    }

    /// Current status snapshot.
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Watch the status.
    pub fn watch(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Subscribe to session events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Wait until the status satisfies `predicate`.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&SessionStatus) -> bool,
    ) -> Result<SessionStatus, SessionError> {
        let mut status = self.status.clone();
        let snapshot = status
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| SessionError::Stopped)?;
        Ok(snapshot.clone())
    }

    async fn command(&self, command: Control) -> Result<(), SessionError> {
        self.control
            .send(command)
            .await
            .map_err(|_| SessionError::Stopped)
    }
}

/// The live connection of the current generation.
struct Link {
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<String>>,
    cancel: CancellationToken,
}

struct SessionActor<T> {
    transport: Arc<T>,
    dispatcher: Arc<Dispatcher>,
    poller: Arc<ChangePoller>,
    config: SessionConfig,

    state: SessionState,
    endpoint: Option<Endpoint>,
    generation: u64,
    link: Option<Link>,
    cursor: Option<PollCursor>,
    next_poll: Option<Instant>,
    /// Generation of the tick currently running, if any.
    poll_in_flight: Option<u64>,
    reconnect_at: Option<Instant>,

    control_rx: mpsc::Receiver<Control>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    status_tx: watch::Sender<SessionStatus>,
    events_tx: broadcast::Sender<SessionEvent>,
}

impl<T: Transport> SessionActor<T> {
    async fn run(mut self) {
        debug!("Session task started");
        loop {
            tokio::select! {
                command = self.control_rx.recv() => match command {
                    Some(Control::Shutdown) | None => {
                        self.apply(Event::StopRequested);
                        break;
                    }
                    Some(command) => self.on_control(command),
                },
                Some(message) = self.internal_rx.recv() => self.on_internal(message),
                _ = sleep_until_opt(self.reconnect_at) => {
                    self.reconnect_at = None;
                    self.apply(Event::ReconnectTimer);
                }
                _ = sleep_until_opt(self.next_poll) => {
                    self.next_poll = None;
                    self.start_poll();
                }
            }
        }
        debug!("Session task exited");
    }

    fn on_control(&mut self, command: Control) {
        match command {
            Control::Connect(endpoint) => {
                info!(endpoint = %endpoint, "Connect requested");
                if self.endpoint.as_ref() != Some(&endpoint) {
                    // A different peer has seen none of our history.
                    self.cursor = None;
                }
                self.endpoint = Some(endpoint);
                self.apply(Event::ConnectRequested);
            }
            Control::Send(frame) => {
                if self.state.is_open() {
                    self.write(&frame);
                } else {
                    debug!(verb = %frame.verb, state = self.state.name(), "Dropping frame, session not open");
                }
            }
            Control::Stop => self.apply(Event::StopRequested),
            Control::Shutdown => {}
        }
    }

    fn on_internal(&mut self, message: Internal) {
        match message {
            Internal::Opened {
                generation,
                outbound,
            } => {
                if let Some(link) = self.current_link(generation) {
                    link.outbound = Some(outbound);
                    self.apply(Event::TransportOpened);
                }
            }
            Internal::ConnectFailed { generation, error } => {
                if self.current_link(generation).is_some() {
                    self.link = None;
                    self.apply(Event::ConnectFailed { error });
                }
            }
            Internal::Closed { generation, reason } => {
                if self.current_link(generation).is_some() {
                    self.link = None;
                    self.apply(Event::TransportClosed { reason });
                }
            }
            Internal::Inbound { generation, text } => {
                if self.current_link(generation).is_none() {
                    return;
                }
                match Frame::parse(&text) {
                    Ok(frame) => self.apply(Event::FrameReceived { frame }),
                    Err(e) => warn!(error = %e, "Dropping malformed frame"),
                }
            }
            Internal::Replies {
                generation,
                verb,
                result,
            } => {
                if generation != self.generation || !self.state.is_open() {
                    debug!(verb = %verb, "Discarding reply for a closed connection");
                    return;
                }
                match result {
                    Ok(frames) => {
                        for frame in &frames {
                            self.write(frame);
                        }
                    }
                    Err(e) => {
                        warn!(verb = %verb, error = %e, "Command failed");
                        self.emit(SessionEvent::CommandFailed {
                            verb,
                            error: e.to_string(),
                        });
                    }
                }
            }
            Internal::Polled { generation, result } => self.on_polled(generation, result),
        }
    }

    fn on_polled(&mut self, generation: u64, result: Result<PollBatch, PollError>) {
        if self.poll_in_flight == Some(generation) {
            self.poll_in_flight = None;
        }
        if generation != self.generation || !self.state.is_open() {
            debug!("Discarding poll result for a closed connection");
            return;
        }

        match result {
            Ok(batch) => {
                for frame in &batch.frames {
                    self.write(frame);
                }
                if let Some(cursor) = self.cursor.as_mut() {
                    cursor.advance(batch.scanned_at_ms);
                }
                self.publish_status();
            }
            Err(e) => {
                warn!(error = %e, "Poll tick failed");
                self.emit(SessionEvent::PollFailed {
                    error: e.to_string(),
                });
            }
        }

        self.next_poll = Some(Instant::now() + self.config.poll_interval);
    }

    fn current_link(&mut self, generation: u64) -> Option<&mut Link> {
        self.link
            .as_mut()
            .filter(|link| link.generation == generation)
    }

    fn apply(&mut self, event: Event) {
        let state = std::mem::take(&mut self.state);
        let before = state.name();
        let (next, actions) = state.on_event(event, &self.config.reconnect);
        if next.name() != before {
            debug!(from = before, to = next.name(), "Session state changed");
        }
        self.state = next;

        for action in actions {
            self.execute(action);
        }
        self.publish_status();
    }

    fn execute(&mut self, action: Action) {
        match action {
            Action::Connect => self.open_link(),
            Action::Disconnect => {
                if let Some(link) = self.link.take() {
                    debug!(generation = link.generation, "Closing connection");
                    link.cancel.cancel();
                }
            }
            Action::StartPoller => {
                if self.cursor.is_none() {
                    self.cursor = Some(PollCursor::new(self.poller.now_ms()));
                }
                self.next_poll = Some(Instant::now());
            }
            Action::StopPoller => {
                self.next_poll = None;
                self.poll_in_flight = None;
            }
            Action::Dispatch { frame } => self.dispatch(frame),
            Action::StartReconnectTimer { delay } => {
                self.reconnect_at = Some(Instant::now() + delay);
            }
            Action::CancelReconnect => self.reconnect_at = None,
            Action::EmitEvent(event) => {
                match &event {
                    SessionEvent::Opened => info!("Session open"),
                    SessionEvent::Closed { reason } => warn!(%reason, "Connection lost"),
                    SessionEvent::ConnectFailed { attempt, error } => {
                        warn!(attempt, %error, "Connect failed")
                    }
                    SessionEvent::ReconnectScheduled { attempt, delay } => {
                        info!(attempt, ?delay, "Reconnect scheduled")
                    }
                    SessionEvent::GaveUp { attempts } => warn!(attempts, "Giving up reconnecting"),
                    SessionEvent::Stopped => info!("Session stopped"),
                    _ => {}
                }
                self.emit(event);
            }
        }
    }

    fn open_link(&mut self) {
        let Some(endpoint) = self.endpoint.as_ref() else {
            warn!("Connect without an endpoint");
            return;
        };
        let uri = endpoint.uri();

        if let Some(stale) = self.link.take() {
            stale.cancel.cancel();
        }

        self.generation += 1;
        let generation = self.generation;
        let cancel = CancellationToken::new();
        self.link = Some(Link {
            generation,
            outbound: None,
            cancel: cancel.clone(),
        });

        debug!(generation, uri = %uri, "Connecting");
        tokio::spawn(run_link(
            Arc::clone(&self.transport),
            uri,
            generation,
            self.internal_tx.clone(),
            cancel,
        ));
    }

    fn dispatch(&mut self, frame: Frame) {
        if !self.dispatcher.handles(&frame.verb) {
            warn!(verb = %frame.verb, "Ignoring unknown verb");
            return;
        }

        let dispatcher = Arc::clone(&self.dispatcher);
        let internal = self.internal_tx.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            let result = dispatcher.dispatch(&frame).await;
            let _ = internal.send(Internal::Replies {
                generation,
                verb: frame.verb,
                result,
            });
        });
    }

    fn start_poll(&mut self) {
        if !self.state.is_open() || self.poll_in_flight.is_some() {
            return;
        }
        let Some(cursor) = self.cursor else {
            return;
        };

        let poller = Arc::clone(&self.poller);
        let internal = self.internal_tx.clone();
        let generation = self.generation;
        self.poll_in_flight = Some(generation);
        tokio::spawn(async move {
            let result = poller.tick(cursor).await;
            let _ = internal.send(Internal::Polled { generation, result });
        });
    }

    fn write(&mut self, frame: &Frame) {
        let Some(outbound) = self.link.as_ref().and_then(|l| l.outbound.as_ref()) else {
            debug!(verb = %frame.verb, "No connection, dropping frame");
            return;
        };
        if outbound.send(frame.encode()).is_err() {
            debug!(verb = %frame.verb, "Writer gone, dropping frame");
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events_tx.send(event);
    }

    fn publish_status(&self) {
        let status = SessionStatus {
            state: self.state.clone(),
            endpoint: self.endpoint.clone(),
            cursor_ms: self.cursor.map(|c| c.value()),
        };
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

/// Own one connection until it closes or is cancelled.
///
/// Reports `Opened` / `ConnectFailed` / `Inbound` / `Closed` for its
/// generation. A cancelled link reports nothing further.
async fn run_link<T: Transport>(
    transport: Arc<T>,
    uri: PeerUri,
    generation: u64,
    internal: mpsc::UnboundedSender<Internal>,
    cancel: CancellationToken,
) {
    let connected = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        result = transport.connect(&uri) => result,
    };

    let Connection {
        mut writer,
        mut reader,
    } = match connected {
        Ok(connection) => connection,
        Err(e) => {
            let _ = internal.send(Internal::ConnectFailed {
                generation,
                error: e.to_string(),
            });
            return;
        }
    };

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    if internal
        .send(Internal::Opened {
            generation,
            outbound: outbound_tx,
        })
        .is_err()
    {
        let _ = writer.close().await;
        return;
    }

    // The one task allowed to write to this connection.
    let write_failed = CancellationToken::new();
    let writer_task = {
        let cancel = cancel.clone();
        let write_failed = write_failed.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    next = outbound_rx.recv() => match next {
                        Some(text) => {
                            if let Err(e) = writer.send(text).await {
                                warn!(generation, error = %e, "Write failed");
                                write_failed.cancel();
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
            if let Err(e) = writer.close().await {
                debug!(generation, error = %e, "Close failed");
            }
        })
    };

    let reason = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let _ = writer_task.await;
                return;
            }
            _ = write_failed.cancelled() => break "write failed".to_string(),
            next = reader.recv() => match next {
                Some(Ok(text)) => {
                    if internal.send(Internal::Inbound { generation, text }).is_err() {
                        break "session gone".to_string();
                    }
                }
                Some(Err(e)) => break e.to_string(),
                None => break "closed by peer".to_string(),
            },
        }
    };

    cancel.cancel();
    let _ = writer_task.await;
    let _ = internal.send(Internal::Closed { generation, reason });
}
