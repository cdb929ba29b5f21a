//! Mock transport for testing.
//!
//! Allows injecting inbound messages into the live connection, dropping it
//! from the "peer" side, and capturing sent messages for verification.

use super::{Connection, FrameReader, FrameWriter, Transport, TransportError};
use async_trait::async_trait;
use relay_types::PeerUri;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Mock transport for testing.
///
/// Every `connect()` creates a fresh in-memory connection. Only the most
/// recent one is "live": [`inject`](Self::inject) and
/// [`drop_connection`](Self::drop_connection) act on it.
#[derive(Debug, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    connect_log: Vec<PeerUri>,
    live: Option<LiveConnection>,
    next_connection: u64,
    sent_messages: Vec<String>,
    client_closes: usize,
    fail_connects: VecDeque<String>,
    fail_next_send: Option<String>,
}

#[derive(Debug)]
struct LiveConnection {
    id: u64,
    inbound: mpsc::UnboundedSender<Result<String, TransportError>>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a text message to the live connection's reader.
    ///
    /// Returns `false` if there is no live connection.
    pub fn inject(&self, text: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        match &inner.live {
            Some(live) => live.inbound.send(Ok(text.to_string())).is_ok(),
            None => false,
        }
    }

    /// Make the live connection's reader fail with the given error.
    pub fn inject_error(&self, error: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        match &inner.live {
            Some(live) => live
                .inbound
                .send(Err(TransportError::ReceiveFailed(error.to_string())))
                .is_ok(),
            None => false,
        }
    }

    /// Close the live connection from the peer side.
    ///
    /// Returns `false` if there was none.
    pub fn drop_connection(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.live.take().is_some()
    }

    /// Whether a connection is live (opened and not dropped or closed).
    pub fn is_connected(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.live.is_some()
    }

    /// Get all messages that were sent, across connections.
    pub fn sent_messages(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner.sent_messages.clone()
    }

    /// Get the last message that was sent.
    pub fn last_sent(&self) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner.sent_messages.last().cloned()
    }

    /// Every URI `connect()` was called with, failures included.
    pub fn connect_log(&self) -> Vec<PeerUri> {
        let inner = self.inner.lock().unwrap();
        inner.connect_log.clone()
    }

    /// Number of `connect()` calls so far.
    pub fn connect_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.connect_log.len()
    }

    /// Get the address of the most recent connect attempt.
    pub fn connected_address(&self) -> Option<PeerUri> {
        let inner = self.inner.lock().unwrap();
        inner.connect_log.last().cloned()
    }

    /// Number of connections the client closed itself.
    pub fn client_closes(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.client_closes
    }

    /// Cause the next connect() to fail with the given error.
    ///
    /// Calls queue up: N calls fail the next N connects.
    pub fn fail_next_connect(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_connects.push_back(error.to_string());
    }

    /// Cause the next send() to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_send = Some(error.to_string());
    }

    /// Clear all state (messages, failures, connection).
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = MockTransportInner::default();
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, uri: &PeerUri) -> Result<Connection, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.connect_log.push(uri.clone());

        // Check for forced failure
        if let Some(error) = inner.fail_connects.pop_front() {
            return Err(TransportError::ConnectionFailed(error));
        }

        let id = inner.next_connection;
        inner.next_connection += 1;

        let (tx, rx) = mpsc::unbounded_channel();
        inner.live = Some(LiveConnection { id, inbound: tx });

        Ok(Connection {
            writer: Box::new(MockWriter {
                id,
                inner: Arc::clone(&self.inner),
                closed: false,
            }),
            reader: Box::new(MockReader { inbound: rx }),
        })
    }
}

struct MockWriter {
    id: u64,
    inner: Arc<Mutex<MockTransportInner>>,
    closed: bool,
}

impl MockWriter {
    fn is_live(inner: &MockTransportInner, id: u64) -> bool {
        inner.live.as_ref().is_some_and(|live| live.id == id)
    }
}

#[async_trait]
impl FrameWriter for MockWriter {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();

        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }
        if !Self::is_live(&inner, self.id) {
            return Err(TransportError::NotConnected);
        }

        // Check for forced failure
        if let Some(error) = inner.fail_next_send.take() {
            return Err(TransportError::SendFailed(error));
        }

        inner.sent_messages.push(text);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        inner.client_closes += 1;
        if Self::is_live(&inner, self.id) {
            inner.live = None;
        }
        Ok(())
    }
}

struct MockReader {
    inbound: mpsc::UnboundedReceiver<Result<String, TransportError>>,
}

#[async_trait]
impl FrameReader for MockReader {
    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        self.inbound.recv().await
    }
}
