//! Transport abstraction for pocket-relay.
//!
//! This module provides a pluggable transport layer that abstracts
//! the underlying connection mechanism (WebSocket, mock for testing).
//!
//! # Design
//!
//! The transport is a connection factory. `connect()` yields the two halves
//! of one duplex text connection:
//! - [`FrameWriter`] is owned by the session's single writer task
//! - [`FrameReader`] is owned by the session's reader task
//!
//! Each connection is independent; dropping both halves releases it.
//!
//! # Example
//!
//! ```ignore
//! let transport = MockTransport::new();
//! let Connection { mut writer, mut reader } = transport.connect(&uri).await?;
//! writer.send("device:listSMS [...]".into()).await?;
//! let inbound = reader.recv().await;
//! ```

mod mock;
mod websocket;

pub use mock::MockTransport;
pub use websocket::WebSocketTransport;

use async_trait::async_trait;
use relay_types::PeerUri;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Connection timeout.
    #[error("connection timeout")]
    Timeout,
}

/// Write half of a text connection.
#[async_trait]
pub trait FrameWriter: Send {
    /// Send one text message.
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Close the connection gracefully.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Read half of a text connection.
#[async_trait]
pub trait FrameReader: Send {
    /// Receive the next text message.
    ///
    /// Returns `None` once the peer has closed the connection.
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;
}

/// One established connection, split into its halves.
pub struct Connection {
    /// Outbound half.
    pub writer: Box<dyn FrameWriter>,
    /// Inbound half.
    pub reader: Box<dyn FrameReader>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

/// Transport trait for opening connections to a companion.
///
/// Implementations handle the underlying connection mechanism
/// (WebSocket, mock, etc).
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a connection to the peer at `uri`.
    async fn connect(&self, uri: &PeerUri) -> Result<Connection, TransportError>;
}
