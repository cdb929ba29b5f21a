//! Device-side collaborators: the message store, the contact store and the
//! outbound text sender.
//!
//! These are the seams to the host platform. The relay only ever talks to
//! them through these traits; [`memory`] provides in-process implementations
//! for tests and the CLI's fixture mode.

mod memory;

pub use memory::{MemoryContactStore, MemoryMessageStore, RecordingSender};

use async_trait::async_trait;
use relay_types::MessageRecord;
use thiserror::Error;

/// Message store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or read.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The filter expression is not understood by this store.
    #[error("unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// The store refused the write.
    #[error("write rejected: {0}")]
    Rejected(String),
}

/// Outbound text send errors.
#[derive(Debug, Error)]
pub enum SendError {
    /// The platform refused to send.
    #[error("send rejected: {0}")]
    Rejected(String),

    /// No way to send right now (no service, radio off, ...).
    #[error("sender unavailable: {0}")]
    Unavailable(String),
}

/// Which mailbox of the message store to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mailbox {
    /// Received messages.
    Inbox,
    /// Messages sent from the device.
    Sent,
}

impl Mailbox {
    /// Both mailboxes, in the order the relay scans them.
    pub const SCAN_ORDER: [Mailbox; 2] = [Mailbox::Inbox, Mailbox::Sent];

    /// The store's message type code for this mailbox.
    pub fn kind(self) -> i32 {
        match self {
            Mailbox::Inbox => 1,
            Mailbox::Sent => 2,
        }
    }
}

/// Which messages a query should return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageFilter {
    /// Everything in the mailbox.
    All,
    /// Messages whose `date` is strictly after the given millisecond timestamp.
    NewerThan(i64),
    /// A store-native selection expression, passed through from the peer.
    Selection(String),
}

/// A message as the store holds it. Timestamps are in **milliseconds**.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct StoredMessage {
    /// Row id.
    pub id: i64,
    /// Conversation thread id.
    pub thread_id: i64,
    /// Remote party address.
    pub address: String,
    /// Stored/received time, ms.
    pub date_ms: i64,
    /// Time the sender sent it, ms.
    pub date_sent_ms: i64,
    /// Read flag.
    pub read: i32,
    /// Store message type.
    pub kind: i32,
    /// Message text.
    pub body: String,
    /// Seen flag.
    pub seen: i32,
}

impl StoredMessage {
    /// Convert to the wire record. Timestamps drop to whole seconds.
    pub fn to_record(&self) -> MessageRecord {
        MessageRecord {
            id: self.id,
            thread_id: self.thread_id,
            address: self.address.clone(),
            date: self.date_ms / 1000,
            date_sent: self.date_sent_ms / 1000,
            read: self.read,
            kind: self.kind,
            body: self.body.clone(),
            seen: self.seen,
        }
    }
}

impl std::fmt::Debug for StoredMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredMessage")
            .field("id", &self.id)
            .field("thread_id", &self.thread_id)
            .field("date_ms", &self.date_ms)
            .field("kind", &self.kind)
            .field("body", &format!("[{} bytes REDACTED]", self.body.len()))
            .finish_non_exhaustive()
    }
}

/// A contact as the store holds it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoredContact {
    /// Row id.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Primary phone number (may be empty).
    pub number: String,
    /// Whether the contact has at least one phone number.
    pub has_phone_number: bool,
}

/// A message to record in a mailbox.
#[derive(Clone, PartialEq, Eq)]
pub struct NewMessage {
    /// Recipient address.
    pub address: String,
    /// Message text.
    pub body: String,
}

impl std::fmt::Debug for NewMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewMessage")
            .field("address", &self.address)
            .field("body", &format!("[{} bytes REDACTED]", self.body.len()))
            .finish()
    }
}

/// The device's message store.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Query one mailbox.
    async fn query(
        &self,
        mailbox: Mailbox,
        filter: &MessageFilter,
    ) -> Result<Vec<StoredMessage>, StoreError>;

    /// Record a message in a mailbox.
    async fn insert(&self, mailbox: Mailbox, message: NewMessage) -> Result<(), StoreError>;
}

/// The device's contact store.
#[async_trait]
pub trait ContactStore: Send + Sync {
    /// Every contact.
    async fn contacts(&self) -> Result<Vec<StoredContact>, StoreError>;
}

/// The device's outbound text path.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Send `body` to `address`.
    async fn send_text(&self, address: &str, body: &str) -> Result<(), SendError>;
}
