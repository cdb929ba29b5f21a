//! JSON payload records.
//!
//! Field names match what the existing companion peer expects, including the
//! leading-underscore `_id`. Timestamps on the wire are in **seconds**.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A text message as sent to the peer.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageRecord {
    /// Store row id.
    #[serde(rename = "_id", alias = "id")]
    pub id: i64,
    /// Conversation thread id.
    pub thread_id: i64,
    /// Remote party address (phone number).
    pub address: String,
    /// Received/stored time, seconds since the epoch.
    pub date: i64,
    /// Time the sender sent it, seconds since the epoch.
    pub date_sent: i64,
    /// Read flag (0/1).
    pub read: i32,
    /// Store message type (1 = inbox, 2 = sent, ...).
    #[serde(rename = "type")]
    pub kind: i32,
    /// Message text.
    pub body: String,
    /// Seen flag (0/1).
    pub seen: i32,
}

impl fmt::Debug for MessageRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageRecord")
            .field("id", &self.id)
            .field("thread_id", &self.thread_id)
            .field("address", &self.address)
            .field("date", &self.date)
            .field("date_sent", &self.date_sent)
            .field("read", &self.read)
            .field("kind", &self.kind)
            .field("body", &format!("[{} bytes REDACTED]", self.body.len()))
            .field("seen", &self.seen)
            .finish()
    }
}

/// A contact with a phone number.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContactRecord {
    /// Store row id.
    #[serde(rename = "_id", alias = "id")]
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Phone number.
    pub number: String,
}

/// Payload of `client:sendText`.
///
/// Both fields are required; anything else the peer sends along (it usually
/// sends a full message record) is ignored.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingText {
    /// Destination address.
    pub address: String,
    /// Message text.
    pub body: String,
}

impl fmt::Debug for OutgoingText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutgoingText")
            .field("address", &self.address)
            .field("body", &format!("[{} bytes REDACTED]", self.body.len()))
            .finish()
    }
}
