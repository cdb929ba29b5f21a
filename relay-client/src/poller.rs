//! Change poller.
//!
//! One tick scans both mailboxes for records strictly newer than the cursor
//! and turns each into a `device:newSMS` frame. The tick does not move the
//! cursor: it reports the timestamp it scanned at, and the session advances
//! the cursor only once the frames were handed to the connection.
//!
//! The scan timestamp is read *before* the query, so a record stored while
//! the query runs is picked up by the next tick rather than skipped.

use crate::clock::Clock;
use crate::store::{Mailbox, MessageFilter, MessageStore, StoreError};
use relay_core::PollCursor;
use relay_types::{verb, Frame, MessageRecord, ProtocolError};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Address stamped on the legacy idle placeholder.
pub const PLACEHOLDER_ADDRESS: &str = "+440000000000";

/// Errors that abandon a tick.
#[derive(Debug, Error)]
pub enum PollError {
    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A record could not be encoded.
    #[error("failed to encode record: {0}")]
    Encode(#[from] ProtocolError),
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollBatch {
    /// Wall-clock time (ms) the scan started; the next cursor value.
    pub scanned_at_ms: i64,
    /// One `device:newSMS` frame per new record, inbox first.
    pub frames: Vec<Frame>,
}

/// Scans the message store for records newer than a cursor.
#[derive(Clone)]
pub struct ChangePoller {
    store: Arc<dyn MessageStore>,
    clock: Arc<dyn Clock>,
    legacy_idle_placeholder: bool,
}

impl std::fmt::Debug for ChangePoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangePoller")
            .field("legacy_idle_placeholder", &self.legacy_idle_placeholder)
            .finish_non_exhaustive()
    }
}

impl ChangePoller {
    /// Create a poller over `store`, timestamping scans with `clock`.
    pub fn new(store: Arc<dyn MessageStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            legacy_idle_placeholder: false,
        }
    }

    /// Emit a fixed placeholder record on ticks that find nothing.
    ///
    /// Older companions expect it as an idle heartbeat.
    pub fn with_legacy_idle_placeholder(mut self, enabled: bool) -> Self {
        self.legacy_idle_placeholder = enabled;
        self
    }

    /// Current wall-clock time, used to seed a fresh cursor.
    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Run one scan.
    pub async fn tick(&self, cursor: PollCursor) -> Result<PollBatch, PollError> {
        let scanned_at_ms = self.clock.now_ms();
        let filter = MessageFilter::NewerThan(cursor.value());

        let mut records: Vec<MessageRecord> = Vec::new();
        for mailbox in Mailbox::SCAN_ORDER {
            let found = self.store.query(mailbox, &filter).await?;
            records.extend(
                found
                    .iter()
                    .filter(|m| cursor.is_newer(m.date_ms))
                    .map(|m| m.to_record()),
            );
        }

        if records.is_empty() && self.legacy_idle_placeholder {
            records.push(placeholder(cursor));
        }

        let frames = records
            .iter()
            .map(|record| Frame::json(verb::DEVICE_NEW_SMS, record))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            cursor = cursor.value(),
            scanned_at_ms,
            new = frames.len(),
            "Poll tick"
        );

        Ok(PollBatch {
            scanned_at_ms,
            frames,
        })
    }
}

/// The legacy idle record. Its dates carry the raw cursor value.
fn placeholder(cursor: PollCursor) -> MessageRecord {
    MessageRecord {
        id: 123,
        thread_id: 123,
        address: PLACEHOLDER_ADDRESS.to_string(),
        date: cursor.value(),
        date_sent: cursor.value(),
        read: 0,
        kind: Mailbox::Inbox.kind(),
        body: "TEST NEW".to_string(),
        seen: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::{MemoryMessageStore, StoredMessage};

    fn stored(id: i64, date_ms: i64) -> StoredMessage {
        StoredMessage {
            id,
            thread_id: 1,
            address: "+15550001".into(),
            date_ms,
            date_sent_ms: date_ms,
            read: 0,
            kind: 1,
            body: format!("body {id}"),
            seen: 0,
        }
    }

    fn poller(store: &MemoryMessageStore, clock: &Arc<ManualClock>) -> ChangePoller {
        ChangePoller::new(Arc::new(store.clone()), clock.clone())
    }

    fn ids(batch: &PollBatch) -> Vec<i64> {
        batch
            .frames
            .iter()
            .map(|f| f.decode_payload::<MessageRecord>().unwrap().id)
            .collect()
    }

    #[tokio::test]
    async fn finds_records_newer_than_cursor() {
        let store = MemoryMessageStore::new();
        let clock = Arc::new(ManualClock::new(10_000));
        store.push(Mailbox::Inbox, stored(1, 4_000));
        store.push(Mailbox::Inbox, stored(2, 6_000));
        store.push(Mailbox::Sent, stored(3, 7_000));

        let batch = poller(&store, &clock)
            .tick(PollCursor::new(5_000))
            .await
            .unwrap();

        assert_eq!(ids(&batch), vec![2, 3]);
        assert_eq!(batch.scanned_at_ms, 10_000);
        assert!(batch.frames.iter().all(|f| f.verb == "device:newSMS"));
    }

    #[tokio::test]
    async fn record_at_cursor_is_not_new() {
        let store = MemoryMessageStore::new();
        let clock = Arc::new(ManualClock::new(10_000));
        store.push(Mailbox::Inbox, stored(1, 5_000));

        let batch = poller(&store, &clock)
            .tick(PollCursor::new(5_000))
            .await
            .unwrap();
        assert!(batch.frames.is_empty());
    }

    #[tokio::test]
    async fn advancing_to_scan_time_makes_next_tick_idempotent() {
        let store = MemoryMessageStore::new();
        let clock = Arc::new(ManualClock::new(10_000));
        store.push(Mailbox::Inbox, stored(1, 9_000));
        let poller = poller(&store, &clock);

        let mut cursor = PollCursor::new(5_000);
        let first = poller.tick(cursor).await.unwrap();
        assert_eq!(ids(&first), vec![1]);
        cursor.advance(first.scanned_at_ms);

        clock.advance(5_000);
        let second = poller.tick(cursor).await.unwrap();
        assert!(second.frames.is_empty());
    }

    #[tokio::test]
    async fn store_failure_abandons_tick() {
        let store = MemoryMessageStore::new();
        let clock = Arc::new(ManualClock::new(10_000));
        store.fail_next_query("locked");

        let result = poller(&store, &clock).tick(PollCursor::new(0)).await;
        assert!(matches!(result, Err(PollError::Store(_))));
    }

    #[tokio::test]
    async fn placeholder_only_when_enabled_and_idle() {
        let store = MemoryMessageStore::new();
        let clock = Arc::new(ManualClock::new(10_000));
        let legacy = poller(&store, &clock).with_legacy_idle_placeholder(true);

        let idle = legacy.tick(PollCursor::new(5_000)).await.unwrap();
        assert_eq!(idle.frames.len(), 1);
        let record: MessageRecord = idle.frames[0].decode_payload().unwrap();
        assert_eq!(record.id, 123);
        assert_eq!(record.thread_id, 123);
        assert_eq!(record.body, "TEST NEW");
        assert_eq!(record.date, 5_000);

        store.push(Mailbox::Inbox, stored(1, 6_000));
        let busy = legacy.tick(PollCursor::new(5_000)).await.unwrap();
        assert_eq!(ids(&busy), vec![1]);

        let modern = poller(&MemoryMessageStore::new(), &clock);
        assert!(modern
            .tick(PollCursor::new(5_000))
            .await
            .unwrap()
            .frames
            .is_empty());
    }
}
