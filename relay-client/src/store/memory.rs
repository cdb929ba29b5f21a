//! In-memory collaborators.
//!
//! Shared-state handles (`Clone` shares the data) so a test can keep one copy
//! to seed and inspect while the relay owns another.

use super::{
    ContactStore, Mailbox, MessageFilter, MessageSender, MessageStore, NewMessage, SendError,
    StoreError, StoredContact, StoredMessage,
};
use crate::clock::{Clock, SystemClock};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// In-memory message store.
///
/// Understands selections of the form `<column> <op> <integer>` over the
/// columns `_id`, `thread_id`, `date`, `date_sent`, `read`, `type` and `seen`,
/// with `=`, `!=`, `<`, `<=`, `>`, `>=`. Dates compare in milliseconds.
#[derive(Clone)]
pub struct MemoryMessageStore {
    inner: Arc<Mutex<MessageStoreInner>>,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Default)]
struct MessageStoreInner {
    inbox: Vec<StoredMessage>,
    sent: Vec<StoredMessage>,
    next_id: i64,
    queries: usize,
    fail_next_query: Option<String>,
    fail_next_insert: Option<String>,
}

impl MessageStoreInner {
    fn mailbox_mut(&mut self, mailbox: Mailbox) -> &mut Vec<StoredMessage> {
        match mailbox {
            Mailbox::Inbox => &mut self.inbox,
            Mailbox::Sent => &mut self.sent,
        }
    }

    fn mailbox(&self, mailbox: Mailbox) -> &[StoredMessage] {
        match mailbox {
            Mailbox::Inbox => &self.inbox,
            Mailbox::Sent => &self.sent,
        }
    }
}

impl std::fmt::Debug for MemoryMessageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryMessageStore").finish_non_exhaustive()
    }
}

impl Default for MemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMessageStore {
    /// Create an empty store stamping inserts with the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store stamping inserts with `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MessageStoreInner {
                next_id: 1,
                ..Default::default()
            })),
            clock,
        }
    }

    /// Add an existing message to a mailbox.
    pub fn push(&self, mailbox: Mailbox, message: StoredMessage) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.next_id = inner.next_id.max(message.id + 1);
        inner.mailbox_mut(mailbox).push(message);
    }

    /// Snapshot of a mailbox.
    pub fn messages(&self, mailbox: Mailbox) -> Vec<StoredMessage> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.mailbox(mailbox).to_vec()
    }

    /// Number of queries served (failed ones included).
    pub fn query_count(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.queries
    }

    /// Cause the next query to fail with the given error.
    pub fn fail_next_query(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.fail_next_query = Some(error.to_string());
    }

    /// Cause the next insert to fail with the given error.
    pub fn fail_next_insert(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.fail_next_insert = Some(error.to_string());
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn query(
        &self,
        mailbox: Mailbox,
        filter: &MessageFilter,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.queries += 1;

        if let Some(error) = inner.fail_next_query.take() {
            return Err(StoreError::Unavailable(error));
        }

        let messages = inner.mailbox(mailbox);
        match filter {
            MessageFilter::All => Ok(messages.to_vec()),
            MessageFilter::NewerThan(ms) => Ok(messages
                .iter()
                .filter(|m| m.date_ms > *ms)
                .cloned()
                .collect()),
            MessageFilter::Selection(expr) => {
                let selection = Selection::parse(expr)?;
                Ok(messages
                    .iter()
                    .filter(|m| selection.matches(m))
                    .cloned()
                    .collect())
            }
        }
    }

    async fn insert(&self, mailbox: Mailbox, message: NewMessage) -> Result<(), StoreError> {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(error) = inner.fail_next_insert.take() {
            return Err(StoreError::Rejected(error));
        }

        let id = inner.next_id;
        inner.next_id += 1;
        inner.mailbox_mut(mailbox).push(StoredMessage {
            id,
            thread_id: 0,
            address: message.address,
            date_ms: now,
            date_sent_ms: now,
            read: 1,
            kind: mailbox.kind(),
            body: message.body,
            seen: 1,
        });
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Id,
    ThreadId,
    Date,
    DateSent,
    Read,
    Kind,
    Seen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Selection {
    column: Column,
    op: Op,
    value: i64,
}

impl Selection {
    fn parse(expr: &str) -> Result<Self, StoreError> {
        let unsupported = || StoreError::UnsupportedFilter(expr.to_string());

        let mut parts = expr.split_whitespace();
        let (Some(column), Some(op), Some(value), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(unsupported());
        };

        let column = match column {
            "_id" => Column::Id,
            "thread_id" => Column::ThreadId,
            "date" => Column::Date,
            "date_sent" => Column::DateSent,
            "read" => Column::Read,
            "type" => Column::Kind,
            "seen" => Column::Seen,
            _ => return Err(unsupported()),
        };
        let op = match op {
            "=" | "==" => Op::Eq,
            "!=" | "<>" => Op::Ne,
            "<" => Op::Lt,
            "<=" => Op::Le,
            ">" => Op::Gt,
            ">=" => Op::Ge,
            _ => return Err(unsupported()),
        };
        let value = value.parse::<i64>().map_err(|_| unsupported())?;

        Ok(Self { column, op, value })
    }

    fn matches(&self, message: &StoredMessage) -> bool {
        let actual = match self.column {
            Column::Id => message.id,
            Column::ThreadId => message.thread_id,
            Column::Date => message.date_ms,
            Column::DateSent => message.date_sent_ms,
            Column::Read => i64::from(message.read),
            Column::Kind => i64::from(message.kind),
            Column::Seen => i64::from(message.seen),
        };
        match self.op {
            Op::Eq => actual == self.value,
            Op::Ne => actual != self.value,
            Op::Lt => actual < self.value,
            Op::Le => actual <= self.value,
            Op::Gt => actual > self.value,
            Op::Ge => actual >= self.value,
        }
    }
}

/// In-memory contact store.
#[derive(Debug, Clone, Default)]
pub struct MemoryContactStore {
    inner: Arc<Mutex<ContactStoreInner>>,
}

#[derive(Debug, Default)]
struct ContactStoreInner {
    contacts: Vec<StoredContact>,
    fail_next_query: Option<String>,
}

impl MemoryContactStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a contact.
    pub fn push(&self, contact: StoredContact) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.contacts.push(contact);
    }

    /// Cause the next query to fail with the given error.
    pub fn fail_next_query(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.fail_next_query = Some(error.to_string());
    }
}

#[async_trait]
impl ContactStore for MemoryContactStore {
    async fn contacts(&self) -> Result<Vec<StoredContact>, StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(error) = inner.fail_next_query.take() {
            return Err(StoreError::Unavailable(error));
        }
        Ok(inner.contacts.clone())
    }
}

/// Sender that records what it was asked to send instead of sending it.
#[derive(Debug, Clone, Default)]
pub struct RecordingSender {
    inner: Arc<Mutex<SenderInner>>,
}

#[derive(Debug, Default)]
struct SenderInner {
    sent: Vec<(String, String)>,
    fail_next_send: Option<String>,
}

impl RecordingSender {
    /// Create a sender with nothing recorded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(address, body)` successfully sent, in order.
    pub fn sent(&self) -> Vec<(String, String)> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.sent.clone()
    }

    /// Cause the next send to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.fail_next_send = Some(error.to_string());
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send_text(&self, address: &str, body: &str) -> Result<(), SendError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(error) = inner.fail_next_send.take() {
            return Err(SendError::Rejected(error));
        }
        inner.sent.push((address.to_string(), body.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn message(id: i64, date_ms: i64) -> StoredMessage {
        StoredMessage {
            id,
            thread_id: 1,
            address: "+15550001".into(),
            date_ms,
            date_sent_ms: date_ms,
            read: 0,
            kind: 1,
            body: format!("message {id}"),
            seen: 0,
        }
    }

    #[tokio::test]
    async fn newer_than_is_strict() {
        let store = MemoryMessageStore::new();
        store.push(Mailbox::Inbox, message(1, 1_000));
        store.push(Mailbox::Inbox, message(2, 2_000));

        let found = store
            .query(Mailbox::Inbox, &MessageFilter::NewerThan(1_000))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, 2);
    }

    #[tokio::test]
    async fn poisoned_lock_keeps_serving() {
        let store = MemoryMessageStore::new();
        store.push(Mailbox::Inbox, message(1, 1_000));

        let shared = store.clone();
        let crashed = std::thread::spawn(move || {
            let _guard = shared.inner.lock().unwrap();
            panic!("writer crashed");
        })
        .join();
        assert!(crashed.is_err());

        store.push(Mailbox::Inbox, message(2, 2_000));
        let found = store.query(Mailbox::Inbox, &MessageFilter::All).await.unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn mailboxes_are_separate() {
        let store = MemoryMessageStore::new();
        store.push(Mailbox::Inbox, message(1, 1_000));

        let sent = store.query(Mailbox::Sent, &MessageFilter::All).await.unwrap();
        assert!(sent.is_empty());
    }

    #[tokio::test]
    async fn selection_filters() {
        let store = MemoryMessageStore::new();
        for id in 1..=5 {
            store.push(Mailbox::Inbox, message(id, id * 1_000));
        }

        let q = |expr: &str| {
            let store = store.clone();
            let filter = MessageFilter::Selection(expr.to_string());
            async move { store.query(Mailbox::Inbox, &filter).await }
        };

        assert_eq!(q("_id > 3").await.unwrap().len(), 2);
        assert_eq!(q("_id = 2").await.unwrap().len(), 1);
        assert_eq!(q("date <= 2000").await.unwrap().len(), 2);
        assert_eq!(q("read != 0").await.unwrap().len(), 0);
        assert_eq!(q("type >= 1").await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn unsupported_selection_is_rejected() {
        let store = MemoryMessageStore::new();
        for expr in ["body LIKE '%x%'", "_id >", "unknown = 1", "_id = abc", "_id ~ 1"] {
            let result = store
                .query(Mailbox::Inbox, &MessageFilter::Selection(expr.into()))
                .await;
            assert!(
                matches!(result, Err(StoreError::UnsupportedFilter(_))),
                "{expr} should be unsupported"
            );
        }
    }

    #[tokio::test]
    async fn insert_stamps_with_clock_and_assigns_ids() {
        let clock = Arc::new(ManualClock::new(42_000));
        let store = MemoryMessageStore::with_clock(clock);
        store.push(Mailbox::Inbox, message(10, 1_000));

        store
            .insert(
                Mailbox::Sent,
                NewMessage {
                    address: "+15550002".into(),
                    body: "hello".into(),
                },
            )
            .await
            .unwrap();

        let sent = store.messages(Mailbox::Sent);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id, 11);
        assert_eq!(sent[0].date_ms, 42_000);
        assert_eq!(sent[0].kind, 2);
    }

    #[tokio::test]
    async fn fail_next_query_applies_once() {
        let store = MemoryMessageStore::new();
        store.fail_next_query("disk gone");

        assert!(store.query(Mailbox::Inbox, &MessageFilter::All).await.is_err());
        assert!(store.query(Mailbox::Inbox, &MessageFilter::All).await.is_ok());
        assert_eq!(store.query_count(), 2);
    }

    #[tokio::test]
    async fn recording_sender_records_and_fails_on_demand() {
        let sender = RecordingSender::new();
        sender.fail_next_send("no service");

        assert!(sender.send_text("+1", "a").await.is_err());
        sender.send_text("+1", "b").await.unwrap();

        assert_eq!(sender.sent(), vec![("+1".to_string(), "b".to_string())]);
    }

    #[tokio::test]
    async fn contact_store_returns_all() {
        let contacts = MemoryContactStore::new();
        contacts.push(StoredContact {
            id: 1,
            name: "Ada".into(),
            number: "+1".into(),
            has_phone_number: true,
        });

        assert_eq!(contacts.contacts().await.unwrap().len(), 1);
    }
}
