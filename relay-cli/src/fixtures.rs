//! Fixture files: canned messages and contacts for the in-memory stores.
//!
//! ```json
//! {
//!   "inbox":    [{"id": 1, "threadId": 1, "address": "+15550001",
//!                 "date": 1700000000000, "body": "hello"}],
//!   "sent":     [],
//!   "contacts": [{"id": 1, "name": "Ada", "number": "+15550001"}]
//! }
//! ```
//!
//! Dates are milliseconds since the epoch.

use anyhow::{Context, Result};
use relay_client::{Mailbox, MemoryContactStore, MemoryMessageStore, StoredContact, StoredMessage};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Fixtures {
    pub inbox: Vec<FixtureMessage>,
    pub sent: Vec<FixtureMessage>,
    pub contacts: Vec<FixtureContact>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FixtureMessage {
    pub id: i64,
    pub thread_id: i64,
    pub address: String,
    pub date: i64,
    pub date_sent: Option<i64>,
    pub read: i32,
    pub body: String,
    pub seen: i32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FixtureContact {
    pub id: i64,
    pub name: String,
    pub number: String,
}

impl Fixtures {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixtures {}", path.display()))?;
        serde_json::from_str(&contents).context("Invalid fixtures file")
    }

    /// Seed `messages` and `contacts` with this fixture set.
    pub fn populate(self, messages: &MemoryMessageStore, contacts: &MemoryContactStore) {
        for (mailbox, list) in [(Mailbox::Inbox, self.inbox), (Mailbox::Sent, self.sent)] {
            for m in list {
                messages.push(
                    mailbox,
                    StoredMessage {
                        id: m.id,
                        thread_id: m.thread_id,
                        address: m.address,
                        date_ms: m.date,
                        date_sent_ms: m.date_sent.unwrap_or(m.date),
                        read: m.read,
                        kind: mailbox.kind(),
                        body: m.body,
                        seen: m.seen,
                    },
                );
            }
        }

        for c in self.contacts {
            contacts.push(StoredContact {
                id: c.id,
                has_phone_number: !c.number.is_empty(),
                name: c.name,
                number: c.number,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_client::{ContactStore, MessageFilter, MessageStore};
    use tempfile::tempdir;

    const SAMPLE: &str = r#"{
        "inbox": [
            {"id": 1, "threadId": 3, "address": "+15550001", "date": 1700000000000, "body": "hi"}
        ],
        "sent": [
            {"id": 2, "threadId": 3, "address": "+15550001", "date": 1700000005000,
             "dateSent": 1700000004000, "read": 1, "body": "hey", "seen": 1}
        ],
        "contacts": [
            {"id": 7, "name": "Ada", "number": "+15550001"},
            {"id": 8, "name": "Nobody"}
        ]
    }"#;

    #[tokio::test]
    async fn populates_stores() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fixtures.json");
        std::fs::write(&path, SAMPLE).unwrap();

        let messages = MemoryMessageStore::new();
        let contacts = MemoryContactStore::new();
        Fixtures::load(&path).unwrap().populate(&messages, &contacts);

        let inbox = messages.query(Mailbox::Inbox, &MessageFilter::All).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, 1);
        assert_eq!(inbox[0].date_sent_ms, 1_700_000_000_000);

        let sent = messages.query(Mailbox::Sent, &MessageFilter::All).await.unwrap();
        assert_eq!(sent[0].kind, 2);
        assert_eq!(sent[0].date_sent_ms, 1_700_000_004_000);

        let all = contacts.contacts().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].has_phone_number);
        assert!(!all[1].has_phone_number);
    }

    #[test]
    fn empty_object_is_empty_fixtures() {
        let fixtures: Fixtures = serde_json::from_str("{}").unwrap();
        assert!(fixtures.inbox.is_empty() && fixtures.contacts.is_empty());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(Fixtures::load(&dir.path().join("none.json")).is_err());
    }
}
