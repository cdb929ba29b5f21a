//! Inbound command dispatch.
//!
//! A registry from verb to [`CommandHandler`]. Each handler gets the frame's
//! raw payload and returns the frames to send back (possibly none). The
//! registry is fixed once the session starts; lookups take `&self`.
//!
//! Built-in handlers:
//!
//! | verb                  | reply                          |
//! |-----------------------|--------------------------------|
//! | `client:listSMS`      | `device:listSMS [records]`     |
//! | `client:listContacts` | `device:listContacts [records]`|
//! | `client:sendText`     | none                           |

use crate::store::{
    ContactStore, Mailbox, MessageFilter, MessageSender, MessageStore, NewMessage, SendError,
    StoreError,
};
use async_trait::async_trait;
use relay_types::verb;
use relay_types::{ContactRecord, Frame, MessageRecord, OutgoingText, ProtocolError};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised by a command handler.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The payload could not be decoded.
    #[error("invalid payload: {0}")]
    Decode(#[source] ProtocolError),

    /// The reply could not be encoded.
    #[error("failed to encode reply: {0}")]
    Encode(#[source] ProtocolError),

    /// The command needs a payload and none was given.
    #[error("missing payload")]
    MissingPayload,

    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Sending the text failed.
    #[error(transparent)]
    Send(#[from] SendError),
}

/// Errors raised by [`Dispatcher::dispatch`].
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No handler is registered for the verb.
    #[error("unknown verb: {0}")]
    UnknownVerb(String),

    /// The handler failed.
    #[error("{verb} failed: {source}")]
    Command {
        /// Verb of the failed command.
        verb: String,
        /// The handler's error.
        #[source]
        source: CommandError,
    },
}

/// Handles one inbound verb.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Run the command and produce the reply frames.
    async fn handle(&self, payload: Option<&str>) -> Result<Vec<Frame>, CommandError>;
}

/// Verb → handler registry.
#[derive(Clone, Default)]
pub struct Dispatcher {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut verbs: Vec<_> = self.verbs().collect();
        verbs.sort_unstable();
        f.debug_struct("Dispatcher").field("verbs", &verbs).finish()
    }
}

impl Dispatcher {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the three built-in commands wired to the given stores.
    pub fn with_defaults(
        messages: Arc<dyn MessageStore>,
        contacts: Arc<dyn ContactStore>,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        let mut dispatcher = Self::new();
        dispatcher
            .register(
                verb::CLIENT_LIST_SMS,
                ListSms {
                    messages: Arc::clone(&messages),
                },
            )
            .register(verb::CLIENT_LIST_CONTACTS, ListContacts { contacts })
            .register(verb::CLIENT_SEND_TEXT, SendText { sender, messages });
        dispatcher
    }

    /// Register `handler` for `verb`, replacing any existing one.
    pub fn register(
        &mut self,
        verb: impl Into<String>,
        handler: impl CommandHandler + 'static,
    ) -> &mut Self {
        self.handlers.insert(verb.into(), Arc::new(handler));
        self
    }

    /// Whether a handler is registered for `verb`.
    pub fn handles(&self, verb: &str) -> bool {
        self.handlers.contains_key(verb)
    }

    /// Registered verbs, in no particular order.
    pub fn verbs(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Route a frame to its handler.
    pub async fn dispatch(&self, frame: &Frame) -> Result<Vec<Frame>, DispatchError> {
        let handler = self
            .handlers
            .get(&frame.verb)
            .ok_or_else(|| DispatchError::UnknownVerb(frame.verb.clone()))?;

        debug!(verb = %frame.verb, "Dispatching command");
        handler
            .handle(frame.payload.as_deref())
            .await
            .map_err(|source| DispatchError::Command {
                verb: frame.verb.clone(),
                source,
            })
    }
}

/// `client:listSMS [selection]`: inbox then sent, one reply frame.
struct ListSms {
    messages: Arc<dyn MessageStore>,
}

#[async_trait]
impl CommandHandler for ListSms {
    async fn handle(&self, payload: Option<&str>) -> Result<Vec<Frame>, CommandError> {
        let filter = match payload.map(str::trim) {
            None | Some("") => MessageFilter::All,
            Some(selection) => MessageFilter::Selection(selection.to_string()),
        };

        let mut records: Vec<MessageRecord> = Vec::new();
        for mailbox in Mailbox::SCAN_ORDER {
            let found = self.messages.query(mailbox, &filter).await?;
            records.extend(found.iter().map(|m| m.to_record()));
        }

        if records.is_empty() {
            return Ok(Vec::new());
        }

        let frame = Frame::json(verb::DEVICE_LIST_SMS, &records).map_err(CommandError::Encode)?;
        Ok(vec![frame])
    }
}

/// `client:listContacts`: contacts that have a phone number.
struct ListContacts {
    contacts: Arc<dyn ContactStore>,
}

#[async_trait]
impl CommandHandler for ListContacts {
    async fn handle(&self, _payload: Option<&str>) -> Result<Vec<Frame>, CommandError> {
        let records: Vec<ContactRecord> = self
            .contacts
            .contacts()
            .await?
            .into_iter()
            .filter(|c| c.has_phone_number)
            .map(|c| ContactRecord {
                id: c.id,
                name: c.name,
                number: c.number,
            })
            .collect();

        // Always answered, even with an empty list.
        let frame =
            Frame::json(verb::DEVICE_LIST_CONTACTS, &records).map_err(CommandError::Encode)?;
        Ok(vec![frame])
    }
}

/// `client:sendText {"address":..,"body":..}`: send, then record in Sent.
struct SendText {
    sender: Arc<dyn MessageSender>,
    messages: Arc<dyn MessageStore>,
}

#[async_trait]
impl CommandHandler for SendText {
    async fn handle(&self, payload: Option<&str>) -> Result<Vec<Frame>, CommandError> {
        let payload = payload.ok_or(CommandError::MissingPayload)?;
        let text: OutgoingText = serde_json::from_str(payload)
            .map_err(|e| CommandError::Decode(ProtocolError::Json(e)))?;

        self.sender.send_text(&text.address, &text.body).await?;
        info!(address = %text.address, "Sent text");

        // Only what actually went out lands in Sent.
        self.messages
            .insert(
                Mailbox::Sent,
                NewMessage {
                    address: text.address,
                    body: text.body,
                },
            )
            .await?;

        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{
        MemoryContactStore, MemoryMessageStore, RecordingSender, StoredContact, StoredMessage,
    };

    struct Fixture {
        messages: MemoryMessageStore,
        contacts: MemoryContactStore,
        sender: RecordingSender,
        dispatcher: Dispatcher,
    }

    fn fixture() -> Fixture {
        let messages = MemoryMessageStore::new();
        let contacts = MemoryContactStore::new();
        let sender = RecordingSender::new();
        let dispatcher = Dispatcher::with_defaults(
            Arc::new(messages.clone()),
            Arc::new(contacts.clone()),
            Arc::new(sender.clone()),
        );
        Fixture {
            messages,
            contacts,
            sender,
            dispatcher,
        }
    }

    fn stored(id: i64, kind: i32, date_ms: i64) -> StoredMessage {
        StoredMessage {
            id,
            thread_id: 9,
            address: "+15550001".into(),
            date_ms,
            date_sent_ms: date_ms,
            read: 1,
            kind,
            body: format!("body {id}"),
            seen: 1,
        }
    }

    #[test]
    fn defaults_register_three_verbs() {
        let f = fixture();
        assert!(f.dispatcher.handles("client:listSMS"));
        assert!(f.dispatcher.handles("client:listContacts"));
        assert!(f.dispatcher.handles("client:sendText"));
        assert_eq!(f.dispatcher.verbs().count(), 3);
    }

    #[tokio::test]
    async fn list_sms_returns_inbox_then_sent() {
        let f = fixture();
        f.messages.push(Mailbox::Sent, stored(2, 2, 2_000));
        f.messages.push(Mailbox::Inbox, stored(1, 1, 5_000));

        let replies = f
            .dispatcher
            .dispatch(&Frame::bare("client:listSMS"))
            .await
            .unwrap();

        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].verb, "device:listSMS");
        let records: Vec<MessageRecord> = replies[0].decode_payload().unwrap();
        assert_eq!(records.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(records[0].date, 5);
    }

    #[tokio::test]
    async fn list_sms_with_no_records_sends_nothing() {
        let f = fixture();
        let replies = f
            .dispatcher
            .dispatch(&Frame::bare("client:listSMS"))
            .await
            .unwrap();
        assert!(replies.is_empty());
    }

    #[tokio::test]
    async fn list_sms_passes_selection_through() {
        let f = fixture();
        f.messages.push(Mailbox::Inbox, stored(1, 1, 1_000));
        f.messages.push(Mailbox::Inbox, stored(2, 1, 2_000));

        let replies = f
            .dispatcher
            .dispatch(&Frame::new("client:listSMS", "_id > 1"))
            .await
            .unwrap();
        let records: Vec<MessageRecord> = replies[0].decode_payload().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, 2);
    }

    #[tokio::test]
    async fn list_sms_unsupported_selection_is_store_error() {
        let f = fixture();
        let result = f
            .dispatcher
            .dispatch(&Frame::new("client:listSMS", "body LIKE x"))
            .await;
        assert!(matches!(
            result,
            Err(DispatchError::Command {
                source: CommandError::Store(StoreError::UnsupportedFilter(_)),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn list_contacts_skips_contacts_without_numbers() {
        let f = fixture();
        f.contacts.push(StoredContact {
            id: 1,
            name: "Ada".into(),
            number: "+1".into(),
            has_phone_number: true,
        });
        f.contacts.push(StoredContact {
            id: 2,
            name: "No Phone".into(),
            number: String::new(),
            has_phone_number: false,
        });

        let replies = f
            .dispatcher
            .dispatch(&Frame::bare("client:listContacts"))
            .await
            .unwrap();
        let records: Vec<ContactRecord> = replies[0].decode_payload().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Ada");
    }

    #[tokio::test]
    async fn list_contacts_without_numbers_replies_empty_array() {
        let f = fixture();
        f.contacts.push(StoredContact {
            id: 3,
            name: "Landline Only".into(),
            number: String::new(),
            has_phone_number: false,
        });

        let replies = f
            .dispatcher
            .dispatch(&Frame::bare("client:listContacts"))
            .await
            .unwrap();

        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].encode(), "device:listContacts []");
    }

    #[tokio::test]
    async fn send_text_sends_then_records() {
        let f = fixture();
        let frame = Frame::new("client:sendText", r#"{"address":"+15550002","body":"hi"}"#);

        let replies = f.dispatcher.dispatch(&frame).await.unwrap();

        assert!(replies.is_empty());
        assert_eq!(
            f.sender.sent(),
            vec![("+15550002".to_string(), "hi".to_string())]
        );
        let sent = f.messages.messages(Mailbox::Sent);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].body, "hi");
    }

    #[tokio::test]
    async fn send_text_failure_records_nothing() {
        let f = fixture();
        f.sender.fail_next_send("no service");
        let frame = Frame::new("client:sendText", r#"{"address":"+1","body":"hi"}"#);

        let result = f.dispatcher.dispatch(&frame).await;

        assert!(matches!(
            result,
            Err(DispatchError::Command {
                source: CommandError::Send(_),
                ..
            })
        ));
        assert!(f.messages.messages(Mailbox::Sent).is_empty());
    }

    #[tokio::test]
    async fn send_text_errors_are_distinct() {
        let f = fixture();

        let missing = f.dispatcher.dispatch(&Frame::bare("client:sendText")).await;
        assert!(matches!(
            missing,
            Err(DispatchError::Command {
                source: CommandError::MissingPayload,
                ..
            })
        ));

        let garbage = f
            .dispatcher
            .dispatch(&Frame::new("client:sendText", "{not json"))
            .await;
        assert!(matches!(
            garbage,
            Err(DispatchError::Command {
                source: CommandError::Decode(_),
                ..
            })
        ));

        let incomplete = f
            .dispatcher
            .dispatch(&Frame::new("client:sendText", r#"{"address":"+1"}"#))
            .await;
        assert!(matches!(
            incomplete,
            Err(DispatchError::Command {
                source: CommandError::Decode(_),
                ..
            })
        ));
        assert!(f.sender.sent().is_empty());
    }

    #[tokio::test]
    async fn unknown_verb() {
        let f = fixture();
        let result = f.dispatcher.dispatch(&Frame::bare("bogus")).await;
        assert!(matches!(result, Err(DispatchError::UnknownVerb(v)) if v == "bogus"));
    }

    #[tokio::test]
    async fn register_replaces_handler() {
        struct Pong;

        #[async_trait]
        impl CommandHandler for Pong {
            async fn handle(&self, _payload: Option<&str>) -> Result<Vec<Frame>, CommandError> {
                Ok(vec![Frame::bare("device:pong")])
            }
        }

        let mut f = fixture();
        f.dispatcher.register("client:listSMS", Pong);

        let replies = f
            .dispatcher
            .dispatch(&Frame::bare("client:listSMS"))
            .await
            .unwrap();
        assert_eq!(replies, vec![Frame::bare("device:pong")]);
        assert_eq!(f.dispatcher.verbs().count(), 3);
    }
}
