//! Protocol verbs.
//!
//! Peer-originated commands use the `client:` namespace; everything the
//! device emits uses `device:`.

/// Request the message list, optionally filtered by a selection payload.
pub const CLIENT_LIST_SMS: &str = "client:listSMS";
/// Request contacts that have at least one phone number.
pub const CLIENT_LIST_CONTACTS: &str = "client:listContacts";
/// Send a text message; payload is `{"address": .., "body": ..}`.
pub const CLIENT_SEND_TEXT: &str = "client:sendText";

/// Response to [`CLIENT_LIST_SMS`], payload is a JSON array of messages.
pub const DEVICE_LIST_SMS: &str = "device:listSMS";
/// Response to [`CLIENT_LIST_CONTACTS`], payload is a JSON array of contacts.
pub const DEVICE_LIST_CONTACTS: &str = "device:listContacts";
/// Pushed by the change poller, payload is a single JSON message.
pub const DEVICE_NEW_SMS: &str = "device:newSMS";
