//! # relay-client
//!
//! Session and protocol engine for pocket-relay.
//!
//! Pairs the device with a trusted companion on the local network and relays
//! commands and new messages over a persistent WebSocket.
//!
//! ## Components
//!
//! - **Discovery**: browses `_relay._tcp.local.`, auto-connects to trusted
//!   peers, lists the rest as candidates ([`DiscoveryManager`])
//! - **Session**: owns the single live connection, reconnects with backoff
//!   ([`SessionHandle`])
//! - **Dispatcher**: `client:*` verb → handler registry ([`Dispatcher`])
//! - **Change poller**: pushes `device:newSMS` for records newer than the
//!   cursor ([`ChangePoller`])
//! - **Trust store**: persisted trusted URIs ([`FileTrustStore`])
//!
//! ## Example
//!
//! ```ignore
//! use relay_client::*;
//!
//! let session = SessionHandle::spawn(
//!     WebSocketTransport::default(),
//!     Dispatcher::with_defaults(messages.clone(), contacts, sender),
//!     ChangePoller::new(messages, Arc::new(SystemClock)),
//!     SessionConfig::default(),
//! );
//! let discovery = DiscoveryManager::new(Arc::new(MdnsBrowser), trust.clone(), SERVICE_TYPE);
//! let relay = RelayService::new(discovery, session, trust);
//! relay.start()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod config;
pub mod discovery;
pub mod dispatcher;
pub mod poller;
pub mod service;
pub mod session;
pub mod store;
pub mod transport;
pub mod trust_store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, RelayConfig};
pub use discovery::{
    BrowseLease, Browse, DiscoveryError, DiscoveryEvent, DiscoveryManager, MdnsBrowser,
    MockBrowser, ResolvedService, ServiceBrowser, SERVICE_TYPE,
};
pub use dispatcher::{CommandError, CommandHandler, DispatchError, Dispatcher};
pub use poller::{ChangePoller, PollBatch, PollError};
pub use service::RelayService;
pub use session::{SessionConfig, SessionError, SessionHandle, SessionStatus};
pub use store::{
    ContactStore, Mailbox, MemoryContactStore, MemoryMessageStore, MessageFilter, MessageSender,
    MessageStore, NewMessage, RecordingSender, SendError, StoreError, StoredContact,
    StoredMessage,
};
pub use transport::{
    Connection, FrameReader, FrameWriter, MockTransport, Transport, TransportError,
    WebSocketTransport,
};
pub use trust_store::{FileTrustStore, MemoryTrustStore, TrustStore};
