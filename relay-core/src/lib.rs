//! # relay-core
//!
//! Pure logic for pocket-relay (no I/O, instant tests).
//!
//! This crate implements the state machines and bookkeeping for the relay
//! without any network, disk or clock access:
//!
//! - [`state`]: session lifecycle `Idle → Connecting → Open → Closed`, with
//!   capped exponential backoff on the `Closed → Connecting` edge
//! - [`cursor`]: the change poller's monotonic scan cursor
//! - [`trust`]: the ordered, idempotent set of trusted peer URIs
//! - [`discovery`]: per-session auto-connect / candidate decisions
//!
//! The actual I/O is performed by `relay-client`, which interprets the
//! actions produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cursor;
pub mod discovery;
pub mod state;
pub mod trust;

pub use cursor::PollCursor;
pub use discovery::{Decision, DiscoverySession};
pub use state::{Action, Event, ReconnectPolicy, SessionEvent, SessionState};
pub use trust::TrustSet;
