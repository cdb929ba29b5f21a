//! # relay-types
//!
//! Wire format types for the pocket-relay protocol.
//!
//! This crate provides the foundational types used across all pocket-relay crates:
//! - [`Endpoint`], [`PeerUri`] - Discovered peers and their canonical identity
//! - [`Frame`] - One protocol message unit, `verb[ payload]`
//! - [`MessageRecord`], [`ContactRecord`] - JSON payload records
//! - [`ProtocolError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod endpoint;
mod error;
mod frame;
mod records;

pub mod verb;

pub use endpoint::{Endpoint, PeerUri, URI_SCHEME};
pub use error::ProtocolError;
pub use frame::Frame;
pub use records::{ContactRecord, MessageRecord, OutgoingText};
