//! Error types for pocket-relay wire handling.

use thiserror::Error;

/// Errors that can occur while encoding or decoding protocol frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame text was empty.
    #[error("empty frame")]
    EmptyFrame,

    /// The frame has no resolvable verb (leading space).
    #[error("frame has no verb")]
    EmptyVerb,

    /// A command that needs a payload arrived without one.
    #[error("missing payload for {verb}")]
    MissingPayload {
        /// Verb of the offending frame.
        verb: String,
    },

    /// JSON payload could not be encoded or decoded.
    #[error("json payload: {0}")]
    Json(#[from] serde_json::Error),

    /// A peer URI is not of the form `ws://host:port`.
    #[error("invalid peer uri: {0}")]
    InvalidUri(String),
}
