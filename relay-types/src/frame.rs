//! Frame - one protocol message unit.
//!
//! Wire form is `verb` optionally followed by a single space and an opaque
//! payload. Verb and payload are split on the *first* space only, so payloads
//! (usually JSON) may contain spaces themselves.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

use crate::ProtocolError;

/// A decoded protocol frame.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    /// Namespaced verb, e.g. `client:listSMS`.
    pub verb: String,
    /// Everything after the first space, if there was one.
    pub payload: Option<String>,
}

impl Frame {
    /// Create a frame without payload.
    pub fn bare(verb: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            payload: None,
        }
    }

    /// Create a frame with a raw text payload.
    pub fn new(verb: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            payload: Some(payload.into()),
        }
    }

    /// Create a frame whose payload is the JSON encoding of `value`.
    pub fn json<T: Serialize + ?Sized>(
        verb: impl Into<String>,
        value: &T,
    ) -> Result<Self, ProtocolError> {
        Ok(Self::new(verb, serde_json::to_string(value)?))
    }

    /// Parse a text frame received from the wire.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        if text.is_empty() {
            return Err(ProtocolError::EmptyFrame);
        }

        match text.split_once(' ') {
            Some(("", _)) => Err(ProtocolError::EmptyVerb),
            Some((verb, payload)) => Ok(Self::new(verb, payload)),
            None => Ok(Self::bare(text)),
        }
    }

    /// Encode to wire text.
    pub fn encode(&self) -> String {
        match &self.payload {
            Some(payload) => format!("{} {}", self.verb, payload),
            None => self.verb.clone(),
        }
    }

    /// Decode the payload as JSON.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        let payload = self
            .payload
            .as_deref()
            .ok_or_else(|| ProtocolError::MissingPayload {
                verb: self.verb.clone(),
            })?;
        Ok(serde_json::from_str(payload)?)
    }
}

// Payloads carry message bodies; keep them out of logs.
impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("verb", &self.verb)
            .field(
                "payload",
                &self
                    .payload
                    .as_ref()
                    .map(|p| format!("[{} bytes REDACTED]", p.len())),
            )
            .finish()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verb;

    #[test]
    fn parse_verb_only() {
        let frame = Frame::parse("client:listContacts").unwrap();
        assert_eq!(frame.verb, verb::CLIENT_LIST_CONTACTS);
        assert!(frame.payload.is_none());
    }

    #[test]
    fn parse_splits_on_first_space_only() {
        let frame = Frame::parse(r#"client:sendText {"address":"+1","body":"hello there world"}"#)
            .unwrap();
        assert_eq!(frame.verb, verb::CLIENT_SEND_TEXT);
        assert_eq!(
            frame.payload.as_deref(),
            Some(r#"{"address":"+1","body":"hello there world"}"#)
        );
    }

    #[test]
    fn trailing_space_yields_empty_payload() {
        let frame = Frame::parse("client:listSMS ").unwrap();
        assert_eq!(frame.payload.as_deref(), Some(""));
    }

    #[test]
    fn unknown_verb_still_parses() {
        // Whether `bogus` means anything is the dispatcher's business.
        let frame = Frame::parse("bogus").unwrap();
        assert_eq!(frame.verb, "bogus");
    }

    #[test]
    fn empty_and_verbless_frames_are_rejected() {
        assert!(matches!(Frame::parse(""), Err(ProtocolError::EmptyFrame)));
        assert!(matches!(
            Frame::parse(" {\"a\":1}"),
            Err(ProtocolError::EmptyVerb)
        ));
    }

    #[test]
    fn encode_matches_wire_form() {
        assert_eq!(Frame::bare("device:ping").encode(), "device:ping");
        assert_eq!(
            Frame::new(verb::DEVICE_LIST_SMS, "[]").encode(),
            "device:listSMS []"
        );
    }

    #[test]
    fn json_payload_roundtrip() {
        let frame = Frame::json(verb::DEVICE_LIST_CONTACTS, &vec!["a b", "c"]).unwrap();
        let parsed = Frame::parse(&frame.encode()).unwrap();
        let decoded: Vec<String> = parsed.decode_payload().unwrap();
        assert_eq!(decoded, vec!["a b".to_string(), "c".to_string()]);
    }

    #[test]
    fn decode_without_payload_reports_verb() {
        let frame = Frame::bare(verb::CLIENT_SEND_TEXT);
        let err = frame.decode_payload::<serde_json::Value>().unwrap_err();
        assert!(matches!(err, ProtocolError::MissingPayload { verb } if verb == "client:sendText"));
    }

    #[test]
    fn debug_redacts_payload() {
        let frame = Frame::new(verb::DEVICE_NEW_SMS, r#"{"body":"secret"}"#);
        let debug = format!("{:?}", frame);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("secret"));
    }
}
