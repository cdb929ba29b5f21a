//! Discovered peers and their canonical identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv6Addr;

use crate::ProtocolError;

/// Scheme of every peer URI (the companion speaks WebSocket).
pub const URI_SCHEME: &str = "ws";

/// A resolved companion endpoint on the local network.
///
/// Endpoints are created per discovery event and never persisted; only
/// their [`PeerUri`] survives, in the trust set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// Human-readable service instance name.
    pub name: String,
    /// Routable address (IPv4 or IPv6 literal, or hostname).
    pub address: String,
    /// Service port.
    pub port: u16,
}

impl Endpoint {
    /// Create a new endpoint.
    pub fn new(name: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            port,
        }
    }

    /// Canonical `ws://address:port` identity of this endpoint.
    pub fn uri(&self) -> PeerUri {
        let host = if self.address.parse::<Ipv6Addr>().is_ok() {
            format!("[{}]", self.address)
        } else {
            self.address.clone()
        };
        PeerUri(format!("{URI_SCHEME}://{host}:{}", self.port))
    }

    /// Rebuild an endpoint from a URI, using the URI itself as the name.
    ///
    /// Used when connecting straight to a trusted URI without discovery.
    pub fn from_uri(uri: &PeerUri) -> Result<Self, ProtocolError> {
        let (host, port) = uri.host_port()?;
        let address = host.trim_start_matches('[').trim_end_matches(']');
        Ok(Self::new(uri.as_str(), address, port))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.uri())
    }
}

/// The canonical identity of a peer: `ws://address:port`.
///
/// Used for trust lookups and reconnection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerUri(String);

impl PeerUri {
    /// Parse and validate a peer URI.
    pub fn parse(s: &str) -> Result<Self, ProtocolError> {
        let uri = Self(s.trim().to_string());
        uri.host_port()?;
        Ok(uri)
    }

    /// The URI as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn host_port(&self) -> Result<(&str, u16), ProtocolError> {
        let invalid = || ProtocolError::InvalidUri(self.0.clone());

        let rest = self
            .0
            .strip_prefix(URI_SCHEME)
            .and_then(|r| r.strip_prefix("://"))
            .ok_or_else(invalid)?;
        let (host, port) = rest.rsplit_once(':').ok_or_else(invalid)?;
        let port: u16 = port.parse().map_err(|_| invalid())?;

        if host.is_empty() || host.contains('/') {
            return Err(invalid());
        }
        if host.starts_with('[') != host.ends_with(']') {
            return Err(invalid());
        }
        Ok((host, port))
    }
}

impl fmt::Display for PeerUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PeerUri {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
