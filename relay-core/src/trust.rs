//! The set of trusted peer URIs.
//!
//! Persisted as a single comma-joined string. Ordered by first insertion;
//! inserting an already-trusted URI is a no-op. There is no removal path.

use relay_types::PeerUri;

/// Ordered, duplicate-free set of trusted peer URIs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustSet {
    uris: Vec<PeerUri>,
}

impl TrustSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the persisted comma-joined form.
    ///
    /// Empty input means "no trusted hosts". Blank tokens, tokens that are not
    /// valid peer URIs and duplicates are skipped.
    pub fn from_persisted(s: &str) -> Self {
        let mut set = Self::new();
        for token in s.split(',') {
            if let Ok(uri) = PeerUri::parse(token) {
                set.insert(uri);
            }
        }
        set
    }

    /// The persisted comma-joined form.
    pub fn to_persisted(&self) -> String {
        self.uris
            .iter()
            .map(PeerUri::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Whether `uri` is trusted.
    pub fn contains(&self, uri: &PeerUri) -> bool {
        self.uris.contains(uri)
    }

    /// Trust `uri`. Returns `false` if it already was.
    pub fn insert(&mut self, uri: PeerUri) -> bool {
        if self.contains(&uri) {
            return false;
        }
        self.uris.push(uri);
        true
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &PeerUri> {
        self.uris.iter()
    }

    /// Number of trusted URIs.
    pub fn len(&self) -> usize {
        self.uris.len()
    }

    /// Whether nothing is trusted.
    pub fn is_empty(&self) -> bool {
        self.uris.is_empty()
    }
}
