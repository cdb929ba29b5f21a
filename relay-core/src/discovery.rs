//! Discovery decisions.
//!
//! For each resolved endpoint the session decides: auto-connect (its URI is
//! trusted) or surface it as a candidate. The first trusted resolution wins
//! and finishes the session; anything resolved afterwards is ignored.

use relay_types::{Endpoint, PeerUri};

/// Outcome of one resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Trusted endpoint; connect to it and stop discovering.
    AutoConnect(Endpoint),
    /// Untrusted endpoint appended; the candidate list changed.
    CandidatesChanged(Vec<Endpoint>),
    /// The session already finished (or was stopped); nothing to do.
    Ignored,
}

/// State of one discovery run, from `start()` to `stop()`.
#[derive(Debug, Clone, Default)]
pub struct DiscoverySession {
    candidates: Vec<Endpoint>,
    finished: bool,
}

impl DiscoverySession {
    /// Start a fresh run with no candidates.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a resolved endpoint.
    pub fn on_resolved(
        &mut self,
        endpoint: Endpoint,
        is_trusted: impl FnOnce(&PeerUri) -> bool,
    ) -> Decision {
        if self.finished {
            return Decision::Ignored;
        }

        if is_trusted(&endpoint.uri()) {
            self.finished = true;
            return Decision::AutoConnect(endpoint);
        }

        self.candidates.push(endpoint);
        Decision::CandidatesChanged(self.candidates.clone())
    }

    /// Pick a candidate by list position, finishing the run.
    pub fn select(&mut self, index: usize) -> Option<Endpoint> {
        if self.finished {
            return None;
        }
        let endpoint = self.candidates.get(index).cloned()?;
        self.finished = true;
        Some(endpoint)
    }

    /// Finish the run; later resolutions are ignored.
    pub fn finish(&mut self) {
        self.finished = true;
    }

    /// Whether the run is over.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Untrusted endpoints seen so far, in resolution order.
    pub fn candidates(&self) -> &[Endpoint] {
        &self.candidates
    }
}
