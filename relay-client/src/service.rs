//! Top-level wiring: discovery feeds the session.
//!
//! [`RelayService`] starts discovery, connects the session to the first
//! trusted peer discovery reports, and handles manual pairing with an
//! untrusted candidate.

use crate::discovery::{DiscoveryError, DiscoveryEvent, DiscoveryManager};
use crate::session::{SessionError, SessionHandle};
use crate::trust_store::TrustStore;
use relay_types::Endpoint;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Discovery, trust and session, wired together.
pub struct RelayService {
    discovery: DiscoveryManager,
    session: SessionHandle,
    trust: Arc<dyn TrustStore>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for RelayService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayService")
            .field("discovery", &self.discovery)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl RelayService {
    /// Wire the parts together. Nothing runs until [`start`](Self::start).
    pub fn new(
        discovery: DiscoveryManager,
        session: SessionHandle,
        trust: Arc<dyn TrustStore>,
    ) -> Self {
        Self {
            discovery,
            session,
            trust,
            forwarder: Mutex::new(None),
        }
    }

    /// Start discovery; trusted peers it finds are connected automatically.
    pub fn start(&self) -> Result<(), DiscoveryError> {
        {
            let mut forwarder = self.forwarder.lock().unwrap_or_else(|e| e.into_inner());
            if forwarder.as_ref().map_or(true, |task| task.is_finished()) {
                let events = self.discovery.subscribe();
                *forwarder = Some(tokio::spawn(forward(events, self.session.clone())));
            }
        }
        self.discovery.start()
    }

    /// Pair with `endpoint`: trust it, stop discovering, connect.
    pub async fn pair(&self, endpoint: Endpoint) -> Result<(), SessionError> {
        info!(endpoint = %endpoint, "Pairing");
        self.trust.trust(&endpoint.uri());
        self.discovery.stop().await;
        self.session.connect(endpoint).await
    }

    /// Pair with the discovery candidate at `index`.
    ///
    /// Returns the paired endpoint, or `None` if there is no such candidate.
    pub async fn pair_candidate(&self, index: usize) -> Result<Option<Endpoint>, SessionError> {
        let Some(endpoint) = self.discovery.select(index) else {
            return Ok(None);
        };
        self.pair(endpoint.clone()).await?;
        Ok(Some(endpoint))
    }

    /// Stop discovery and the session.
    pub async fn stop(&self) -> Result<(), SessionError> {
        if let Some(task) = self
            .forwarder
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
        self.discovery.stop().await;
        self.session.stop().await
    }

    /// The discovery manager.
    pub fn discovery(&self) -> &DiscoveryManager {
        &self.discovery
    }

    /// The session handle.
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }
}

async fn forward(
    mut events: tokio::sync::broadcast::Receiver<DiscoveryEvent>,
    session: SessionHandle,
) {
    loop {
        match events.recv().await {
            Ok(DiscoveryEvent::AutoConnect(endpoint)) => {
                if session.connect(endpoint).await.is_err() {
                    break;
                }
            }
            Ok(DiscoveryEvent::CandidatesChanged(candidates)) => {
                debug!(count = candidates.len(), "Candidates changed");
            }
            Err(RecvError::Lagged(missed)) => warn!(missed, "Discovery events lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}
