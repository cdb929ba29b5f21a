//! Scripted browse engine for testing.

use super::{Browse, BrowseLease, DiscoveryError, ResolvedService, ServiceBrowser};
use relay_types::Endpoint;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Mock browse engine.
///
/// Resolutions are pushed by the test with [`resolve`](Self::resolve) and
/// delivered to the active browse. Tracks how many leases are outstanding.
#[derive(Debug, Clone, Default)]
pub struct MockBrowser {
    inner: Arc<Mutex<MockBrowserInner>>,
}

#[derive(Debug, Default)]
struct MockBrowserInner {
    sender: Option<mpsc::UnboundedSender<ResolvedService>>,
    browse_count: usize,
    active_leases: usize,
    service_types: Vec<String>,
    fail_next_browse: Option<String>,
}

impl MockBrowser {
    /// Create a mock with no browse running.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a resolution to the active browse.
    ///
    /// Returns `false` if no browse is active.
    pub fn resolve(&self, service: ResolvedService) -> bool {
        let inner = self.inner.lock().unwrap();
        match &inner.sender {
            Some(tx) => tx.send(service).is_ok(),
            None => false,
        }
    }

    /// Deliver a resolution for `endpoint`.
    pub fn resolve_endpoint(&self, endpoint: &Endpoint) -> bool {
        let Ok(address) = endpoint.address.parse::<IpAddr>() else {
            return false;
        };
        self.resolve(ResolvedService {
            instance_name: endpoint.name.clone(),
            addresses: vec![address],
            port: endpoint.port,
        })
    }

    /// The active browse's sender, to deliver resolutions out of band.
    pub fn sender(&self) -> Option<mpsc::UnboundedSender<ResolvedService>> {
        let inner = self.inner.lock().unwrap();
        inner.sender.clone()
    }

    /// Number of successful `browse()` calls.
    pub fn browse_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.browse_count
    }

    /// Leases handed out and not yet released.
    pub fn active_leases(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.active_leases
    }

    /// Service types browsed, in order.
    pub fn service_types(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner.service_types.clone()
    }

    /// Cause the next browse() to fail with the given error.
    pub fn fail_next_browse(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_browse = Some(error.to_string());
    }
}

impl ServiceBrowser for MockBrowser {
    fn browse(&self, service_type: &str) -> Result<Browse, DiscoveryError> {
        let mut inner = self.inner.lock().unwrap();

        // Check for forced failure
        if let Some(error) = inner.fail_next_browse.take() {
            return Err(DiscoveryError::Browse(error));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        inner.sender = Some(tx);
        inner.browse_count += 1;
        inner.active_leases += 1;
        inner.service_types.push(service_type.to_string());

        let shared = Arc::clone(&self.inner);
        let lease = BrowseLease::new(move || {
            let mut inner = shared.lock().unwrap();
            inner.active_leases -= 1;
            inner.sender = None;
        });

        Ok(Browse {
            resolved: rx,
            lease,
        })
    }
}
