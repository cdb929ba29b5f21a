//! Local-network discovery of companion peers.
//!
//! [`DiscoveryManager`] browses for the relay service type and decides, per
//! resolved peer, whether to auto-connect (trusted) or list it as a
//! candidate. The first trusted peer ends the run.
//!
//! The browse engine sits behind [`ServiceBrowser`]. A browse is held by a
//! [`BrowseLease`]: dropping the lease releases the engine. Stopping is
//! idempotent and, once `stop()` returns, no further decision is made for
//! that run even if a resolution was already in flight.

mod mdns;
mod mock;

pub use mdns::MdnsBrowser;
pub use mock::MockBrowser;

use crate::trust_store::TrustStore;
use relay_core::{Decision, DiscoverySession};
use relay_types::Endpoint;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// DNS-SD service type companions advertise.
pub const SERVICE_TYPE: &str = "_relay._tcp.local.";

const EVENT_BUFFER: usize = 32;

/// Discovery errors.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The browse engine could not be created.
    #[error("discovery engine unavailable: {0}")]
    Engine(String),

    /// The browse could not be started.
    #[error("browse failed: {0}")]
    Browse(String),
}

/// A peer the browse engine resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedService {
    /// Instance name, without the service type suffix.
    pub instance_name: String,
    /// Every address the peer advertised.
    pub addresses: Vec<IpAddr>,
    /// Service port.
    pub port: u16,
}

impl ResolvedService {
    /// The endpoint to connect to: the first IPv4 address if there is one,
    /// else the first address. `None` without addresses.
    pub fn to_endpoint(&self) -> Option<Endpoint> {
        let address = self
            .addresses
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| self.addresses.first())?;
        Some(Endpoint::new(
            self.instance_name.clone(),
            address.to_string(),
            self.port,
        ))
    }
}

/// Releases a browse when dropped.
pub struct BrowseLease {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl BrowseLease {
    /// Lease that runs `release` exactly once, on drop.
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }
}

impl Drop for BrowseLease {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for BrowseLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowseLease")
            .field("held", &self.release.is_some())
            .finish()
    }
}

/// An active browse.
#[derive(Debug)]
pub struct Browse {
    /// Resolved peers, as the engine finds them.
    pub resolved: mpsc::UnboundedReceiver<ResolvedService>,
    /// Keeps the engine browsing.
    pub lease: BrowseLease,
}

/// A DNS-SD browse engine.
pub trait ServiceBrowser: Send + Sync {
    /// Start browsing for `service_type`.
    fn browse(&self, service_type: &str) -> Result<Browse, DiscoveryError>;
}

/// What discovery tells its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// A trusted peer resolved; discovery has stopped.
    AutoConnect(Endpoint),
    /// The untrusted candidate list changed.
    CandidatesChanged(Vec<Endpoint>),
}

/// Drives browse runs and turns resolutions into [`DiscoveryEvent`]s.
#[derive(Clone)]
pub struct DiscoveryManager {
    browser: Arc<dyn ServiceBrowser>,
    trust: Arc<dyn TrustStore>,
    service_type: String,
    inner: Arc<Mutex<Inner>>,
    events: broadcast::Sender<DiscoveryEvent>,
}

#[derive(Default)]
struct Inner {
    session: DiscoverySession,
    run: Option<ActiveRun>,
}

struct ActiveRun {
    cancel: CancellationToken,
    lease: BrowseLease,
}

impl std::fmt::Debug for DiscoveryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryManager")
            .field("service_type", &self.service_type)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl DiscoveryManager {
    /// Create a manager; nothing is browsed until [`start`](Self::start).
    pub fn new(
        browser: Arc<dyn ServiceBrowser>,
        trust: Arc<dyn TrustStore>,
        service_type: impl Into<String>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            browser,
            trust,
            service_type: service_type.into(),
            inner: Arc::new(Mutex::new(Inner::default())),
            events,
        }
    }

    /// Subscribe to discovery events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.events.subscribe()
    }

    /// Begin a browse run. A no-op while one is already running.
    ///
    /// Must be called within a tokio runtime.
    pub fn start(&self) -> Result<(), DiscoveryError> {
        let mut inner = self.lock();
        if inner.run.is_some() {
            debug!("Discovery already running");
            return Ok(());
        }

        let Browse { resolved, lease } = self.browser.browse(&self.service_type)?;
        let cancel = CancellationToken::new();
        inner.session = DiscoverySession::new();
        inner.run = Some(ActiveRun {
            cancel: cancel.clone(),
            lease,
        });
        drop(inner);

        info!(service_type = %self.service_type, "Discovery started");
        tokio::spawn(self.clone().pump(resolved, cancel));
        Ok(())
    }

    /// End the current run, releasing the browse engine. Idempotent.
    pub async fn stop(&self) {
        let run = {
            let mut inner = self.lock();
            inner.session.finish();
            inner.run.take()
        };

        if let Some(run) = run {
            run.cancel.cancel();
            release(run.lease).await;
            info!("Discovery stopped");
        }
    }

    /// Whether a run is active.
    pub fn is_running(&self) -> bool {
        self.lock().run.is_some()
    }

    /// Untrusted peers seen in the current (or last) run.
    pub fn candidates(&self) -> Vec<Endpoint> {
        self.lock().session.candidates().to_vec()
    }

    /// Pick a candidate by position. Finishes the run's decisions; call
    /// [`stop`](Self::stop) to release the engine.
    pub fn select(&self, index: usize) -> Option<Endpoint> {
        self.lock().session.select(index)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn pump(
        self,
        mut resolved: mpsc::UnboundedReceiver<ResolvedService>,
        cancel: CancellationToken,
    ) {
        loop {
            let service = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = resolved.recv() => match next {
                    Some(service) => service,
                    None => break,
                },
            };

            let Some(endpoint) = service.to_endpoint() else {
                warn!(instance = %service.instance_name, "Resolved peer has no address");
                continue;
            };
            debug!(endpoint = %endpoint, "Resolved peer");

            let finished_run = {
                let mut inner = self.lock();
                // stop() cancels under this lock.
                if cancel.is_cancelled() {
                    break;
                }
                let trust = &self.trust;
                match inner.session.on_resolved(endpoint, |uri| trust.is_trusted(uri)) {
                    Decision::AutoConnect(endpoint) => {
                        info!(endpoint = %endpoint, "Trusted peer found");
                        let _ = self.events.send(DiscoveryEvent::AutoConnect(endpoint));
                        inner.run.take()
                    }
                    Decision::CandidatesChanged(candidates) => {
                        let _ = self.events.send(DiscoveryEvent::CandidatesChanged(candidates));
                        None
                    }
                    Decision::Ignored => None,
                }
            };

            if let Some(run) = finished_run {
                run.cancel.cancel();
                release(run.lease).await;
                info!("Discovery stopped");
                break;
            }
        }
        debug!("Discovery pump exited");
    }
}

/// Drop a lease off the async executor; engine shutdown may block.
async fn release(lease: BrowseLease) {
    if let Err(e) = tokio::task::spawn_blocking(move || drop(lease)).await {
        warn!(error = %e, "Releasing browse failed");
    }
}
