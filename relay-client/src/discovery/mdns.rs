//! mDNS/DNS-SD browse engine over `mdns-sd`.

use super::{Browse, BrowseLease, DiscoveryError, ResolvedService, ServiceBrowser};
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Browses with a dedicated mDNS daemon per browse.
///
/// Resolutions are forwarded from a background thread; releasing the lease
/// stops the browse and shuts the daemon down.
#[derive(Debug, Clone, Copy, Default)]
pub struct MdnsBrowser;

impl MdnsBrowser {
    /// Create a browser.
    pub fn new() -> Self {
        Self
    }
}

impl ServiceBrowser for MdnsBrowser {
    fn browse(&self, service_type: &str) -> Result<Browse, DiscoveryError> {
        let daemon = ServiceDaemon::new().map_err(|e| DiscoveryError::Engine(e.to_string()))?;
        let events = match daemon.browse(service_type) {
            Ok(events) => events,
            Err(e) => {
                let _ = daemon.shutdown();
                return Err(DiscoveryError::Browse(e.to_string()));
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let stopped = Arc::new(AtomicBool::new(false));

        let forward_stopped = Arc::clone(&stopped);
        let spawned = std::thread::Builder::new()
            .name("relay-mdns".into())
            .spawn(move || {
                while !forward_stopped.load(Ordering::Acquire) {
                    match events.recv_timeout(POLL_INTERVAL) {
                        Ok(ServiceEvent::ServiceResolved(info)) => {
                            if tx.send(resolved(&info)).is_err() {
                                break;
                            }
                        }
                        Ok(ServiceEvent::SearchStopped(ty)) => {
                            debug!(service_type = %ty, "Browse stopped");
                            break;
                        }
                        Ok(other) => trace!(?other, "mDNS event"),
                        Err(_) if events.is_disconnected() => break,
                        Err(_) => {}
                    }
                }
            });

        if let Err(e) = spawned {
            let _ = daemon.shutdown();
            return Err(DiscoveryError::Engine(e.to_string()));
        }

        let service_type = service_type.to_string();
        let lease = BrowseLease::new(move || {
            stopped.store(true, Ordering::Release);
            if let Err(e) = daemon.stop_browse(&service_type) {
                debug!(error = %e, "stop_browse failed");
            }
            match daemon.shutdown() {
                Ok(status) => {
                    let _ = status.recv_timeout(SHUTDOWN_TIMEOUT);
                }
                Err(e) => warn!(error = %e, "mDNS daemon shutdown failed"),
            }
        });

        Ok(Browse { resolved: rx, lease })
    }
}

fn resolved(info: &ServiceInfo) -> ResolvedService {
    let fullname = info.get_fullname();
    let instance_name = fullname
        .strip_suffix(info.get_type())
        .map(|name| name.trim_end_matches('.'))
        .unwrap_or(fullname)
        .to_string();

    let mut addresses: Vec<IpAddr> = info.get_addresses().iter().copied().collect();
    addresses.sort();

    ResolvedService {
        instance_name,
        addresses,
        port: info.get_port(),
    }
}
