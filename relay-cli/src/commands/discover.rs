//! Browse for companions and report what turns up.

use anyhow::{Context, Result};
use relay_client::{
    DiscoveryEvent, DiscoveryManager, FileTrustStore, MdnsBrowser, RelayConfig, TrustStore,
};
use relay_types::Endpoint;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

pub async fn run(config: &RelayConfig, settings_path: &Path, seconds: u64) -> Result<()> {
    let trust: Arc<dyn TrustStore> = Arc::new(FileTrustStore::new(settings_path));
    let discovery = DiscoveryManager::new(
        Arc::new(MdnsBrowser::new()),
        trust,
        config.discovery.service_type.clone(),
    );

    let mut events = discovery.subscribe();
    discovery.start().context("Failed to start discovery")?;
    println!(
        "Browsing for {} for {seconds}s...",
        config.discovery.service_type
    );

    let deadline = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);

    let mut trusted: Option<Endpoint> = None;
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = events.recv() => match event {
                Ok(DiscoveryEvent::AutoConnect(endpoint)) => {
                    trusted = Some(endpoint);
                    break;
                }
                Ok(DiscoveryEvent::CandidatesChanged(candidates)) => {
                    if let Some(latest) = candidates.last() {
                        println!("  found {latest}");
                    }
                }
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }

    let candidates = discovery.candidates();
    discovery.stop().await;

    println!("{}", summary(trusted.as_ref(), &candidates));
    Ok(())
}

fn summary(trusted: Option<&Endpoint>, candidates: &[Endpoint]) -> String {
    let mut out = String::new();
    if let Some(endpoint) = trusted {
        out.push_str(&format!("Trusted companion: {endpoint}\n"));
    }
    if candidates.is_empty() {
        out.push_str("No untrusted companions found.");
    } else {
        out.push_str("Untrusted companions:");
        for (i, endpoint) in candidates.iter().enumerate() {
            out.push_str(&format!("\n  [{i}] {endpoint}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_lists_candidates_with_indices() {
        let candidates = vec![
            Endpoint::new("Desk", "192.168.1.20", 8080),
            Endpoint::new("Lounge", "192.168.1.30", 8080),
        ];
        let text = summary(None, &candidates);
        assert!(text.starts_with("Untrusted companions:"));
        assert!(text.contains("[0] "));
        assert!(text.contains("[1] "));
    }

    #[test]
    fn summary_reports_trusted_peer() {
        let desk = Endpoint::new("Desk", "192.168.1.20", 8080);
        let text = summary(Some(&desk), &[]);
        assert!(text.starts_with("Trusted companion: "));
        assert!(text.ends_with("No untrusted companions found."));
    }
}
