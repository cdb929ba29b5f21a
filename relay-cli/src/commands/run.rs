//! Relay until interrupted.

use crate::fixtures::Fixtures;
use anyhow::{Context, Result};
use async_trait::async_trait;
use relay_client::{
    ChangePoller, DiscoveryManager, Dispatcher, FileTrustStore, MdnsBrowser, MemoryContactStore,
    MemoryMessageStore, MessageSender, RelayConfig, RelayService, SendError, SessionHandle,
    SystemClock, WebSocketTransport,
};
use relay_types::{Endpoint, PeerUri};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

/// Logs outgoing texts instead of sending them.
#[derive(Debug, Default)]
pub struct LoggingSender;

#[async_trait]
impl MessageSender for LoggingSender {
    async fn send_text(&self, address: &str, body: &str) -> Result<(), SendError> {
        info!(%address, len = body.len(), "Would send text");
        Ok(())
    }
}

pub async fn run(
    config: &RelayConfig,
    settings_path: &Path,
    connect: Option<&str>,
    fixtures: Option<&Path>,
) -> Result<()> {
    let clock = Arc::new(SystemClock);
    let messages = MemoryMessageStore::with_clock(clock.clone());
    let contacts = MemoryContactStore::new();
    if let Some(path) = fixtures {
        Fixtures::load(path)?.populate(&messages, &contacts);
        info!(path = %path.display(), "Loaded fixtures");
    }

    let messages = Arc::new(messages);
    let dispatcher = Dispatcher::with_defaults(
        messages.clone(),
        Arc::new(contacts),
        Arc::new(LoggingSender),
    );
    let poller = ChangePoller::new(messages, clock)
        .with_legacy_idle_placeholder(config.poller.legacy_idle_placeholder);
    let session = SessionHandle::spawn(
        WebSocketTransport::new(),
        dispatcher,
        poller,
        config.session_config(),
    );

    let trust = Arc::new(FileTrustStore::new(settings_path));
    let discovery = DiscoveryManager::new(
        Arc::new(MdnsBrowser::new()),
        trust.clone(),
        config.discovery.service_type.clone(),
    );
    let relay = RelayService::new(discovery, session.clone(), trust);

    match connect {
        Some(uri) => {
            let uri = PeerUri::parse(uri).context("Not a companion URI (expected ws://host:port)")?;
            let endpoint = Endpoint::from_uri(&uri)?;
            relay.pair(endpoint).await?;
        }
        None => {
            relay.start().context("Failed to start discovery")?;
            println!(
                "Browsing for {} (Ctrl-C to stop)",
                config.discovery.service_type
            );
        }
    }

    let mut events = session.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => println!("{event:?}"),
                Err(RecvError::Lagged(missed)) => warn!(missed, "Dropped session events"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    println!("Stopping...");
    relay.stop().await?;
    session.shutdown().await;
    Ok(())
}
