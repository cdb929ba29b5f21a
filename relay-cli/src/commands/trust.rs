//! Inspect and edit the trusted companion list.

use anyhow::{Context, Result};
use relay_client::{FileTrustStore, TrustStore};
use relay_types::PeerUri;
use std::path::Path;

/// Print every trusted URI, one per line.
pub fn list(settings_path: &Path) -> Result<()> {
    let store = FileTrustStore::new(settings_path);
    let trusted = store.trusted();

    if trusted.is_empty() {
        println!("No trusted companions.");
        return Ok(());
    }
    for uri in trusted.iter() {
        println!("{uri}");
    }
    Ok(())
}

/// Trust `uri`.
pub fn add(settings_path: &Path, uri: &str) -> Result<()> {
    let uri = PeerUri::parse(uri).context("Not a companion URI (expected ws://host:port)")?;
    let store = FileTrustStore::new(settings_path);

    if store.is_trusted(&uri) {
        println!("Already trusted: {uri}");
        return Ok(());
    }

    store.trust(&uri);
    // trust() only logs write failures; confirm it stuck.
    if !store.is_trusted(&uri) {
        anyhow::bail!("Failed to save {}", settings_path.display());
    }
    println!("Trusted: {uri}");
    Ok(())
}
