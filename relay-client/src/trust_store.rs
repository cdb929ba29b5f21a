//! Persistent trust store.
//!
//! The file backend keeps the trusted URIs in a TOML settings file shared
//! with other preferences:
//!
//! ```toml
//! [RelayPrefs]
//! trustedHosts = "ws://192.168.1.20:8080,ws://[fe80::1]:8080"
//! ```
//!
//! Writes preserve every other key in the file and replace it atomically
//! (temp file + rename). A file that cannot be read is treated as trusting
//! nothing.

use relay_core::TrustSet;
use relay_types::PeerUri;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, error, info};

/// Settings table holding the relay keys.
pub const PREFS_TABLE: &str = "RelayPrefs";
/// Key holding the comma-joined trusted URIs.
pub const TRUSTED_HOSTS_KEY: &str = "trustedHosts";

/// Source of truth for which peers may be auto-connected.
pub trait TrustStore: Send + Sync {
    /// Whether `uri` is trusted.
    fn is_trusted(&self, uri: &PeerUri) -> bool;

    /// Trust `uri`. Trusting an already-trusted URI changes nothing.
    fn trust(&self, uri: &PeerUri);

    /// Every trusted URI, in the order they were first trusted.
    fn trusted(&self) -> TrustSet;
}

#[derive(Debug, Error)]
enum SettingsError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to encode settings: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// Trust store backed by a TOML settings file.
#[derive(Debug)]
pub struct FileTrustStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileTrustStore {
    /// Use the settings file at `path`. It need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// The settings file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_table(&self) -> Result<toml::Table, SettingsError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(toml::Table::new()),
            Err(e) => {
                return Err(SettingsError::Read {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };
        content.parse::<toml::Table>().map_err(|e| SettingsError::Parse {
            path: self.path.clone(),
            source: e,
        })
    }

    fn load(&self) -> TrustSet {
        match self.load_table() {
            Ok(table) => trust_set_from(&table),
            Err(e) => {
                error!(error = %e, "Unreadable settings, trusting nothing");
                TrustSet::new()
            }
        }
    }

    fn store(&self, uri: &PeerUri) -> Result<bool, SettingsError> {
        let mut table = self.load_table()?;
        let mut set = trust_set_from(&table);
        if !set.insert(uri.clone()) {
            return Ok(false);
        }

        let prefs = table
            .entry(PREFS_TABLE)
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
        if !prefs.is_table() {
            *prefs = toml::Value::Table(toml::Table::new());
        }
        if let toml::Value::Table(prefs) = prefs {
            prefs.insert(
                TRUSTED_HOSTS_KEY.to_string(),
                toml::Value::String(set.to_persisted()),
            );
        }

        let encoded = toml::to_string(&table)?;
        self.replace_file(encoded.as_bytes())?;
        Ok(true)
    }

    fn replace_file(&self, bytes: &[u8]) -> Result<(), SettingsError> {
        let write_err = |source| SettingsError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, bytes).map_err(write_err)?;
        std::fs::rename(&tmp, &self.path).map_err(write_err)
    }
}

fn trust_set_from(table: &toml::Table) -> TrustSet {
    table
        .get(PREFS_TABLE)
        .and_then(|prefs| prefs.get(TRUSTED_HOSTS_KEY))
        .and_then(toml::Value::as_str)
        .map(TrustSet::from_persisted)
        .unwrap_or_default()
}

impl TrustStore for FileTrustStore {
    fn is_trusted(&self, uri: &PeerUri) -> bool {
        self.load().contains(uri)
    }

    fn trust(&self, uri: &PeerUri) {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        match self.store(uri) {
            Ok(true) => info!(uri = %uri, "Trusted peer"),
            Ok(false) => debug!(uri = %uri, "Peer already trusted"),
            Err(e) => error!(uri = %uri, error = %e, "Failed to persist trusted peer"),
        }
    }

    fn trusted(&self) -> TrustSet {
        self.load()
    }
}

/// Trust store held in memory only.
#[derive(Debug, Default)]
pub struct MemoryTrustStore {
    set: Mutex<TrustSet>,
}

impl MemoryTrustStore {
    /// Create a store trusting nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store trusting `uris`.
    pub fn with_trusted<'a>(uris: impl IntoIterator<Item = &'a PeerUri>) -> Self {
        let mut set = TrustSet::new();
        for uri in uris {
            set.insert(uri.clone());
        }
        Self {
            set: Mutex::new(set),
        }
    }
}

impl TrustStore for MemoryTrustStore {
    fn is_trusted(&self, uri: &PeerUri) -> bool {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(uri)
    }

    fn trust(&self, uri: &PeerUri) {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(uri.clone());
    }

    fn trusted(&self) -> TrustSet {
        self.set.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
