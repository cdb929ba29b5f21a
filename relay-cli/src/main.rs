//! # pocket-relay
//!
//! Runs the device side of the relay from a terminal.
//!
//! ## Commands
//!
//! - `run`: Discover (or connect to) a companion and relay until Ctrl-C
//! - `discover`: List companions advertising on the local network
//! - `trust list` / `trust add`: Inspect and edit trusted companions
//!
//! ## Example
//!
//! ```bash
//! # Serve fixture data to whichever trusted companion shows up
//! pocket-relay run --fixtures demo.json
//!
//! # Pair with a specific companion
//! pocket-relay run --connect ws://192.168.1.20:8080
//!
//! # See who is out there
//! pocket-relay discover --seconds 10
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use relay_client::RelayConfig;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod commands;
mod fixtures;

use commands::{discover, run, trust};

/// Device-side relay between the message store and a companion.
#[derive(Parser, Debug)]
#[command(name = "pocket-relay")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for settings and configuration
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Configuration file (default: <data-dir>/relay.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Relay until interrupted
    Run {
        /// Pair with this companion instead of discovering one
        #[arg(long)]
        connect: Option<String>,

        /// JSON file with messages and contacts to serve
        #[arg(long)]
        fixtures: Option<PathBuf>,
    },

    /// Browse for companions
    Discover {
        /// How long to browse
        #[arg(long, default_value = "5")]
        seconds: u64,
    },

    /// Manage trusted companions
    Trust {
        #[command(subcommand)]
        action: TrustAction,
    },
}

#[derive(Subcommand, Debug)]
enum TrustAction {
    /// List trusted companions
    List,
    /// Trust a companion URI (ws://host:port)
    Add {
        /// Companion URI
        uri: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("pocket_relay=info".parse()?)
                .add_directive("relay_client=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    // Determine data directory
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };
    std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

    let config = load_config(cli.config.as_deref(), &data_dir)?;
    let settings_path = resolve(&data_dir, &config.storage.settings_path);

    match cli.command {
        Commands::Run { connect, fixtures } => {
            run::run(&config, &settings_path, connect.as_deref(), fixtures.as_deref()).await?;
        }
        Commands::Discover { seconds } => {
            discover::run(&config, &settings_path, seconds).await?;
        }
        Commands::Trust { action } => match action {
            TrustAction::List => trust::list(&settings_path)?,
            TrustAction::Add { uri } => trust::add(&settings_path, &uri)?,
        },
    }

    Ok(())
}

/// Explicit config must exist; the default location is optional.
fn load_config(explicit: Option<&Path>, data_dir: &Path) -> Result<RelayConfig> {
    if let Some(path) = explicit {
        return RelayConfig::from_file(path).context("Failed to load configuration");
    }

    let default = data_dir.join("relay.toml");
    if default.exists() {
        RelayConfig::from_file(&default).context("Failed to load configuration")
    } else {
        Ok(RelayConfig::default())
    }
}

/// Relative paths in the config are relative to the data directory.
fn resolve(data_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        data_dir.join(path)
    }
}

/// Get the default data directory for pocket-relay.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "pocket-relay", "pocket-relay")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::tempdir;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_with_connect() {
        let cli = Cli::try_parse_from([
            "pocket-relay",
            "--data-dir",
            "/tmp/relay",
            "run",
            "--connect",
            "ws://10.0.0.2:8080",
        ])
        .unwrap();

        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/relay")));
        assert!(matches!(
            cli.command,
            Commands::Run { connect: Some(ref uri), fixtures: None } if uri == "ws://10.0.0.2:8080"
        ));
    }

    #[test]
    fn parses_trust_add() {
        let cli = Cli::try_parse_from(["pocket-relay", "trust", "add", "ws://10.0.0.2:8080"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Trust { action: TrustAction::Add { ref uri } } if uri == "ws://10.0.0.2:8080"
        ));
    }

    #[test]
    fn discover_defaults_to_five_seconds() {
        let cli = Cli::try_parse_from(["pocket-relay", "discover"]).unwrap();
        assert!(matches!(cli.command, Commands::Discover { seconds: 5 }));
    }

    #[test]
    fn missing_default_config_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = load_config(None, dir.path()).unwrap();
        assert_eq!(config.poller.interval_secs, 5);
    }

    #[test]
    fn default_config_file_is_picked_up() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("relay.toml"), "[poller]\ninterval_secs = 2\n").unwrap();

        let config = load_config(None, dir.path()).unwrap();
        assert_eq!(config.poller.interval_secs, 2);
    }

    #[test]
    fn explicit_config_must_exist() {
        let dir = tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("nope.toml")), dir.path()).is_err());
    }

    #[test]
    fn relative_settings_resolve_under_data_dir() {
        let data = Path::new("/var/lib/relay");
        assert_eq!(
            resolve(data, Path::new("settings.toml")),
            PathBuf::from("/var/lib/relay/settings.toml")
        );
        assert_eq!(
            resolve(data, Path::new("/etc/relay/settings.toml")),
            PathBuf::from("/etc/relay/settings.toml")
        );
    }
}
