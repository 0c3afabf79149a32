//! # CLI Interface
//!
//! Defines the command-line argument structure for `svalbard-server`
//! using `clap` derive. Two subcommands: `run` and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Svalbard custody server.
///
/// Stores opaque second-level shares keyed by a non-reversible share id,
/// gated by short-lived operation-scoped tokens delivered over an
/// out-of-band secondary channel.
#[derive(Parser, Debug)]
#[command(
    name = "svalbard-server",
    about = "Svalbard custody server",
    version,
    propagate_version = true
)]
pub struct ServerCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the custody server binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the custody server.
    Run(RunArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Address for the custody HTTP listener.
    ///
    /// Production deployments put a TLS terminator in front of this
    /// address; the listener itself speaks plain HTTP.
    #[arg(long, env = "SVBD_LISTEN_ADDR", default_value = "127.0.0.1:9650")]
    pub listen_addr: String,

    /// Address for the Prometheus metrics and health listener.
    #[arg(long, env = "SVBD_METRICS_ADDR", default_value = "127.0.0.1:9651")]
    pub metrics_addr: String,

    /// Path to the server data directory holding the durable share store.
    ///
    /// Created on first run if it does not exist.
    #[arg(long, short = 'd', env = "SVBD_DATA_DIR", default_value = "~/.svalbard-server")]
    pub data_dir: PathBuf,

    /// Directory the file-based secondary channel spools messages into.
    ///
    /// Defaults to `{data_dir}/channel`. Real deployments replace the
    /// file channel with an SMS or email sender.
    #[arg(long, env = "SVBD_SPOOL_DIR")]
    pub spool_dir: Option<PathBuf>,

    /// Length of minted tokens, in characters. Minimum 5.
    #[arg(long, env = "SVBD_TOKEN_LENGTH", default_value_t = 10)]
    pub token_length: usize,

    /// Validity of minted tokens, in seconds. Minimum 2.
    #[arg(long, env = "SVBD_TOKEN_VALIDITY", default_value_t = 60)]
    pub token_validity_secs: i64,

    /// Keep shares in memory instead of the durable store. Testing only —
    /// every share is lost when the process exits.
    #[arg(long)]
    pub in_memory: bool,

    /// Default log level when RUST_LOG is not set.
    #[arg(long, env = "SVBD_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format: "compact", "pretty", or "json". Unrecognized
    /// values refuse to start rather than falling back.
    #[arg(long, env = "SVBD_LOG_FORMAT", default_value = "compact")]
    pub log_format: String,
}

/// Expands a leading `~` to the user's home directory.
pub fn resolve_data_dir(path: &std::path::Path) -> PathBuf {
    let raw = path.to_string_lossy();
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    path.to_path_buf()
}
