//! # CLI Interface
//!
//! Defines the command-line argument structure for the `svalbard` client
//! using `clap` derive. Three subcommands: `share`, `recover`, `delete`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Svalbard client.
///
/// Splits a short high-value secret across a fleet of custodians and
/// recovers it later from any threshold-sized subset. The sharing
/// metadata — everything recovery needs besides the custodians — is
/// written to a local file standing in for the trusted cloud provider.
#[derive(Parser, Debug)]
#[command(
    name = "svalbard",
    about = "Svalbard secret backup client",
    version,
    propagate_version = true
)]
pub struct SvalbardCli {
    /// Directory the file-based secondary channel delivers tokens into.
    /// Must be the same spool the custody servers write to.
    #[arg(long, env = "SVBD_SPOOL_DIR", default_value = "/tmp/svbd-channel")]
    pub spool_dir: PathBuf,

    /// Seconds to wait for each token to arrive over the channel.
    #[arg(long, env = "SVBD_TOKEN_WAIT", default_value_t = 10)]
    pub token_wait_secs: u64,

    /// Default log level when RUST_LOG is not set.
    #[arg(long, env = "SVBD_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the client binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Split a secret and distribute the shares to their custodians.
    Share(ShareArgs),
    /// Gather shares and reconstruct the secret.
    Recover(RecoverArgs),
    /// Delete the shares at every custodian listed in the metadata.
    Delete(DeleteArgs),
}

/// Arguments for the `share` subcommand.
#[derive(Parser, Debug)]
pub struct ShareArgs {
    /// Owner-facing name of the secret.
    #[arg(long, short = 'n')]
    pub name: String,

    /// The secret value. When omitted, the secret is read from stdin —
    /// prefer stdin so the value stays out of shell history.
    #[arg(long)]
    pub secret: Option<String>,

    /// Reconstruction threshold k.
    #[arg(long, short = 'k')]
    pub threshold: u32,

    /// JSON file listing the n share locations, in order.
    #[arg(long)]
    pub locations: PathBuf,

    /// Where to write the sharing metadata blob.
    #[arg(long, short = 'm')]
    pub metadata_file: PathBuf,
}

/// Arguments for the `recover` subcommand.
#[derive(Parser, Debug)]
pub struct RecoverArgs {
    /// The sharing metadata blob written by `share`.
    #[arg(long, short = 'm')]
    pub metadata_file: PathBuf,

    /// Print the recovered secret as hex instead of text.
    #[arg(long)]
    pub hex: bool,
}

/// Arguments for the `delete` subcommand.
#[derive(Parser, Debug)]
pub struct DeleteArgs {
    /// The sharing metadata blob written by `share`.
    #[arg(long, short = 'm')]
    pub metadata_file: PathBuf,

    /// Also remove the metadata file after the custodians confirm.
    #[arg(long)]
    pub purge_metadata: bool,
}
