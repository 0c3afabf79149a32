// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Svalbard Client
//!
//! Entry point for the `svalbard` binary: the command-line front-end
//! that drives `share_secret` and `recover_secret` against a custody
//! fleet. The sharing metadata blob is persisted to a local file; in a
//! real deployment that file lives with the trusted cloud provider.
//!
//! Exit code is non-zero on any failure, including shares that need
//! manual storage — scripts watch the exit code, humans read the summary
//! lines.

mod cli;

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use svalbard_protocol::channel::{FileChannel, TokenReceiver};
use svalbard_protocol::custody::{
    HttpTransport, ManagerRegistry, PeerDeviceShareManager, PrintedCopyShareManager,
    ServerShareManager, ShareManager, TcpTransport,
};
use svalbard_protocol::metadata::{LocationType, ShareLocation, SharingMetadata};
use svalbard_protocol::sharing::SharingClient;

use cli::{Commands, DeleteArgs, RecoverArgs, ShareArgs, SvalbardCli};

#[tokio::main]
async fn main() -> Result<()> {
    let args = SvalbardCli::parse();

    // Logs go to stderr at `warn` by default; stdout is reserved for the
    // outcome summary that scripts and tests parse.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let client = build_client(&args)?;

    match args.command {
        Commands::Share(share_args) => run_share(&client, share_args).await,
        Commands::Recover(recover_args) => run_recover(&client, recover_args).await,
        Commands::Delete(delete_args) => run_delete(&client, delete_args).await,
    }
}

/// Assembles the sharing client: server custody over the TCP transport
/// with tokens received from the channel spool, plus the two interactive
/// custodies.
fn build_client(args: &SvalbardCli) -> Result<SharingClient> {
    let channel = Arc::new(
        FileChannel::new(&args.spool_dir)
            .with_context(|| format!("failed to open channel spool at {}", args.spool_dir.display()))?,
    );

    let server_manager = ServerShareManager::new(
        Arc::new(TcpTransport::new()) as Arc<dyn HttpTransport>,
        channel as Arc<dyn TokenReceiver>,
        Duration::from_secs(args.token_wait_secs),
    );

    let mut registry = ManagerRegistry::new();
    registry.register(LocationType::Server, Arc::new(server_manager));
    registry.register(LocationType::Printed, Arc::new(PrintedCopyShareManager::new()));
    registry.register(LocationType::Peer, Arc::new(PeerDeviceShareManager::new()));
    Ok(SharingClient::new(registry))
}

// ---------------------------------------------------------------------------
// share
// ---------------------------------------------------------------------------

async fn run_share(client: &SharingClient, args: ShareArgs) -> Result<()> {
    let secret = read_secret(args.secret)?;
    let locations = load_locations(&args.locations)?;
    let n = locations.len() as u32;

    let result = client
        .share_secret(&args.name, &secret, args.threshold, n, &locations)
        .await
        .context("sharing failed")?;

    // Persist the metadata before reporting anything: without this blob
    // the placed shares are unrecoverable.
    let blob = result.metadata.encode().context("metadata encoding failed")?;
    std::fs::write(&args.metadata_file, &blob).with_context(|| {
        format!("failed to write metadata to {}", args.metadata_file.display())
    })?;

    let stored = result.metadata.shares.len() - result.shares_to_be_stored.len();
    println!("Stored {stored} shares");
    println!("Sharing metadata written to {}", args.metadata_file.display());

    if !result.shares_to_be_stored.is_empty() {
        println!(
            "{} share(s) need manual storage:",
            result.shares_to_be_stored.len()
        );
        for unstored in &result.shares_to_be_stored {
            println!(
                "  {} ({}): {}",
                unstored.location.location_name,
                unstored.location.location_type,
                unstored.failure
            );
        }
        bail!(
            "{} of {} shares were not stored automatically",
            result.shares_to_be_stored.len(),
            result.metadata.shares.len()
        );
    }

    Ok(())
}

/// Reads the secret from the flag or, preferably, stdin.
fn read_secret(flag: Option<String>) -> Result<Vec<u8>> {
    match flag {
        Some(value) => Ok(value.into_bytes()),
        None => {
            let mut buffer = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buffer)
                .context("failed to read secret from stdin")?;
            // A trailing newline is an artifact of `echo`, not secret.
            while buffer.last() == Some(&b'\n') || buffer.last() == Some(&b'\r') {
                buffer.pop();
            }
            Ok(buffer)
        }
    }
}

/// Loads the ordered location list from its JSON file.
fn load_locations(path: &std::path::Path) -> Result<Vec<ShareLocation>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read locations from {}", path.display()))?;
    let locations: Vec<ShareLocation> =
        serde_json::from_str(&raw).context("locations file is not a JSON list of locations")?;
    Ok(locations)
}

// ---------------------------------------------------------------------------
// recover
// ---------------------------------------------------------------------------

async fn run_recover(client: &SharingClient, args: RecoverArgs) -> Result<()> {
    let metadata = load_metadata(&args.metadata_file)?;

    match client.recover_secret(&metadata).await {
        Ok(result) => {
            let used = result
                .share_data_list
                .iter()
                .filter(|d| d.failure.is_none())
                .count();
            println!("Recovered using {used} shares");
            for data in result.share_data_list.iter() {
                if let Some(failure) = &data.failure {
                    println!(
                        "  unavailable: {} ({failure})",
                        data.metadata.location.location_name
                    );
                }
            }

            if args.hex {
                println!("{}", hex::encode(&result.secret));
            } else {
                match String::from_utf8(result.secret.clone()) {
                    Ok(text) => println!("{text}"),
                    Err(_) => println!("{}", hex::encode(&result.secret)),
                }
            }
            Ok(())
        }
        Err(e) => {
            // The failure line goes to stdout — scripts grep for it.
            println!("Recovery failed: {e}");
            bail!("recovery failed: {e}");
        }
    }
}

fn load_metadata(path: &std::path::Path) -> Result<SharingMetadata> {
    let blob = std::fs::read(path)
        .with_context(|| format!("failed to read metadata from {}", path.display()))?;
    SharingMetadata::decode(&blob).context("metadata file is corrupt or not a sharing record")
}

// ---------------------------------------------------------------------------
// delete
// ---------------------------------------------------------------------------

async fn run_delete(client: &SharingClient, args: DeleteArgs) -> Result<()> {
    let metadata = load_metadata(&args.metadata_file)?;

    let mut deleted = 0usize;
    let mut failures = Vec::new();
    for entry in &metadata.shares {
        match client
            .registry()
            .resolve(entry.location.location_type)
            .map(Arc::clone)
        {
            Ok(manager) => match manager
                .delete(&metadata.secret_name, &entry.location)
                .await
            {
                Ok(()) => deleted += 1,
                Err(e) => failures.push((entry.location.location_name.clone(), e.to_string())),
            },
            Err(e) => failures.push((entry.location.location_name.clone(), e.to_string())),
        }
    }

    println!("Deleted {deleted} shares");
    for (location, failure) in &failures {
        println!("  not deleted: {location} ({failure})");
    }

    if !failures.is_empty() {
        bail!("{} share(s) could not be deleted", failures.len());
    }

    if args.purge_metadata {
        std::fs::remove_file(&args.metadata_file).with_context(|| {
            format!("failed to remove {}", args.metadata_file.display())
        })?;
        println!("Metadata file removed");
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
