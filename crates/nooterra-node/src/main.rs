//! nooterra-node — wiring + background maintenance worker.
//!
//! Startup sequence:
//!   1. Open (or initialise) the store
//!   2. Load or generate the node's signer keypair
//!   3. Wire the ledger/gate/arbitration engines onto the shared store
//!   4. Run the maintenance sweep on an interval until shutdown
//!
//! No inbound transport here — request handling is an adapter's job; this
//! binary is everything that adapter sits in front of.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use nooterra_core::config::NodeConfig;
use nooterra_crypto::KeyPair;
use nooterra_node::{load_config, open_store, run_maintenance_once, NodeEngines};

#[derive(Parser, Debug)]
#[command(
    name = "nooterra-node",
    version,
    about = "nooterra node — ledger, escrow, and arbitration substrate for agent economies"
)]
struct Args {
    /// Directory for the persistent store. Omit for an ephemeral in-memory
    /// store (development/testing only).
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Path to a NodeConfig JSON file (tenant list, sweep interval). Falls
    /// back to defaults — no tenants swept, 30s interval — if omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to a file holding the node's raw 32-byte Ed25519 signing key
    /// seed, hex-encoded. Generated ephemerally if omitted — see the
    /// warning on `load_or_generate_signer`.
    #[arg(long)]
    signer_key: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,nooterra=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    info!("nooterra node starting");

    let mut config = match &args.config {
        Some(path) => load_config(path).context("loading node config")?,
        None => NodeConfig::default(),
    };
    if let Some(dir) = &args.data_dir {
        let dir = expand_tilde(dir);
        std::fs::create_dir_all(&dir).context("creating data dir")?;
        config.data_dir = dir.to_string_lossy().into_owned();
    }

    let signer = load_or_generate_signer(args.signer_key.as_deref())?;
    let store = open_store(&config, std::sync::Arc::new(signer)).context("opening store")?;
    let engines = NodeEngines::new(store);

    info!(tenants = config.tenants.len(), interval_ms = config.maintenance_interval_ms, "node ready");

    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(config.maintenance_interval_ms));
    loop {
        ticker.tick().await;
        match run_maintenance_once(&engines, &config).await {
            Ok(released) if released > 0 => {
                info!(released_cents = released, "maintenance sweep released expired holds");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "maintenance sweep failed"),
        }
    }
}

/// Load the node's signer key from a hex-seed file, or generate an
/// ephemeral one.
///
/// # Warning
/// An ephemeral key is not reproducible across restarts — events signed by
/// this run cannot be re-verified against a key loaded from a future run.
/// Only use this for local development and testing.
fn load_or_generate_signer(path: Option<&Path>) -> anyhow::Result<KeyPair> {
    if let Some(p) = path {
        let hex_seed = std::fs::read_to_string(p)
            .with_context(|| format!("reading signer key from {}", p.display()))?;
        let bytes = hex::decode(hex_seed.trim()).context("decoding signer key hex")?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("signer key must be exactly 32 bytes"))?;
        return Ok(KeyPair::from_bytes(seed));
    }
    warn!("No --signer-key provided. Generating an ephemeral key — DO NOT USE IN PRODUCTION.");
    Ok(KeyPair::generate())
}

/// Expand a leading `~` to the user's home directory (`HOME` or `USERPROFILE`).
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
