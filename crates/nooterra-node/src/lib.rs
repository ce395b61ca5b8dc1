//! Wiring for a runnable nooterra process: store + engine construction and
//! the background maintenance loop. No inbound transport — spec §1 places
//! the HTTP router out of scope; this crate is everything an adapter would
//! sit in front of.

use std::sync::Arc;

use tracing::debug;

use nooterra_arbitration::ArbitrationApi;
use nooterra_core::clock::{Clock, SystemClock};
use nooterra_core::config::NodeConfig;
use nooterra_core::error::Result;
use nooterra_core::types::{HoldHash, StreamId, TenantId};
use nooterra_crypto::KeyPair;
use nooterra_gate::GateApi;
use nooterra_ledger::LedgerEngine;
use nooterra_metering::ReputationIndex;
use nooterra_store::{InMemoryStore, Store};

pub use nooterra_core::config::{ArbitrationConfig, GateConfig, LedgerConfig};

/// Load a [`NodeConfig`] from a JSON file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<NodeConfig> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Tenants named in `config.tenants`, as typed [`TenantId`]s.
pub fn tenant_ids(config: &NodeConfig) -> Vec<TenantId> {
    config.tenants.iter().map(TenantId::new).collect()
}

/// The engines one tenant-serving process needs, sharing one [`Store`]
/// handle — mirrors the teacher's single `Arc<StateDb>` shared across
/// `StateEngine`/`RpcServerState`.
pub struct NodeEngines {
    pub store: Arc<dyn Store>,
    pub ledger: LedgerEngine,
    pub gate: GateApi,
    pub arbitration: ArbitrationApi,
}

impl NodeEngines {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            ledger: LedgerEngine::new(store.clone()),
            gate: GateApi::new(store.clone()),
            arbitration: ArbitrationApi::new(store.clone()),
            store,
        }
    }
}

/// Opens the store named by `config` (in-memory/temp unless `data_dir` is
/// set) using a freshly generated node signing key and [`SystemClock`].
/// The node's own keypair is ephemeral unless the caller persists it
/// themselves — matching the teacher's `load_or_generate_genesis_params`
/// "ephemeral keys are not reproducible" warning for a from-scratch start.
pub fn open_store(config: &NodeConfig, signer: Arc<KeyPair>) -> Result<Arc<dyn Store>> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store: Arc<dyn Store> = if config.data_dir.is_empty() {
        Arc::new(InMemoryStore::open_temp(clock, signer)?)
    } else {
        Arc::new(InMemoryStore::open(
            std::path::Path::new(&config.data_dir),
            clock,
            signer,
        )?)
    };
    Ok(store)
}

/// One maintenance sweep across every configured tenant, returning the
/// total cents auto-released. Used both by the background loop in `main`
/// and by `POST /ops/maintenance/tool-call-holdback/run` (an adapter would
/// call this directly rather than waiting for the next tick).
pub async fn run_maintenance_once(engines: &NodeEngines, config: &NodeConfig) -> Result<u64> {
    if !config.maintenance_enabled {
        return Ok(0);
    }
    let mut total = 0u64;
    let now = engines.store.clock().now();
    for tenant in tenant_ids(config) {
        let report = engines.arbitration.run_maintenance(&tenant, now).await?;
        total += report.auto_released_cents;
        log_reputation_deltas(&engines.store, &tenant, &report.released_hold_hashes)?;
    }
    Ok(total)
}

/// Folds this tick's freshly auto-released holds into a [`ReputationIndex`]
/// and logs the resulting per-payee deltas — the same fold a
/// `metering.json` report would run, just scoped to one sweep instead of a
/// tenant's whole history.
fn log_reputation_deltas(store: &Arc<dyn Store>, tenant: &TenantId, released_hold_hashes: &[String]) -> Result<()> {
    if released_hold_hashes.is_empty() {
        return Ok(());
    }
    let mut index = ReputationIndex::new();
    for hash in released_hold_hashes {
        let hold_hash = HoldHash::new(hash.clone());
        let Some(hold) = store.get_hold(tenant, &hold_hash)? else {
            continue;
        };
        let stream_id = StreamId::new(format!("hold_{hash}"));
        for event in store.stream_events(tenant, &stream_id)? {
            if event.kind == "HOLD_RESOLVED" {
                index.record_resolution(&hold, &event);
            }
        }
    }
    debug!(%tenant, metering = %index.to_summary(), "maintenance sweep reputation deltas");
    Ok(())
}
