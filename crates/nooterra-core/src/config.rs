use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_CHALLENGE_WINDOW_MS, DEFAULT_HOLDBACK_BPS, MAX_DELEGATION_DEPTH};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Reject commitTx batches that would leave any wallet balance negative
    /// even transiently. There is no legitimate reason to disable this; the
    /// flag exists so a deployment's config file can be self-documenting.
    pub enforce_no_negative_balance: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            enforce_no_negative_balance: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub default_challenge_window_ms: i64,
    pub default_holdback_bps: u32,
    pub max_delegation_depth: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            default_challenge_window_ms: DEFAULT_CHALLENGE_WINDOW_MS,
            default_holdback_bps: DEFAULT_HOLDBACK_BPS,
            max_delegation_depth: MAX_DELEGATION_DEPTH,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbitrationConfig {
    /// Whether an admin override may open a dispute after the challenge
    /// deadline has passed. Per design, always requires an explicit reason.
    pub admin_override_allowed: bool,
}

impl Default for ArbitrationConfig {
    fn default() -> Self {
        Self {
            admin_override_allowed: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub ledger: LedgerConfig,
    pub gate: GateConfig,
    pub arbitration: ArbitrationConfig,
    #[serde(default = "default_true")]
    pub maintenance_enabled: bool,
    pub maintenance_interval_ms: u64,
    /// Empty means an ephemeral in-memory store (development/testing only).
    pub data_dir: String,
    /// Tenants the background maintenance loop sweeps each tick.
    pub tenants: Vec<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            ledger: LedgerConfig::default(),
            gate: GateConfig::default(),
            arbitration: ArbitrationConfig::default(),
            maintenance_enabled: true,
            maintenance_interval_ms: 30_000,
            data_dir: String::new(),
            tenants: Vec::new(),
        }
    }
}
