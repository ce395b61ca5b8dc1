use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{AgentId, Cents, Currency, KeyId, LifecycleStatus, TenantId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicKeyRecord {
    pub key_id: KeyId,
    pub spki_pem: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: AgentId,
    pub tenant_id: TenantId,
    pub display_name: String,
    pub owner_ref: String,
    pub public_keys: Vec<PublicKeyRecord>,
    pub capabilities: Vec<String>,
    pub lifecycle_status: LifecycleStatus,
}

impl Agent {
    pub fn new(
        agent_id: impl Into<AgentId>,
        tenant_id: impl Into<TenantId>,
        display_name: impl Into<String>,
        owner_ref: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            tenant_id: tenant_id.into(),
            display_name: display_name.into(),
            owner_ref: owner_ref.into(),
            public_keys: Vec::new(),
            capabilities: Vec::new(),
            lifecycle_status: LifecycleStatus::Active,
        }
    }

    /// Invariant: at most one key per `(agentId, keyId)`.
    pub fn add_public_key(&mut self, record: PublicKeyRecord) {
        if !self.public_keys.iter().any(|k| k.key_id == record.key_id) {
            self.public_keys.push(record);
        }
    }
}

/// Per-agent, per-currency wallet. `available + escrow_locked + heldback`
/// must always equal the sum of all posted credit/debit entries for that
/// wallet — enforced by [`nooterra_ledger`], not by this plain data struct.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct WalletBalance {
    pub available_cents: Cents,
    pub escrow_locked_cents: Cents,
    pub heldback_cents: Cents,
}

impl WalletBalance {
    pub fn total(&self) -> Cents {
        self.available_cents + self.escrow_locked_cents + self.heldback_cents
    }
}

/// All currency balances for one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub agent_id: AgentId,
    pub balances: HashMap<Currency, WalletBalance>,
}

impl Wallet {
    pub fn new(agent_id: impl Into<AgentId>) -> Self {
        Self {
            agent_id: agent_id.into(),
            balances: HashMap::new(),
        }
    }

    pub fn balance(&self, currency: Currency) -> WalletBalance {
        self.balances.get(&currency).copied().unwrap_or_default()
    }

    pub fn balance_mut(&mut self, currency: Currency) -> &mut WalletBalance {
        self.balances.entry(currency).or_default()
    }
}
