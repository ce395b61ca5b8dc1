use serde::{Deserialize, Serialize};

use crate::types::{AgentId, Bps, Cents, Currency, GateId, GrantId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Created,
    Authorized,
    Executed,
    Verified,
    Released,
    Refunded,
    Held,
    Disputed,
    Closed,
}

impl GateState {
    pub fn is_terminal(self) -> bool {
        matches!(self, GateState::Released | GateState::Refunded | GateState::Closed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct X402Gate {
    pub gate_id: GateId,
    pub payer_agent_id: AgentId,
    pub payee_agent_id: AgentId,
    pub tool_id: String,
    pub amount_cents: Cents,
    pub currency: Currency,
    pub authority_grant_ref: GrantId,
    pub state: GateState,
    pub holdback_bps: Bps,
    pub challenge_window_ms: i64,
    pub created_at: Timestamp,
}
