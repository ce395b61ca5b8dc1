//! Reputation/metering derivation (spec §2 "Metering / reputation
//! derivation").
//!
//! Reputation facts are never stored directly — they are folded from the
//! event chain the same way [`nooterra_crypto::revocation::KeyStatusIndex`]
//! folds the governance stream into key eligibility. A payee's standing is
//! entirely reconstructible from its hold-resolution events plus the
//! disputes opened against it.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{json, Value};

use nooterra_core::arbitration::ArbitrationCase;
use nooterra_core::event::EventPayload;
use nooterra_core::event::Event;
use nooterra_core::hold::ToolCallHold;
use nooterra_core::types::{AgentId, Cents};

const MAINTENANCE_ACTOR: &str = "system:maintenance";

/// Per-agent (payee) facts derived from its tool-call history. All fields
/// accumulate monotonically; there is no decay or windowing here — that is
/// a reporting-layer concern built on top of these raw counts.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ReputationFacts {
    pub auto_released_cents: Cents,
    pub verdict_released_cents: Cents,
    pub verdict_refunded_cents: Cents,
    pub disputes_opened: u32,
}

impl ReputationFacts {
    pub fn total_released_cents(&self) -> Cents {
        self.auto_released_cents + self.verdict_released_cents
    }
}

/// Folds hold-resolution and dispute-open events into per-agent
/// [`ReputationFacts`].
#[derive(Debug, Default)]
pub struct ReputationIndex {
    facts: HashMap<AgentId, ReputationFacts>,
}

impl ReputationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one `HOLD_RESOLVED` event (`HoldReleased`/`HoldRefunded`,
    /// produced by either the maintenance sweep or a verdict) against the
    /// hold it resolved, crediting `hold.payee_agent_id`.
    pub fn record_resolution(&mut self, hold: &ToolCallHold, event: &Event) {
        let entry = self.facts.entry(hold.payee_agent_id.clone()).or_default();
        match &event.payload {
            EventPayload::HoldReleased { .. } => {
                if event.actor == MAINTENANCE_ACTOR {
                    entry.auto_released_cents += hold.held_amount_cents;
                } else {
                    entry.verdict_released_cents += hold.held_amount_cents;
                }
            }
            EventPayload::HoldRefunded { .. } => {
                entry.verdict_refunded_cents += hold.held_amount_cents;
            }
            _ => {}
        }
    }

    /// Folds one `DISPUTE_OPENED` event against the case's bound hold,
    /// crediting the dispute against `hold.payee_agent_id` — the party whose
    /// delivery is being challenged.
    pub fn record_dispute_opened(&mut self, case: &ArbitrationCase, hold: &ToolCallHold) {
        let _ = case;
        self.facts.entry(hold.payee_agent_id.clone()).or_default().disputes_opened += 1;
    }

    pub fn facts_for(&self, agent: &AgentId) -> ReputationFacts {
        self.facts.get(agent).copied().unwrap_or_default()
    }

    /// A `metering.json`-shaped summary an `InvoiceBundle.v1` wraps
    /// (spec §6): one entry per agent with facts observed so far.
    pub fn to_summary(&self) -> Value {
        let agents: Vec<Value> = self
            .facts
            .iter()
            .map(|(agent_id, facts)| {
                json!({
                    "agentId": agent_id.as_str(),
                    "autoReleasedCents": facts.auto_released_cents,
                    "verdictReleasedCents": facts.verdict_released_cents,
                    "verdictRefundedCents": facts.verdict_refunded_cents,
                    "disputesOpened": facts.disputes_opened,
                })
            })
            .collect();
        json!({ "agents": agents })
    }
}
