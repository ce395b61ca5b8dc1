use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{EventId, KeyId, StreamId, Timestamp};

/// Governance-stream payloads recording signer-key lifecycle. Key status is
/// derived *only* from folding these events — never from an out-of-band
/// "keys" manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GovernancePayload {
    ServerSignerKeyRotated { key_id: KeyId, spki_pem: String },
    ServerSignerKeyRevoked { key_id: KeyId, reason_code: String },
    OpsAudit { action: String, reason: String },
}

/// Tagged-variant event payloads, keyed by the event's own `type` string.
/// Modeling payloads as a closed sum type (rather than a dynamic map) means
/// the event chain always has a stable canonical byte representation to
/// sign, independent of what a caller happens to send.
/// Adjacently tagged (`type` + `data`) rather than internally tagged: the
/// `Governance` variant wraps [`GovernancePayload`], which is itself an
/// internally-tagged enum — merging two internal tags into one object would
/// collide on the `type` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    AgentRegistered { agent_id: String },
    WalletCredited { agent_id: String, amount_cents: u64, currency: String },
    GateCreated { gate_id: String },
    GateAuthorized { gate_id: String, grant_id: String },
    GateExecuted { gate_id: String },
    GateVerified { gate_id: String, outcome: String },
    HoldCreated { hold_hash: String },
    HoldReleased { hold_hash: String, adjustment_id: String },
    HoldRefunded { hold_hash: String, adjustment_id: String },
    DisputeOpened { case_id: String },
    VerdictAccepted { case_id: String, verdict_id: String },
    Governance(GovernancePayload),
    /// Escape hatch for forward-compatible payloads not yet named above;
    /// carries the raw canonical JSON value through unchanged.
    Other { kind: String, data: Value },
}

/// One entry on a per-stream hash-chained event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub v: u32,
    pub id: EventId,
    pub at: Timestamp,
    pub stream_id: StreamId,
    #[serde(rename = "type")]
    pub kind: String,
    pub actor: String,
    pub payload: EventPayload,
    pub prev_chain_hash: Option<String>,
    pub chain_hash: String,
    pub signer_key_id: KeyId,
    pub signature: String,
}

/// Emitted on export: the tip of one stream's chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub stream_id: StreamId,
    pub last_chain_hash: Option<String>,
    pub last_event_id: Option<EventId>,
}
