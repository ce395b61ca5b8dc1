use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use nooterra_chain::{EventChainer, StreamLocks};
use nooterra_core::arbitration::{ArbitrationCase, ArbitrationVerdict, SettlementAdjustment};
use nooterra_core::clock::Clock;
use nooterra_core::error::{NooterraError, Result};
use nooterra_core::event::Event;
use nooterra_core::gate::X402Gate;
use nooterra_core::grant::AuthorityGrant;
use nooterra_core::hold::{HoldStatus, ToolCallHold};
use nooterra_core::idempotency::{IdempotencyRecord, IdempotencyScope};
use nooterra_core::model::{Agent, Wallet};
use nooterra_core::types::{AgentId, CaseId, GateId, GrantId, HoldHash, StreamId, TenantId, Timestamp};
use nooterra_crypto::KeyPair;

use crate::ops::{LedgerOp, SettlementBinding, TxReceipt};
use crate::store::Store;

const T_AGENTS: &str = "agents";
const T_WALLETS: &str = "wallets";
const T_GRANTS: &str = "grants";
const T_GATES: &str = "gates";
const T_HOLDS: &str = "holds";
const T_CASES: &str = "cases";
const T_VERDICTS: &str = "verdicts";
const T_ADJUSTMENTS: &str = "adjustments";
const T_BINDINGS: &str = "bindings";
const T_EVENTS: &str = "events";
const T_EVENT_SEQ: &str = "event_seq";
const T_IDEMPOTENCY: &str = "idempotency";

fn scoped(tenant: &TenantId, id: &str) -> String {
    format!("{}:{}", tenant.as_str(), id)
}

/// In-memory (sled-embedded, temp-file-backed unless a path is given) store.
/// Grounded in the teacher's `StateDb`: one named tree per entity kind,
/// JSON-serialized values, full-scan iteration for query-shaped reads.
///
/// `commit` serializes all writers behind a single process-wide mutex rather
/// than per-entity locks — a coarser linearization than §5 describes, but one
/// that preserves its one observable guarantee (writes to the affected entity
/// set are linearized) at a fraction of the complexity. See DESIGN.md.
pub struct InMemoryStore {
    db: sled::Db,
    trees: Trees,
    clock: Arc<dyn Clock>,
    chainer: EventChainer,
    stream_locks: StreamLocks,
    write_lock: Mutex<()>,
}

struct Trees {
    agents: sled::Tree,
    wallets: sled::Tree,
    grants: sled::Tree,
    gates: sled::Tree,
    holds: sled::Tree,
    cases: sled::Tree,
    verdicts: sled::Tree,
    adjustments: sled::Tree,
    bindings: sled::Tree,
    events: sled::Tree,
    event_seq: sled::Tree,
    idempotency: sled::Tree,
}

impl InMemoryStore {
    pub fn open_temp(clock: Arc<dyn Clock>, signer: Arc<KeyPair>) -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| NooterraError::Storage(e.to_string()))?;
        Self::from_db(db, clock, signer)
    }

    pub fn open(path: impl AsRef<std::path::Path>, clock: Arc<dyn Clock>, signer: Arc<KeyPair>) -> Result<Self> {
        let db = sled::open(path).map_err(|e| NooterraError::Storage(e.to_string()))?;
        Self::from_db(db, clock, signer)
    }

    fn from_db(db: sled::Db, clock: Arc<dyn Clock>, signer: Arc<KeyPair>) -> Result<Self> {
        let open_tree = |name: &str| -> Result<sled::Tree> {
            db.open_tree(name).map_err(|e| NooterraError::Storage(e.to_string()))
        };
        let trees = Trees {
            agents: open_tree(T_AGENTS)?,
            wallets: open_tree(T_WALLETS)?,
            grants: open_tree(T_GRANTS)?,
            gates: open_tree(T_GATES)?,
            holds: open_tree(T_HOLDS)?,
            cases: open_tree(T_CASES)?,
            verdicts: open_tree(T_VERDICTS)?,
            adjustments: open_tree(T_ADJUSTMENTS)?,
            bindings: open_tree(T_BINDINGS)?,
            events: open_tree(T_EVENTS)?,
            event_seq: open_tree(T_EVENT_SEQ)?,
            idempotency: open_tree(T_IDEMPOTENCY)?,
        };
        let chainer = EventChainer::new(clock.clone(), signer);
        Ok(Self {
            db,
            trees,
            clock,
            chainer,
            stream_locks: StreamLocks::new(),
            write_lock: Mutex::new(()),
        })
    }

    // Entity values carry `serde_json::Value` fields (event payloads,
    // idempotency response envelopes) whose `Deserializer::deserialize_any`
    // bincode cannot implement, so entities are stored as JSON bytes rather
    // than bincode despite the tree-per-entity sled layout staying the same.
    fn get_json<T: serde::de::DeserializeOwned>(tree: &sled::Tree, key: &str) -> Result<Option<T>> {
        match tree.get(key.as_bytes()).map_err(|e| NooterraError::Storage(e.to_string()))? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes).map_err(|e| NooterraError::Serialization(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn put_json<T: serde::Serialize>(tree: &sled::Tree, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value).map_err(|e| NooterraError::Serialization(e.to_string()))?;
        tree.insert(key.as_bytes(), bytes).map_err(|e| NooterraError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush().map_err(|e| NooterraError::Storage(e.to_string()))?;
        Ok(())
    }

    fn next_stream_tip(&self, tenant: &TenantId, stream_id: &StreamId) -> Result<Option<Event>> {
        let mut events: Vec<Event> = self.stream_events(tenant, stream_id)?;
        Ok(events.pop())
    }

    fn next_event_seq(&self, tenant: &TenantId, stream_id: &StreamId) -> Result<u64> {
        let key = scoped(tenant, stream_id.as_str());
        let new = self
            .trees
            .event_seq
            .fetch_and_update(key.as_bytes(), |old| {
                let n = old.map(|b| u64::from_be_bytes(b.try_into().unwrap_or([0; 8]))).unwrap_or(0);
                Some((n + 1).to_be_bytes().to_vec())
            })
            .map_err(|e| NooterraError::Storage(e.to_string()))?
            .map(|b| u64::from_be_bytes(b.as_ref().try_into().unwrap_or([0; 8])))
            .unwrap_or(0);
        Ok(new)
    }
}

impl Store for InMemoryStore {
    fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    fn get_agent(&self, tenant: &TenantId, agent_id: &AgentId) -> Result<Option<Agent>> {
        Self::get_json(&self.trees.agents, &scoped(tenant, agent_id.as_str()))
    }

    fn get_wallet(&self, tenant: &TenantId, agent_id: &AgentId) -> Result<Wallet> {
        Ok(Self::get_json(&self.trees.wallets, &scoped(tenant, agent_id.as_str()))?
            .unwrap_or_else(|| Wallet::new(agent_id.clone())))
    }

    fn get_grant(&self, tenant: &TenantId, grant_id: &GrantId) -> Result<Option<AuthorityGrant>> {
        Self::get_json(&self.trees.grants, &scoped(tenant, grant_id.as_str()))
    }

    fn gates_for_grant(&self, tenant: &TenantId, grant_id: &GrantId) -> Result<Vec<X402Gate>> {
        let prefix = format!("{}:", tenant.as_str());
        let mut out = Vec::new();
        for kv in self.trees.gates.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = kv.map_err(|e| NooterraError::Storage(e.to_string()))?;
            let gate: X402Gate =
                serde_json::from_slice(&bytes).map_err(|e| NooterraError::Serialization(e.to_string()))?;
            if &gate.authority_grant_ref == grant_id {
                out.push(gate);
            }
        }
        Ok(out)
    }

    fn get_gate(&self, tenant: &TenantId, gate_id: &GateId) -> Result<Option<X402Gate>> {
        Self::get_json(&self.trees.gates, &scoped(tenant, gate_id.as_str()))
    }

    fn get_hold(&self, tenant: &TenantId, hold_hash: &HoldHash) -> Result<Option<ToolCallHold>> {
        Self::get_json(&self.trees.holds, &scoped(tenant, hold_hash.as_str()))
    }

    fn holds_due_for_auto_release(&self, tenant: &TenantId, now: Timestamp) -> Result<Vec<ToolCallHold>> {
        let prefix = format!("{}:", tenant.as_str());
        let mut out = Vec::new();
        for kv in self.trees.holds.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = kv.map_err(|e| NooterraError::Storage(e.to_string()))?;
            let hold: ToolCallHold =
                serde_json::from_slice(&bytes).map_err(|e| NooterraError::Serialization(e.to_string()))?;
            if hold.status == HoldStatus::Held && hold.challenge_deadline < now {
                let has_case = self.case_for_agreement(tenant, &hold.agreement_hash)?.is_some();
                if !has_case {
                    out.push(hold);
                }
            }
        }
        Ok(out)
    }

    fn get_case(&self, tenant: &TenantId, case_id: &CaseId) -> Result<Option<ArbitrationCase>> {
        Self::get_json(&self.trees.cases, &scoped(tenant, case_id.as_str()))
    }

    fn list_cases(&self, tenant: &TenantId) -> Result<Vec<ArbitrationCase>> {
        let prefix = format!("{}:", tenant.as_str());
        let mut out = Vec::new();
        for kv in self.trees.cases.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = kv.map_err(|e| NooterraError::Storage(e.to_string()))?;
            out.push(serde_json::from_slice(&bytes).map_err(|e| NooterraError::Serialization(e.to_string()))?);
        }
        Ok(out)
    }

    fn case_for_agreement(&self, tenant: &TenantId, agreement_hash: &str) -> Result<Option<ArbitrationCase>> {
        self.get_case(tenant, &CaseId::new(ArbitrationCase::case_id_for(agreement_hash)))
    }

    fn get_verdict_for_case(&self, tenant: &TenantId, case_id: &CaseId) -> Result<Option<ArbitrationVerdict>> {
        Self::get_json(&self.trees.verdicts, &scoped(tenant, case_id.as_str()))
    }

    fn get_adjustment(&self, tenant: &TenantId, adjustment_id: &str) -> Result<Option<SettlementAdjustment>> {
        Self::get_json(&self.trees.adjustments, &scoped(tenant, adjustment_id))
    }

    fn get_settlement_binding(&self, tenant: &TenantId, agreement_hash: &str) -> Result<Option<SettlementBinding>> {
        Self::get_json(&self.trees.bindings, &scoped(tenant, agreement_hash))
    }

    fn stream_events(&self, tenant: &TenantId, stream_id: &StreamId) -> Result<Vec<Event>> {
        let prefix = format!("{}:{}:", tenant.as_str(), stream_id.as_str());
        let mut entries: Vec<(u64, Event)> = Vec::new();
        for kv in self.trees.events.scan_prefix(prefix.as_bytes()) {
            let (key, bytes) = kv.map_err(|e| NooterraError::Storage(e.to_string()))?;
            let key_str = String::from_utf8_lossy(&key);
            let seq: u64 = key_str.rsplit(':').next().unwrap_or("0").parse().unwrap_or(0);
            let event: Event = serde_json::from_slice(&bytes).map_err(|e| NooterraError::Serialization(e.to_string()))?;
            entries.push((seq, event));
        }
        entries.sort_by_key(|(seq, _)| *seq);
        Ok(entries.into_iter().map(|(_, e)| e).collect())
    }

    fn governance_events(&self, tenant: &TenantId) -> Result<Vec<Event>> {
        self.stream_events(tenant, &StreamId::new(nooterra_core::constants::GOVERNANCE_STREAM_ID))
    }

    fn idempotency_get(&self, scope: &IdempotencyScope, key: &str) -> Result<Option<IdempotencyRecord>> {
        let k = format!("{}:{}:{}", scope.tenant_id.as_str(), scope.route, key);
        Self::get_json(&self.trees.idempotency, &k)
    }

    fn idempotency_put(&self, record: IdempotencyRecord) -> Result<()> {
        let k = format!("{}:{}:{}", record.scope.tenant_id.as_str(), record.scope.route, record.key);
        Self::put_json(&self.trees.idempotency, &k, &record)
    }

    fn commit(&self, tenant: &TenantId, ops: Vec<LedgerOp>) -> Result<TxReceipt> {
        let _guard = self.write_lock.lock();
        let now = self.clock.now();
        let mut receipt = TxReceipt::default();

        // Pre-load working copies of every wallet the batch touches so
        // balance checks and mutations are consistent across the whole op
        // list before anything is persisted.
        let mut wallets = std::collections::HashMap::new();
        for op in &ops {
            let agent_id = match op {
                LedgerOp::WalletCredit { agent_id, .. }
                | LedgerOp::WalletDebit { agent_id, .. }
                | LedgerOp::EscrowLock { agent_id, .. }
                | LedgerOp::EscrowRelease { agent_id, .. }
                | LedgerOp::EscrowRefund { agent_id, .. }
                | LedgerOp::HoldbackPlace { agent_id, .. }
                | LedgerOp::HoldbackRelease { agent_id, .. }
                | LedgerOp::HoldbackRefund { agent_id, .. } => Some(agent_id.clone()),
                _ => None,
            };
            if let Some(agent_id) = agent_id {
                wallets
                    .entry(agent_id.clone())
                    .or_insert_with(|| self.get_wallet(tenant, &agent_id).unwrap_or_else(|_| Wallet::new(agent_id.clone())));
            }
            if let LedgerOp::EscrowRelease { to_agent_id, .. } | LedgerOp::HoldbackRefund { refund_to_agent_id: to_agent_id, .. } = op {
                wallets
                    .entry(to_agent_id.clone())
                    .or_insert_with(|| self.get_wallet(tenant, to_agent_id).unwrap_or_else(|_| Wallet::new(to_agent_id.clone())));
            }
        }

        let mut agents = Vec::new();
        let mut grants = Vec::new();
        let mut gates = Vec::new();
        let mut holds = Vec::new();
        let mut cases = Vec::new();
        let mut verdicts = Vec::new();
        let mut adjustments = Vec::new();
        let mut bindings = Vec::new();
        let mut staged_events = Vec::new();

        for op in ops {
            match op {
                LedgerOp::AgentUpsert(a) => agents.push(a),
                LedgerOp::WalletCredit { agent_id, currency, amount_cents } => {
                    let w = wallets.get_mut(&agent_id).expect("preloaded");
                    w.balance_mut(currency).available_cents += amount_cents;
                }
                LedgerOp::WalletDebit { agent_id, currency, amount_cents } => {
                    let w = wallets.get_mut(&agent_id).expect("preloaded");
                    let bal = w.balance_mut(currency);
                    if bal.available_cents < amount_cents {
                        return Err(NooterraError::InsufficientAvailable {
                            need: amount_cents,
                            have: bal.available_cents,
                        });
                    }
                    bal.available_cents -= amount_cents;
                }
                LedgerOp::EscrowLock { agent_id, currency, amount_cents } => {
                    let w = wallets.get_mut(&agent_id).expect("preloaded");
                    let bal = w.balance_mut(currency);
                    if bal.available_cents < amount_cents {
                        return Err(NooterraError::InsufficientAvailable {
                            need: amount_cents,
                            have: bal.available_cents,
                        });
                    }
                    bal.available_cents -= amount_cents;
                    bal.escrow_locked_cents += amount_cents;
                }
                LedgerOp::EscrowRelease { agent_id, currency, amount_cents, to_agent_id } => {
                    {
                        let w = wallets.get_mut(&agent_id).expect("preloaded");
                        let bal = w.balance_mut(currency);
                        if bal.escrow_locked_cents < amount_cents {
                            return Err(NooterraError::InsufficientEscrowLocked {
                                need: amount_cents,
                                have: bal.escrow_locked_cents,
                            });
                        }
                        bal.escrow_locked_cents -= amount_cents;
                    }
                    let w = wallets.get_mut(&to_agent_id).expect("preloaded");
                    w.balance_mut(currency).available_cents += amount_cents;
                }
                LedgerOp::EscrowRefund { agent_id, currency, amount_cents } => {
                    let w = wallets.get_mut(&agent_id).expect("preloaded");
                    let bal = w.balance_mut(currency);
                    if bal.escrow_locked_cents < amount_cents {
                        return Err(NooterraError::InsufficientEscrowLocked {
                            need: amount_cents,
                            have: bal.escrow_locked_cents,
                        });
                    }
                    bal.escrow_locked_cents -= amount_cents;
                    bal.available_cents += amount_cents;
                }
                LedgerOp::HoldbackPlace { agent_id, currency, amount_cents } => {
                    let w = wallets.get_mut(&agent_id).expect("preloaded");
                    let bal = w.balance_mut(currency);
                    if bal.escrow_locked_cents < amount_cents {
                        return Err(NooterraError::InsufficientEscrowLocked {
                            need: amount_cents,
                            have: bal.escrow_locked_cents,
                        });
                    }
                    bal.escrow_locked_cents -= amount_cents;
                    bal.heldback_cents += amount_cents;
                }
                LedgerOp::HoldbackRelease { agent_id, currency, amount_cents } => {
                    let w = wallets.get_mut(&agent_id).expect("preloaded");
                    let bal = w.balance_mut(currency);
                    if bal.heldback_cents < amount_cents {
                        return Err(NooterraError::InsufficientHeldback {
                            need: amount_cents,
                            have: bal.heldback_cents,
                        });
                    }
                    bal.heldback_cents -= amount_cents;
                    bal.available_cents += amount_cents;
                }
                LedgerOp::HoldbackRefund { agent_id, currency, amount_cents, refund_to_agent_id } => {
                    {
                        let w = wallets.get_mut(&agent_id).expect("preloaded");
                        let bal = w.balance_mut(currency);
                        if bal.heldback_cents < amount_cents {
                            return Err(NooterraError::InsufficientHeldback {
                                need: amount_cents,
                                have: bal.heldback_cents,
                            });
                        }
                        bal.heldback_cents -= amount_cents;
                    }
                    let w = wallets.get_mut(&refund_to_agent_id).expect("preloaded");
                    w.balance_mut(currency).available_cents += amount_cents;
                }
                LedgerOp::GrantUpsert(g) => grants.push(g),
                LedgerOp::GateUpsert(g) => gates.push(g),
                LedgerOp::HoldUpsert(h) => holds.push(h),
                LedgerOp::CaseUpsert(c) => cases.push(c),
                LedgerOp::VerdictUpsert(v) => verdicts.push(v),
                LedgerOp::AdjustmentUpsert(a) => adjustments.push(a),
                LedgerOp::SettlementBindingUpsert(b) => bindings.push(b),
                LedgerOp::EventAppend { stream_id, kind, actor, payload } => {
                    staged_events.push((stream_id, kind, actor, payload));
                }
            }
        }

        // Persist entity upserts.
        for a in &agents {
            Self::put_json(&self.trees.agents, &scoped(tenant, a.agent_id.as_str()), a)?;
        }
        for (agent_id, wallet) in &wallets {
            Self::put_json(&self.trees.wallets, &scoped(tenant, agent_id.as_str()), wallet)?;
        }
        for g in &grants {
            Self::put_json(&self.trees.grants, &scoped(tenant, g.grant_id.as_str()), g)?;
        }
        for g in &gates {
            Self::put_json(&self.trees.gates, &scoped(tenant, g.gate_id.as_str()), g)?;
        }
        for h in &holds {
            Self::put_json(&self.trees.holds, &scoped(tenant, h.hold_hash.as_str()), h)?;
        }
        for c in &cases {
            Self::put_json(&self.trees.cases, &scoped(tenant, c.case_id.as_str()), c)?;
        }
        for v in &verdicts {
            Self::put_json(&self.trees.verdicts, &scoped(tenant, v.case_id.as_str()), v)?;
        }
        for a in &adjustments {
            Self::put_json(&self.trees.adjustments, &scoped(tenant, &a.adjustment_id), a)?;
        }
        for b in &bindings {
            Self::put_json(&self.trees.bindings, &scoped(tenant, &b.agreement_hash), b)?;
        }

        // Append events, per-stream chain-linked in op-list order.
        for (stream_id, kind, actor, payload) in staged_events {
            let guard = self.stream_locks.acquire(&stream_id);
            let event = guard.with(|| -> Result<Event> {
                let tip = self.next_stream_tip(tenant, &stream_id)?;
                let event_id = format!("evt_{}", uuid_like(now, &stream_id));
                let event = self.chainer.build_event(
                    event_id.into(),
                    stream_id.clone(),
                    kind,
                    actor,
                    payload,
                    tip.as_ref().map(|e| e.chain_hash.as_str()),
                )?;
                let seq = self.next_event_seq(tenant, &stream_id)?;
                let key = format!("{}:{}:{:020}", tenant.as_str(), stream_id.as_str(), seq);
                Self::put_json(&self.trees.events, &key, &event)?;
                Ok(event)
            })?;
            debug!(stream_id = %event.stream_id, event_id = %event.id, "appended event");
            receipt.event_ids.push(event.id.to_string());
        }

        info!(tenant = %tenant, ops = receipt.event_ids.len(), "commitTx applied");
        Ok(receipt)
    }
}

/// A process-unique, monotonically distinguishable suffix for event ids.
/// Not a cryptographic id — uniqueness within a stream comes from the
/// sequence counter, this only keeps ids readable.
fn uuid_like(now: Timestamp, stream_id: &StreamId) -> String {
    static COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    format!("{now}_{}_{n}", stream_id.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nooterra_core::clock::FixedClock;
    use nooterra_core::event::EventPayload;
    use nooterra_core::gate::{GateState, X402Gate};
    use nooterra_core::types::Currency;
    use nooterra_crypto::KeyPair;

    fn store() -> InMemoryStore {
        let clock = Arc::new(FixedClock::new(1_000));
        let signer = Arc::new(KeyPair::generate());
        InMemoryStore::open_temp(clock, signer).unwrap()
    }

    fn gate(grant_id: &GrantId, gate_id: &str) -> X402Gate {
        X402Gate {
            gate_id: GateId::new(gate_id),
            payer_agent_id: AgentId::new("payer"),
            payee_agent_id: AgentId::new("payee"),
            tool_id: "tool.search".into(),
            amount_cents: 100,
            currency: Currency::Usd,
            authority_grant_ref: grant_id.clone(),
            state: GateState::Created,
            holdback_bps: 0,
            challenge_window_ms: 0,
            created_at: 0,
        }
    }

    #[test]
    fn wallet_escrow_lock_and_release_round_trip() {
        let store = store();
        let tenant = TenantId::new("t1");
        let payer = AgentId::new("payer");
        let payee = AgentId::new("payee");

        store
            .commit(
                &tenant,
                vec![LedgerOp::WalletCredit {
                    agent_id: payer.clone(),
                    currency: Currency::Usd,
                    amount_cents: 500,
                }],
            )
            .unwrap();

        store
            .commit(
                &tenant,
                vec![LedgerOp::EscrowLock {
                    agent_id: payer.clone(),
                    currency: Currency::Usd,
                    amount_cents: 300,
                }],
            )
            .unwrap();

        let payer_wallet = store.get_wallet(&tenant, &payer).unwrap();
        assert_eq!(payer_wallet.balance(Currency::Usd).available_cents, 200);
        assert_eq!(payer_wallet.balance(Currency::Usd).escrow_locked_cents, 300);

        store
            .commit(
                &tenant,
                vec![LedgerOp::EscrowRelease {
                    agent_id: payer.clone(),
                    currency: Currency::Usd,
                    amount_cents: 300,
                    to_agent_id: payee.clone(),
                }],
            )
            .unwrap();

        let payer_wallet = store.get_wallet(&tenant, &payer).unwrap();
        let payee_wallet = store.get_wallet(&tenant, &payee).unwrap();
        assert_eq!(payer_wallet.balance(Currency::Usd).escrow_locked_cents, 0);
        assert_eq!(payee_wallet.balance(Currency::Usd).available_cents, 300);
    }

    #[test]
    fn escrow_lock_rejects_insufficient_available() {
        let store = store();
        let tenant = TenantId::new("t1");
        let payer = AgentId::new("payer");

        let err = store
            .commit(
                &tenant,
                vec![LedgerOp::EscrowLock {
                    agent_id: payer,
                    currency: Currency::Usd,
                    amount_cents: 50,
                }],
            )
            .unwrap_err();
        assert!(matches!(err, NooterraError::InsufficientAvailable { .. }));
    }

    #[test]
    fn gates_for_grant_does_not_leak_across_tenants() {
        let store = store();
        let tenant_a = TenantId::new("tenant-a");
        let tenant_b = TenantId::new("tenant-b");
        let grant = GrantId::new("grant-1");

        store
            .commit(&tenant_a, vec![LedgerOp::GateUpsert(gate(&grant, "gate-a"))])
            .unwrap();
        store
            .commit(&tenant_b, vec![LedgerOp::GateUpsert(gate(&grant, "gate-b"))])
            .unwrap();

        let gates_a = store.gates_for_grant(&tenant_a, &grant).unwrap();
        let gates_b = store.gates_for_grant(&tenant_b, &grant).unwrap();

        assert_eq!(gates_a.len(), 1);
        assert_eq!(gates_a[0].gate_id.as_str(), "gate-a");
        assert_eq!(gates_b.len(), 1);
        assert_eq!(gates_b[0].gate_id.as_str(), "gate-b");
    }

    #[test]
    fn event_append_chains_within_stream() {
        let store = store();
        let tenant = TenantId::new("t1");
        let stream = StreamId::new("stream-1");

        store
            .commit(
                &tenant,
                vec![LedgerOp::EventAppend {
                    stream_id: stream.clone(),
                    kind: "TEST_EVENT".into(),
                    actor: "agent:payer".into(),
                    payload: EventPayload::Other {
                        kind: "test".into(),
                        data: serde_json::json!({"n": 1}),
                    },
                }],
            )
            .unwrap();
        store
            .commit(
                &tenant,
                vec![LedgerOp::EventAppend {
                    stream_id: stream.clone(),
                    kind: "TEST_EVENT".into(),
                    actor: "agent:payer".into(),
                    payload: EventPayload::Other {
                        kind: "test".into(),
                        data: serde_json::json!({"n": 2}),
                    },
                }],
            )
            .unwrap();

        let events = store.stream_events(&tenant, &stream).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].prev_chain_hash.is_none());
        assert_eq!(events[1].prev_chain_hash.as_deref(), Some(events[0].chain_hash.as_str()));
    }
}
