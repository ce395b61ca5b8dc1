//! The x402 gate state machine (spec §4.3), grounded in the teacher's
//! `StateEngine::apply_action` dispatch: one method per transition,
//! preconditions validated before any mutation, the mutation itself
//! delegated to [`nooterra_ledger::LedgerEngine`] / `Store::commit`.

use std::sync::Arc;

use tracing::{debug, info, warn};

use nooterra_core::error::{NooterraError, Result};
use nooterra_core::event::EventPayload;
use nooterra_core::gate::{GateState, X402Gate};
use nooterra_core::hold::{HoldStatus, ToolCallHold};
use nooterra_core::types::{AgentId, Cents, Currency, GateId, GrantId, HoldHash, StreamId, TenantId, Timestamp};
use nooterra_crypto::sha256_hex;
use nooterra_ledger::LedgerEngine;
use nooterra_store::{LedgerOp, Store, TxReceipt};

use crate::grant_validator::{AuthorityGrantValidator, GrantCheck};
use crate::lifecycle::check_lifecycle;

/// The outcome a `verify` call asserts for an executed gate, plus the
/// agreement/receipt refs a resulting hold is bound to.
pub enum VerifyOutcome {
    Green { agreement_hash: String, receipt_hash: String },
    Red,
}

pub struct X402GateMachine {
    store: Arc<dyn Store>,
    ledger: LedgerEngine,
    grants: AuthorityGrantValidator,
}

impl X402GateMachine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            ledger: LedgerEngine::new(store.clone()),
            grants: AuthorityGrantValidator::new(store.clone()),
            store,
        }
    }

    fn require_gate(&self, tenant: &TenantId, gate_id: &GateId) -> Result<X402Gate> {
        self.store
            .get_gate(tenant, gate_id)?
            .ok_or_else(|| NooterraError::UnknownGate(gate_id.to_string()))
    }

    fn require_agent(&self, tenant: &TenantId, agent_id: &AgentId) -> Result<()> {
        let agent = self
            .store
            .get_agent(tenant, agent_id)?
            .ok_or_else(|| NooterraError::UnknownAgent(agent_id.to_string()))?;
        check_lifecycle(&agent)
    }

    fn expect_state(&self, gate: &X402Gate, want: GateState, event: &str) -> Result<()> {
        if gate.state != want {
            return Err(NooterraError::InvalidGateTransition {
                from: format!("{:?}", gate.state),
                event: event.into(),
            });
        }
        Ok(())
    }

    /// `created` — stages a new gate, no funds movement yet.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &self,
        tenant: &TenantId,
        gate_id: GateId,
        payer_agent_id: AgentId,
        payee_agent_id: AgentId,
        tool_id: impl Into<String>,
        amount_cents: Cents,
        currency: Currency,
        authority_grant_ref: GrantId,
        holdback_bps: u32,
        challenge_window_ms: i64,
        now: Timestamp,
    ) -> Result<TxReceipt> {
        if amount_cents == 0 {
            return Err(NooterraError::ZeroAmount);
        }
        self.require_agent(tenant, &payer_agent_id)?;
        self.require_agent(tenant, &payee_agent_id)?;
        let gate = X402Gate {
            gate_id: gate_id.clone(),
            payer_agent_id,
            payee_agent_id,
            tool_id: tool_id.into(),
            amount_cents,
            currency,
            authority_grant_ref,
            state: GateState::Created,
            holdback_bps,
            challenge_window_ms,
            created_at: now,
        };
        let receipt = self.store.commit(
            tenant,
            vec![
                LedgerOp::GateUpsert(gate),
                LedgerOp::EventAppend {
                    stream_id: StreamId::new(format!("gate_{gate_id}")),
                    kind: "GATE_CREATED".into(),
                    actor: format!("agent:{gate_id}"),
                    payload: EventPayload::GateCreated {
                        gate_id: gate_id.to_string(),
                    },
                },
            ],
        )?;
        info!(%tenant, %gate_id, "gate created");
        Ok(receipt)
    }

    /// `created -> authorized`: authority grant + lifecycle + balance checks,
    /// no mutation beyond the state flip.
    pub fn authorize_payment(&self, tenant: &TenantId, gate_id: &GateId, now: Timestamp) -> Result<TxReceipt> {
        let mut gate = self.require_gate(tenant, gate_id)?;
        self.expect_state(&gate, GateState::Created, "authorize-payment")?;

        self.require_agent(tenant, &gate.payer_agent_id)?;
        self.require_agent(tenant, &gate.payee_agent_id)?;

        let grant = self.grants.load(tenant, &gate.authority_grant_ref)?;
        self.grants.authorize(
            tenant,
            &grant,
            &GrantCheck {
                payer_agent_id: &gate.payer_agent_id,
                provider_id: &gate.payee_agent_id.to_string(),
                tool_id: &gate.tool_id,
                risk_class: "default",
                side_effecting: false,
                amount_cents: gate.amount_cents,
            },
            now,
        )?;

        let wallet = self.ledger.wallet(tenant, &gate.payer_agent_id)?;
        let available = wallet.balance(gate.currency).available_cents;
        if available < gate.amount_cents {
            return Err(NooterraError::InsufficientAvailable {
                need: gate.amount_cents,
                have: available,
            });
        }

        gate.state = GateState::Authorized;
        let grant_id = gate.authority_grant_ref.clone();
        let gate_id = gate.gate_id.clone();
        let receipt = self.store.commit(
            tenant,
            vec![
                LedgerOp::GateUpsert(gate),
                LedgerOp::EventAppend {
                    stream_id: StreamId::new(format!("gate_{gate_id}")),
                    kind: "GATE_AUTHORIZED".into(),
                    actor: format!("agent:{gate_id}"),
                    payload: EventPayload::GateAuthorized {
                        gate_id: gate_id.to_string(),
                        grant_id: grant_id.to_string(),
                    },
                },
            ],
        )?;
        info!(%tenant, %gate_id, "gate authorized");
        Ok(receipt)
    }

    /// `authorized -> executed`: locks the payer's escrow for `amountCents`.
    pub fn execute(&self, tenant: &TenantId, gate_id: &GateId, now: Timestamp) -> Result<TxReceipt> {
        let mut gate = self.require_gate(tenant, gate_id)?;
        self.expect_state(&gate, GateState::Authorized, "execute")?;
        self.require_agent(tenant, &gate.payer_agent_id)?;
        self.require_agent(tenant, &gate.payee_agent_id)?;
        let _ = now;

        gate.state = GateState::Executed;
        let payer = gate.payer_agent_id.clone();
        let currency = gate.currency;
        let amount = gate.amount_cents;
        let gate_id = gate.gate_id.clone();
        let receipt = self.store.commit(
            tenant,
            vec![
                LedgerOp::EscrowLock {
                    agent_id: payer,
                    currency,
                    amount_cents: amount,
                },
                LedgerOp::GateUpsert(gate),
                LedgerOp::EventAppend {
                    stream_id: StreamId::new(format!("gate_{gate_id}")),
                    kind: "GATE_EXECUTED".into(),
                    actor: format!("agent:{gate_id}"),
                    payload: EventPayload::GateExecuted {
                        gate_id: gate_id.to_string(),
                    },
                },
            ],
        )?;
        info!(%tenant, %gate_id, amount, "gate executed, escrow locked");
        Ok(receipt)
    }

    /// `executed -> released|held|refunded` per the outcome asserted.
    pub fn verify(
        &self,
        tenant: &TenantId,
        gate_id: &GateId,
        outcome: VerifyOutcome,
        now: Timestamp,
    ) -> Result<TxReceipt> {
        let mut gate = self.require_gate(tenant, gate_id)?;
        self.expect_state(&gate, GateState::Executed, "verify")?;
        self.require_agent(tenant, &gate.payer_agent_id)?;
        self.require_agent(tenant, &gate.payee_agent_id)?;

        match outcome {
            VerifyOutcome::Red => {
                gate.state = GateState::Refunded;
                let payer = gate.payer_agent_id.clone();
                let currency = gate.currency;
                let amount = gate.amount_cents;
                let gate_id = gate.gate_id.clone();
                let receipt = self.store.commit(
                    tenant,
                    vec![
                        LedgerOp::EscrowRefund {
                            agent_id: payer,
                            currency,
                            amount_cents: amount,
                        },
                        LedgerOp::GateUpsert(gate),
                        LedgerOp::EventAppend {
                            stream_id: StreamId::new(format!("gate_{gate_id}")),
                            kind: "GATE_VERIFIED".into(),
                            actor: format!("agent:{gate_id}"),
                            payload: EventPayload::GateVerified {
                                gate_id: gate_id.to_string(),
                                outcome: "red".into(),
                            },
                        },
                    ],
                )?;
                warn!(%tenant, %gate_id, "gate verified red, escrow refunded");
                Ok(receipt)
            }
            VerifyOutcome::Green { agreement_hash, receipt_hash } => {
                if gate.holdback_bps == 0 {
                    gate.state = GateState::Released;
                    let payer = gate.payer_agent_id.clone();
                    let payee = gate.payee_agent_id.clone();
                    let currency = gate.currency;
                    let amount = gate.amount_cents;
                    let gate_id = gate.gate_id.clone();
                    let receipt = self.store.commit(
                        tenant,
                        vec![
                            LedgerOp::EscrowRelease {
                                agent_id: payer,
                                currency,
                                amount_cents: amount,
                                to_agent_id: payee,
                            },
                            LedgerOp::GateUpsert(gate),
                            LedgerOp::EventAppend {
                                stream_id: StreamId::new(format!("gate_{gate_id}")),
                                kind: "GATE_VERIFIED".into(),
                                actor: format!("agent:{gate_id}"),
                                payload: EventPayload::GateVerified {
                                    gate_id: gate_id.to_string(),
                                    outcome: "green".into(),
                                },
                            },
                        ],
                    )?;
                    info!(%tenant, %gate_id, amount, "gate verified green, released in full");
                    Ok(receipt)
                } else {
                    let held_amount = gate.amount_cents * u64::from(gate.holdback_bps) / 10_000;
                    let released_amount = gate.amount_cents - held_amount;
                    let challenge_deadline = now + gate.challenge_window_ms;

                    let hold_hash = HoldHash::new(sha256_hex(
                        format!(
                            "{}|{}|{}|{}|{}|{}",
                            agreement_hash, receipt_hash, held_amount, gate.currency, gate.payer_agent_id, gate.payee_agent_id
                        )
                        .as_bytes(),
                    ));
                    let hold = ToolCallHold {
                        hold_hash: hold_hash.clone(),
                        agreement_hash,
                        receipt_hash,
                        payer_agent_id: gate.payer_agent_id.clone(),
                        payee_agent_id: gate.payee_agent_id.clone(),
                        held_amount_cents: held_amount,
                        total_amount_cents: gate.amount_cents,
                        currency: gate.currency,
                        challenge_deadline,
                        status: HoldStatus::Held,
                    };

                    gate.state = GateState::Held;
                    let payer = gate.payer_agent_id.clone();
                    let payee = gate.payee_agent_id.clone();
                    let currency = gate.currency;
                    let gate_id = gate.gate_id.clone();

                    self.ledger
                        .release_with_holdback(tenant, &payer, &payee, currency, released_amount, held_amount)?;

                    let receipt = self.store.commit(
                        tenant,
                        vec![
                            LedgerOp::HoldUpsert(hold),
                            LedgerOp::GateUpsert(gate),
                            LedgerOp::EventAppend {
                                stream_id: StreamId::new(format!("gate_{gate_id}")),
                                kind: "GATE_VERIFIED".into(),
                                actor: format!("agent:{gate_id}"),
                                payload: EventPayload::GateVerified {
                                    gate_id: gate_id.to_string(),
                                    outcome: "green_holdback".into(),
                                },
                            },
                            LedgerOp::EventAppend {
                                stream_id: StreamId::new(format!("hold_{hold_hash}")),
                                kind: "HOLD_CREATED".into(),
                                actor: format!("agent:{gate_id}"),
                                payload: EventPayload::HoldCreated {
                                    hold_hash: hold_hash.to_string(),
                                },
                            },
                        ],
                    )?;
                    debug!(%tenant, %gate_id, held_amount, released_amount, "gate verified green, holdback created");
                    Ok(receipt)
                }
            }
        }
    }

    /// `/x402/gate/agents/{id}/lifecycle`: flips an agent's lifecycle status.
    pub fn set_agent_lifecycle(
        &self,
        tenant: &TenantId,
        agent_id: &AgentId,
        status: nooterra_core::types::LifecycleStatus,
    ) -> Result<TxReceipt> {
        let mut agent = self
            .store
            .get_agent(tenant, agent_id)?
            .ok_or_else(|| NooterraError::UnknownAgent(agent_id.to_string()))?;
        agent.lifecycle_status = status;
        let receipt = self.store.commit(tenant, vec![LedgerOp::AgentUpsert(agent)])?;
        info!(%tenant, %agent_id, ?status, "agent lifecycle updated");
        Ok(receipt)
    }
}

/// Thin façade matching each `/x402/gate/*` endpoint's semantics 1:1
/// (spec §6). Currently identical to [`X402GateMachine`]; kept as a
/// distinct name so callers depend on the API surface, not the engine.
pub type GateApi = X402GateMachine;

#[cfg(test)]
mod tests {
    use super::*;
    use nooterra_core::clock::FixedClock;
    use nooterra_core::grant::{AuthorityGrant, ChainBinding, GrantScope, Revocation, SpendEnvelope, Validity};
    use nooterra_core::model::Agent;
    use nooterra_core::types::{Currency, PrincipalRef};
    use nooterra_crypto::KeyPair;

    fn harness() -> (X402GateMachine, Arc<dyn Store>, TenantId) {
        let clock = Arc::new(FixedClock::new(1_000));
        let signer = Arc::new(KeyPair::generate());
        let store: Arc<dyn Store> = Arc::new(nooterra_store::InMemoryStore::open_temp(clock, signer).unwrap());
        (X402GateMachine::new(store.clone()), store, TenantId::new("t1"))
    }

    fn seed_grant(store: &Arc<dyn Store>, tenant: &TenantId, payer: &AgentId, max_total: Cents) -> GrantId {
        let grant_id = GrantId::new("grant-1");
        let grant = AuthorityGrant {
            grant_id: grant_id.clone(),
            principal_ref: PrincipalRef::new("principal-1"),
            grantee_agent_id: payer.clone(),
            scope: GrantScope {
                allowed_provider_ids: vec![],
                allowed_tool_ids: vec![],
                allowed_risk_classes: vec![],
                side_effecting_allowed: true,
            },
            spend_envelope: SpendEnvelope {
                currency: Currency::Usd,
                max_per_call_cents: 100_000,
                max_total_cents: max_total,
            },
            chain_binding: ChainBinding {
                depth: 0,
                max_delegation_depth: 8,
            },
            validity: Validity {
                issued_at: 0,
                not_before: 0,
                expires_at: None,
            },
            revocation: Revocation::default(),
            grant_hash: "0".repeat(64),
            signer_key_id: "key1".into(),
            signature: "sig".into(),
        };
        store
            .commit(tenant, vec![LedgerOp::GrantUpsert(grant)])
            .unwrap();
        grant_id
    }

    fn seed_agents_and_funds(store: &Arc<dyn Store>, tenant: &TenantId, payer: &AgentId, payee: &AgentId) {
        let ledger = LedgerEngine::new(store.clone());
        ledger
            .register_agent(tenant, Agent::new(payer.as_str(), tenant.as_str(), "Payer", "owner"))
            .unwrap();
        ledger
            .register_agent(tenant, Agent::new(payee.as_str(), tenant.as_str(), "Payee", "owner"))
            .unwrap();
        ledger.credit(tenant, payer, Currency::Usd, 10_000).unwrap();
    }

    #[test]
    fn full_lifecycle_green_no_holdback_releases_immediately() {
        let (machine, store, tenant) = harness();
        let payer = AgentId::new("payer");
        let payee = AgentId::new("payee");
        seed_agents_and_funds(&store, &tenant, &payer, &payee);
        let grant_id = seed_grant(&store, &tenant, &payer, 10_000);
        let gate_id = GateId::new("gate-1");

        machine
            .create(&tenant, gate_id.clone(), payer.clone(), payee.clone(), "tool.search", 5_000, Currency::Usd, grant_id, 0, 0, 1_000)
            .unwrap();
        machine.authorize_payment(&tenant, &gate_id, 1_000).unwrap();
        machine.execute(&tenant, &gate_id, 1_000).unwrap();
        machine
            .verify(
                &tenant,
                &gate_id,
                VerifyOutcome::Green {
                    agreement_hash: "a".into(),
                    receipt_hash: "r".into(),
                },
                1_000,
            )
            .unwrap();

        let gate = store.get_gate(&tenant, &gate_id).unwrap().unwrap();
        assert_eq!(gate.state, GateState::Released);
        let ledger = LedgerEngine::new(store.clone());
        assert_eq!(ledger.wallet(&tenant, &payee).unwrap().balance(Currency::Usd).available_cents, 5_000);
    }

    #[test]
    fn green_with_holdback_creates_hold() {
        let (machine, store, tenant) = harness();
        let payer = AgentId::new("payer");
        let payee = AgentId::new("payee");
        seed_agents_and_funds(&store, &tenant, &payer, &payee);
        let grant_id = seed_grant(&store, &tenant, &payer, 10_000);
        let gate_id = GateId::new("gate-1");

        machine
            .create(&tenant, gate_id.clone(), payer, payee.clone(), "tool.search", 10_000, Currency::Usd, grant_id, 2_000, 86_400_000, 1_000)
            .unwrap();
        machine.authorize_payment(&tenant, &gate_id, 1_000).unwrap();
        machine.execute(&tenant, &gate_id, 1_000).unwrap();
        machine
            .verify(
                &tenant,
                &gate_id,
                VerifyOutcome::Green {
                    agreement_hash: "a".into(),
                    receipt_hash: "r".into(),
                },
                1_000,
            )
            .unwrap();

        let gate = store.get_gate(&tenant, &gate_id).unwrap().unwrap();
        assert_eq!(gate.state, GateState::Held);
        let ledger = LedgerEngine::new(store.clone());
        let wallet = ledger.wallet(&tenant, &payee).unwrap();
        assert_eq!(wallet.balance(Currency::Usd).available_cents, 8_000);
        assert_eq!(wallet.balance(Currency::Usd).heldback_cents, 2_000);
    }

    #[test]
    fn red_verify_refunds_payer() {
        let (machine, store, tenant) = harness();
        let payer = AgentId::new("payer");
        let payee = AgentId::new("payee");
        seed_agents_and_funds(&store, &tenant, &payer, &payee);
        let grant_id = seed_grant(&store, &tenant, &payer, 10_000);
        let gate_id = GateId::new("gate-1");

        machine
            .create(&tenant, gate_id.clone(), payer.clone(), payee, "tool.search", 3_000, Currency::Usd, grant_id, 0, 0, 1_000)
            .unwrap();
        machine.authorize_payment(&tenant, &gate_id, 1_000).unwrap();
        machine.execute(&tenant, &gate_id, 1_000).unwrap();
        machine.verify(&tenant, &gate_id, VerifyOutcome::Red, 1_000).unwrap();

        let gate = store.get_gate(&tenant, &gate_id).unwrap().unwrap();
        assert_eq!(gate.state, GateState::Refunded);
        let ledger = LedgerEngine::new(store.clone());
        assert_eq!(ledger.wallet(&tenant, &payer).unwrap().balance(Currency::Usd).available_cents, 10_000);
    }

    #[test]
    fn suspended_payee_blocks_execute_and_suspended_payer_blocks_verify() {
        let (machine, store, tenant) = harness();
        let payer = AgentId::new("payer");
        let payee = AgentId::new("payee");
        seed_agents_and_funds(&store, &tenant, &payer, &payee);
        let grant_id = seed_grant(&store, &tenant, &payer, 10_000);
        let gate_id = GateId::new("gate-1");

        machine
            .create(&tenant, gate_id.clone(), payer.clone(), payee.clone(), "tool.search", 3_000, Currency::Usd, grant_id, 0, 0, 1_000)
            .unwrap();
        machine.authorize_payment(&tenant, &gate_id, 1_000).unwrap();

        let mut suspended_payee = store.get_agent(&tenant, &payee).unwrap().unwrap();
        suspended_payee.lifecycle_status = nooterra_core::types::LifecycleStatus::Suspended;
        store.commit(&tenant, vec![LedgerOp::AgentUpsert(suspended_payee)]).unwrap();

        let err = machine.execute(&tenant, &gate_id, 1_000).unwrap_err();
        assert_eq!(err.code(), "X402_AGENT_SUSPENDED");

        let mut reactivated_payee = store.get_agent(&tenant, &payee).unwrap().unwrap();
        reactivated_payee.lifecycle_status = nooterra_core::types::LifecycleStatus::Active;
        store.commit(&tenant, vec![LedgerOp::AgentUpsert(reactivated_payee)]).unwrap();
        machine.execute(&tenant, &gate_id, 1_000).unwrap();

        let mut suspended_payer = store.get_agent(&tenant, &payer).unwrap().unwrap();
        suspended_payer.lifecycle_status = nooterra_core::types::LifecycleStatus::Suspended;
        store.commit(&tenant, vec![LedgerOp::AgentUpsert(suspended_payer)]).unwrap();

        let err = machine
            .verify(
                &tenant,
                &gate_id,
                VerifyOutcome::Green {
                    agreement_hash: "a".into(),
                    receipt_hash: "r".into(),
                },
                1_000,
            )
            .unwrap_err();
        assert_eq!(err.code(), "X402_AGENT_SUSPENDED");
    }

    #[test]
    fn authorize_rejects_over_total_cap() {
        let (machine, store, tenant) = harness();
        let payer = AgentId::new("payer");
        let payee = AgentId::new("payee");
        seed_agents_and_funds(&store, &tenant, &payer, &payee);
        let grant_id = seed_grant(&store, &tenant, &payer, 1_000);
        let gate_id = GateId::new("gate-1");

        machine
            .create(&tenant, gate_id.clone(), payer, payee, "tool.search", 5_000, Currency::Usd, grant_id, 0, 0, 1_000)
            .unwrap();
        let err = machine.authorize_payment(&tenant, &gate_id, 1_000).unwrap_err();
        assert_eq!(err.code(), "X402_AUTHORITY_GRANT_TOTAL_EXCEEDED");
    }
}
