//! End-to-end reproduction of the authority-grant-exceed scenario: a grant
//! capped at `maxPerCallCents=400, maxTotalCents=600` rejects a too-large
//! single call, then a call that would push the running total over the
//! cap, then everything once the grant is revoked.

use std::sync::Arc;

use nooterra_core::clock::FixedClock;
use nooterra_core::gate::GateState;
use nooterra_core::grant::{AuthorityGrant, ChainBinding, GrantScope, Revocation, SpendEnvelope, Validity};
use nooterra_core::model::Agent;
use nooterra_core::types::{AgentId, Currency, GateId, GrantId, PrincipalRef, TenantId};
use nooterra_crypto::KeyPair;
use nooterra_gate::GateApi;
use nooterra_ledger::LedgerEngine;
use nooterra_store::{InMemoryStore, LedgerOp, Store};

fn grant(max_per_call: u64, max_total: u64) -> AuthorityGrant {
    AuthorityGrant {
        grant_id: GrantId::new("grant-1"),
        principal_ref: PrincipalRef::new("principal-1"),
        grantee_agent_id: AgentId::new("payer"),
        scope: GrantScope {
            allowed_provider_ids: vec![],
            allowed_tool_ids: vec![],
            allowed_risk_classes: vec![],
            side_effecting_allowed: true,
        },
        spend_envelope: SpendEnvelope {
            currency: Currency::Usd,
            max_per_call_cents: max_per_call,
            max_total_cents: max_total,
        },
        chain_binding: ChainBinding { depth: 0, max_delegation_depth: 8 },
        validity: Validity { issued_at: 0, not_before: 0, expires_at: None },
        revocation: Revocation::default(),
        grant_hash: "0".repeat(64),
        signer_key_id: "key1".into(),
        signature: "sig".into(),
    }
}

#[test]
fn authority_grant_exceed_sequence() {
    let clock = Arc::new(FixedClock::new(1_000));
    let signer = Arc::new(KeyPair::generate());
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::open_temp(clock, signer).unwrap());
    let tenant = TenantId::new("t1");
    let machine = GateApi::new(store.clone());
    let ledger = LedgerEngine::new(store.clone());

    let payer = AgentId::new("payer");
    let payee = AgentId::new("payee");
    ledger.register_agent(&tenant, Agent::new(payer.as_str(), tenant.as_str(), "Payer", "owner")).unwrap();
    ledger.register_agent(&tenant, Agent::new(payee.as_str(), tenant.as_str(), "Payee", "owner")).unwrap();
    ledger.credit(&tenant, &payer, Currency::Usd, 10_000).unwrap();

    store.commit(&tenant, vec![LedgerOp::GrantUpsert(grant(400, 600))]).unwrap();
    let grant_id = GrantId::new("grant-1");

    // Gate 1: 300, within both caps — authorizes, executes.
    let gate1 = GateId::new("gate-1");
    machine
        .create(&tenant, gate1.clone(), payer.clone(), payee.clone(), "tool.search", 300, Currency::Usd, grant_id.clone(), 0, 0, 1_000)
        .unwrap();
    machine.authorize_payment(&tenant, &gate1, 1_000).unwrap();
    machine.execute(&tenant, &gate1, 1_000).unwrap();
    assert_eq!(store.get_gate(&tenant, &gate1).unwrap().unwrap().state, GateState::Executed);

    // Gate 2: 500 exceeds maxPerCallCents=400 outright.
    let gate2 = GateId::new("gate-2");
    machine
        .create(&tenant, gate2.clone(), payer.clone(), payee.clone(), "tool.search", 500, Currency::Usd, grant_id.clone(), 0, 0, 1_000)
        .unwrap();
    let err = machine.authorize_payment(&tenant, &gate2, 1_000).unwrap_err();
    assert_eq!(err.code(), "X402_AUTHORITY_GRANT_PER_CALL_EXCEEDED");

    // Gate 3: 350 is within the per-call cap, but running total 300+350=650
    // exceeds maxTotalCents=600.
    let gate3 = GateId::new("gate-3");
    machine
        .create(&tenant, gate3.clone(), payer.clone(), payee.clone(), "tool.search", 350, Currency::Usd, grant_id.clone(), 0, 0, 1_000)
        .unwrap();
    let err = machine.authorize_payment(&tenant, &gate3, 1_000).unwrap_err();
    assert_eq!(err.code(), "X402_AUTHORITY_GRANT_TOTAL_EXCEEDED");

    // Revoke the grant; any further authorize fails closed regardless of caps.
    let mut revoked = store.get_grant(&tenant, &grant_id).unwrap().unwrap();
    revoked.revoke(1_000, "principal_requested");
    store.commit(&tenant, vec![LedgerOp::GrantUpsert(revoked)]).unwrap();

    let gate4 = GateId::new("gate-4");
    machine
        .create(&tenant, gate4.clone(), payer, payee, "tool.search", 100, Currency::Usd, grant_id, 0, 0, 1_000)
        .unwrap();
    let err = machine.authorize_payment(&tenant, &gate4, 1_000).unwrap_err();
    assert_eq!(err.code(), "X402_AUTHORITY_GRANT_REVOKED");
}
