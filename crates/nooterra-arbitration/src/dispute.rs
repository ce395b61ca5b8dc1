//! Dispute-open validation and case creation (spec §4.4 "Opening a
//! dispute"). Mirrors the x402 gate machine's pattern: every precondition is
//! checked before any mutation, the mutation lands in one `commitTx`.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use nooterra_core::arbitration::{ArbitrationCase, CaseStatus, DisputeOpenEnvelope};
use nooterra_core::constants::{BINDING_EVIDENCE_PREFIX, PURPOSE_DISPUTE_OPEN};
use nooterra_core::error::{NooterraError, Result};
use nooterra_core::event::{EventPayload, GovernancePayload};
use nooterra_core::hold::HoldStatus;
use nooterra_core::types::{AgentId, CaseId, HoldHash, StreamId, TenantId};
use nooterra_crypto::canonical::to_canonical_bytes;
use nooterra_crypto::revocation::KeyStatusIndex;
use nooterra_crypto::{sha256_hex, verify, verifying_key_from_spki_pem};
use nooterra_store::{LedgerOp, Store};

/// An ops-initiated override of the challenge-window deadline check (spec
/// §4.4 step 3). Deliberately not part of the signed envelope: it is a
/// server-side decision, audited separately via an `OPS_AUDIT` governance
/// event rather than carried in anything the opener signs.
#[derive(Debug, Clone)]
pub struct AdminOverride {
    pub reason: String,
}

pub struct DisputeEngine {
    store: Arc<dyn Store>,
}

impl DisputeEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn canonical_envelope_hash(envelope: &DisputeOpenEnvelope) -> Result<String> {
        let mut value = serde_json::to_value(envelope).map_err(|e| NooterraError::Serialization(e.to_string()))?;
        let obj = value.as_object_mut().expect("envelope serializes to an object");
        obj.remove("signature");
        obj.remove("envelope_hash");
        let bytes = to_canonical_bytes(&value).map_err(|e| NooterraError::Canonicalization(e.to_string()))?;
        Ok(sha256_hex(&bytes))
    }

    /// Validates and applies a `DisputeOpenEnvelope.v1` against its bound
    /// hold, in the fail-closed order spec §4.4 prescribes. `arbiter_agent_id`
    /// is the arbiter assigned to this case — the spec leaves assignment
    /// unspecified, so it is supplied by the caller (ops layer / routing
    /// policy), not derived here.
    pub fn open(
        &self,
        tenant: &TenantId,
        envelope: DisputeOpenEnvelope,
        arbiter_agent_id: AgentId,
        admin_override: Option<AdminOverride>,
    ) -> Result<ArbitrationCase> {
        // 1. Canonical envelope hash matches envelopeHash.
        let computed_hash = Self::canonical_envelope_hash(&envelope)?;
        if computed_hash != envelope.envelope_hash {
            return Err(NooterraError::EnvelopeHashMismatch);
        }

        // 2. Signature verifies against signerKeyId, purpose "dispute_open",
        // key status active at openedAt.
        let opener = self
            .store
            .get_agent(tenant, &envelope.opened_by_agent_id)?
            .ok_or_else(|| NooterraError::UnknownAgent(envelope.opened_by_agent_id.to_string()))?;
        let key_record = opener
            .public_keys
            .iter()
            .find(|k| k.key_id == envelope.signer_key_id)
            .ok_or_else(|| NooterraError::DisputeInvalidSigner {
                reason: format!("unknown signer key {}", envelope.signer_key_id),
            })?;
        let verifying_key = verifying_key_from_spki_pem(&key_record.spki_pem).ok_or_else(|| {
            NooterraError::DisputeInvalidSigner {
                reason: "malformed signer public key".into(),
            }
        })?;
        let key_index = KeyStatusIndex::rebuild(&self.store.governance_events(tenant)?);
        if !key_index.is_active_at(&envelope.signer_key_id, envelope.opened_at) {
            return Err(NooterraError::DisputeInvalidSigner {
                reason: "signer key not active at openedAt".into(),
            });
        }
        let case_id = CaseId::new(ArbitrationCase::case_id_for(&envelope.agreement_hash));
        let context = json!({ "caseId": case_id.as_str() });
        let sig_ok = verify(&envelope.envelope_hash, &envelope.signature, &verifying_key, PURPOSE_DISPUTE_OPEN, &context)
            .map_err(|e| NooterraError::Canonicalization(e.to_string()))?;
        if !sig_ok {
            warn!(case_id = %case_id, "dispute-open signature failed verification");
            return Err(NooterraError::DisputeInvalidSigner {
                reason: "signature verification failed".into(),
            });
        }

        // 4. agreementHash/receiptHash/holdHash refer to an existing hold;
        // hold.status is held. Fetched here (ahead of step 3 in this
        // implementation) because step 3's deadline check reads the hold's
        // challengeDeadline.
        let hold = self
            .store
            .get_hold(tenant, &HoldHash::new(envelope.hold_hash.clone()))?
            .filter(|h| h.agreement_hash == envelope.agreement_hash && h.receipt_hash == envelope.receipt_hash)
            .ok_or_else(|| NooterraError::UnknownHold(envelope.hold_hash.clone()))?;
        if hold.status != HoldStatus::Held {
            return Err(NooterraError::HoldNotHeld(hold.hold_hash.to_string()));
        }

        // 3. openedAt <= challengeDeadline, unless admin override with a
        // reason (audited separately).
        let used_override = if envelope.opened_at > hold.challenge_deadline {
            match &admin_override {
                Some(o) if !o.reason.trim().is_empty() => true,
                _ => return Err(NooterraError::DisputeWindowExpired),
            }
        } else {
            false
        };

        // 5. Settlement binding-source exists.
        let binding = self
            .store
            .get_settlement_binding(tenant, &envelope.agreement_hash)?
            .ok_or(NooterraError::ToolCallBindingSourceRequired)?;

        // 6. Exactly one matching evidenceRefs entry, equal to the
        // binding-source hash.
        let matches: Vec<&String> = envelope
            .evidence_refs
            .iter()
            .filter(|r| r.starts_with(BINDING_EVIDENCE_PREFIX))
            .collect();
        match matches.as_slice() {
            [] => return Err(NooterraError::ToolCallOpenBindingEvidenceRequired),
            [single] => {
                let hex = single.trim_start_matches(BINDING_EVIDENCE_PREFIX);
                if hex != binding.request_sha256 {
                    return Err(NooterraError::ToolCallOpenBindingEvidenceMismatch);
                }
            }
            _ => return Err(NooterraError::ToolCallOpenBindingEvidenceMismatch),
        }

        // 7. No prior open case for this agreement.
        if self.store.case_for_agreement(tenant, &envelope.agreement_hash)?.is_some() {
            return Err(NooterraError::DisputeAlreadyOpen);
        }

        let case = ArbitrationCase {
            case_id: case_id.clone(),
            agreement_hash: envelope.agreement_hash.clone(),
            receipt_hash: envelope.receipt_hash.clone(),
            hold_hash: envelope.hold_hash.clone(),
            opened_by: envelope.opened_by_agent_id.clone(),
            arbiter_agent_id,
            status: CaseStatus::UnderReview,
            evidence_refs: envelope.evidence_refs.clone(),
            revision: 1,
            dispute_open_envelope: envelope.clone(),
        };

        let mut disputed_hold = hold.clone();
        disputed_hold.status = HoldStatus::Disputed;

        let mut ops = vec![
            LedgerOp::CaseUpsert(case.clone()),
            LedgerOp::HoldUpsert(disputed_hold),
            LedgerOp::EventAppend {
                stream_id: StreamId::new(format!("case_{case_id}")),
                kind: "DISPUTE_OPENED".into(),
                actor: format!("agent:{}", envelope.opened_by_agent_id),
                payload: EventPayload::DisputeOpened {
                    case_id: case_id.to_string(),
                },
            },
        ];
        if used_override {
            let reason = admin_override.expect("checked above").reason;
            ops.push(LedgerOp::EventAppend {
                stream_id: StreamId::new(nooterra_core::constants::GOVERNANCE_STREAM_ID),
                kind: "GOVERNANCE".into(),
                actor: "ops".into(),
                payload: EventPayload::Governance(GovernancePayload::OpsAudit {
                    action: "dispute_open_admin_override".into(),
                    reason,
                }),
            });
        }

        self.store.commit(tenant, ops)?;
        info!(%tenant, case_id = %case_id, "arbitration case opened");
        Ok(case)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nooterra_core::clock::FixedClock;
    use nooterra_core::hold::ToolCallHold;
    use nooterra_core::model::{Agent, PublicKeyRecord};
    use nooterra_core::types::{Currency, Timestamp};
    use nooterra_crypto::{sign, spki_pem_from_verifying_key, KeyPair};
    use nooterra_store::ops::SettlementBinding;
    use nooterra_store::InMemoryStore;

    struct Harness {
        store: Arc<dyn Store>,
        tenant: TenantId,
        opener_key: KeyPair,
        hold: ToolCallHold,
    }

    fn harness() -> Harness {
        let clock = Arc::new(FixedClock::new(0));
        let signer = Arc::new(KeyPair::generate());
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::open_temp(clock, signer).unwrap());
        let tenant = TenantId::new("t1");

        let opener_key = KeyPair::generate();
        let mut opener = Agent::new("opener", tenant.as_str(), "Opener", "owner");
        opener.add_public_key(PublicKeyRecord {
            key_id: opener_key.key_id.clone(),
            spki_pem: spki_pem_from_verifying_key(&opener_key.verifying_key),
        });
        store.commit(&tenant, vec![LedgerOp::AgentUpsert(opener)]).unwrap();

        let agreement_hash = "1".repeat(64);
        let receipt_hash = "2".repeat(64);
        let hold = ToolCallHold {
            hold_hash: HoldHash::new("hold-1"),
            agreement_hash: agreement_hash.clone(),
            receipt_hash: receipt_hash.clone(),
            payer_agent_id: AgentId::new("payer"),
            payee_agent_id: AgentId::new("payee"),
            held_amount_cents: 2_000,
            total_amount_cents: 10_000,
            currency: Currency::Usd,
            challenge_deadline: 1_000,
            status: HoldStatus::Held,
        };
        store
            .commit(
                &tenant,
                vec![
                    LedgerOp::HoldUpsert(hold.clone()),
                    LedgerOp::SettlementBindingUpsert(SettlementBinding {
                        agreement_hash: agreement_hash.clone(),
                        request_sha256: "c".repeat(64),
                    }),
                ],
            )
            .unwrap();

        Harness { store, tenant, opener_key, hold }
    }

    fn signed_envelope(h: &Harness, opened_at: Timestamp, evidence_refs: Vec<String>) -> DisputeOpenEnvelope {
        let case_id = ArbitrationCase::case_id_for(&h.hold.agreement_hash);
        let mut envelope = DisputeOpenEnvelope {
            envelope_id: "denv-1".into(),
            case_id: CaseId::new(case_id.clone()),
            tenant_id: h.tenant.clone(),
            agreement_hash: h.hold.agreement_hash.clone(),
            receipt_hash: h.hold.receipt_hash.clone(),
            hold_hash: h.hold.hold_hash.to_string(),
            opened_by_agent_id: AgentId::new("opener"),
            opened_at,
            reason_code: "quality".into(),
            nonce: "n1".into(),
            evidence_refs,
            signer_key_id: h.opener_key.key_id.clone(),
            signature: String::new(),
            envelope_hash: String::new(),
        };
        envelope.envelope_hash = DisputeEngine::canonical_envelope_hash(&envelope).unwrap();
        let context = serde_json::json!({ "caseId": case_id });
        envelope.signature = sign(&envelope.envelope_hash, &h.opener_key, PURPOSE_DISPUTE_OPEN, &context).unwrap();
        envelope
    }

    #[test]
    fn opens_case_on_valid_envelope() {
        let h = harness();
        let engine = DisputeEngine::new(h.store.clone());
        let envelope = signed_envelope(&h, 500, vec![format!("{BINDING_EVIDENCE_PREFIX}{}", "c".repeat(64))]);

        let case = engine.open(&h.tenant, envelope, AgentId::new("arbiter-1"), None).unwrap();
        assert_eq!(case.status, CaseStatus::UnderReview);

        let hold = h.store.get_hold(&h.tenant, &h.hold.hold_hash).unwrap().unwrap();
        assert_eq!(hold.status, HoldStatus::Disputed);
    }

    #[test]
    fn reopening_a_disputed_hold_fails_not_held() {
        // Once a case exists the hold flips to `disputed`; a second open
        // attempt on the same agreement fails on the hold-status check
        // (spec step 4) before it would ever reach the already-open check
        // (step 7) — the two checks are mutually exclusive in practice
        // because opening always flips the hold in the same commit.
        let h = harness();
        let engine = DisputeEngine::new(h.store.clone());
        let refs = vec![format!("{BINDING_EVIDENCE_PREFIX}{}", "c".repeat(64))];
        engine
            .open(&h.tenant, signed_envelope(&h, 500, refs.clone()), AgentId::new("arbiter-1"), None)
            .unwrap();
        let err = engine
            .open(&h.tenant, signed_envelope(&h, 500, refs), AgentId::new("arbiter-1"), None)
            .unwrap_err();
        assert_eq!(err.code(), "HOLD_NOT_HELD");
    }

    #[test]
    fn rejects_open_when_case_already_exists_for_a_still_held_hold() {
        let h = harness();
        let engine = DisputeEngine::new(h.store.clone());
        let refs = vec![format!("{BINDING_EVIDENCE_PREFIX}{}", "c".repeat(64))];
        let envelope = signed_envelope(&h, 500, refs.clone());
        let preexisting = ArbitrationCase {
            case_id: CaseId::new(ArbitrationCase::case_id_for(&h.hold.agreement_hash)),
            agreement_hash: h.hold.agreement_hash.clone(),
            receipt_hash: h.hold.receipt_hash.clone(),
            hold_hash: h.hold.hold_hash.to_string(),
            opened_by: AgentId::new("opener"),
            arbiter_agent_id: AgentId::new("arbiter-1"),
            status: CaseStatus::UnderReview,
            evidence_refs: refs,
            revision: 1,
            dispute_open_envelope: envelope.clone(),
        };
        h.store.commit(&h.tenant, vec![LedgerOp::CaseUpsert(preexisting)]).unwrap();

        let err = engine
            .open(&h.tenant, envelope, AgentId::new("arbiter-1"), None)
            .unwrap_err();
        assert_eq!(err.code(), "DISPUTE_ALREADY_OPEN");
    }

    #[test]
    fn rejects_past_deadline_without_override() {
        let h = harness();
        let engine = DisputeEngine::new(h.store.clone());
        let refs = vec![format!("{BINDING_EVIDENCE_PREFIX}{}", "c".repeat(64))];
        let err = engine
            .open(&h.tenant, signed_envelope(&h, 2_000, refs), AgentId::new("arbiter-1"), None)
            .unwrap_err();
        assert_eq!(err.code(), "DISPUTE_WINDOW_EXPIRED");
    }

    #[test]
    fn admin_override_allows_past_deadline() {
        let h = harness();
        let engine = DisputeEngine::new(h.store.clone());
        let refs = vec![format!("{BINDING_EVIDENCE_PREFIX}{}", "c".repeat(64))];
        let case = engine
            .open(
                &h.tenant,
                signed_envelope(&h, 2_000, refs),
                AgentId::new("arbiter-1"),
                Some(AdminOverride { reason: "manual escalation".into() }),
            )
            .unwrap();
        assert_eq!(case.status, CaseStatus::UnderReview);
    }

    #[test]
    fn missing_binding_evidence_rejected() {
        let h = harness();
        let engine = DisputeEngine::new(h.store.clone());
        let err = engine
            .open(&h.tenant, signed_envelope(&h, 500, vec![]), AgentId::new("arbiter-1"), None)
            .unwrap_err();
        assert_eq!(err.code(), "X402_TOOL_CALL_OPEN_BINDING_EVIDENCE_REQUIRED");
    }

    #[test]
    fn tampered_signature_rejected() {
        let h = harness();
        let engine = DisputeEngine::new(h.store.clone());
        let mut envelope = signed_envelope(&h, 500, vec![format!("{BINDING_EVIDENCE_PREFIX}{}", "c".repeat(64))]);
        envelope.reason_code = "tampered".into();
        let err = engine.open(&h.tenant, envelope, AgentId::new("arbiter-1"), None).unwrap_err();
        assert_eq!(err.code(), "ENVELOPE_HASH_MISMATCH");
    }
}
