//! Verdict acceptance and settlement application (spec §4.4 "Accepting a
//! verdict", "Settlement adjustment").

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use nooterra_core::arbitration::{ArbitrationVerdict, CaseStatus, SettlementAdjustment};
use nooterra_core::constants::{BINDING_EVIDENCE_PREFIX, PURPOSE_ARBITRATION_VERDICT};
use nooterra_core::error::{NooterraError, Result};
use nooterra_core::event::EventPayload;
use nooterra_core::hold::HoldStatus;
use nooterra_core::types::{HoldHash, StreamId, TenantId, Timestamp};
use nooterra_crypto::canonical::to_canonical_bytes;
use nooterra_crypto::revocation::KeyStatusIndex;
use nooterra_crypto::{sha256_hex, verify, verifying_key_from_spki_pem};
use nooterra_store::{LedgerOp, Store};

use nooterra_gate::check_lifecycle;

use crate::settlement;

/// Result of [`VerdictEngine::accept`]. `already_existed` mirrors the
/// idempotence rule: a retried verdict with the same `caseId` resolves to
/// the adjustment already on file rather than re-running the ledger legs.
#[derive(Debug)]
pub struct AcceptOutcome {
    pub adjustment: SettlementAdjustment,
    pub already_existed: bool,
}

pub struct VerdictEngine {
    store: Arc<dyn Store>,
}

impl VerdictEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn canonical_verdict_hash(verdict: &ArbitrationVerdict) -> Result<String> {
        let mut value = serde_json::to_value(verdict).map_err(|e| NooterraError::Serialization(e.to_string()))?;
        let obj = value.as_object_mut().expect("verdict serializes to an object");
        obj.remove("signature");
        obj.remove("verdict_hash");
        let bytes = to_canonical_bytes(&value).map_err(|e| NooterraError::Canonicalization(e.to_string()))?;
        Ok(sha256_hex(&bytes))
    }

    pub fn accept(&self, tenant: &TenantId, verdict: ArbitrationVerdict, now: Timestamp) -> Result<AcceptOutcome> {
        // 1. Canonical verdictHash matches.
        let computed_hash = Self::canonical_verdict_hash(&verdict)?;
        if computed_hash != verdict.verdict_hash {
            return Err(NooterraError::EnvelopeHashMismatch);
        }

        // 2. Signature verifies under arbiter's currently-active key, purpose
        // "arbitration_verdict".
        let arbiter = self
            .store
            .get_agent(tenant, &verdict.arbiter_agent_id)?
            .ok_or_else(|| NooterraError::UnknownAgent(verdict.arbiter_agent_id.to_string()))?;
        let key_record = arbiter
            .public_keys
            .iter()
            .find(|k| k.key_id == verdict.signer_key_id)
            .ok_or_else(|| NooterraError::DisputeInvalidSigner {
                reason: format!("unknown signer key {}", verdict.signer_key_id),
            })?;
        let verifying_key = verifying_key_from_spki_pem(&key_record.spki_pem).ok_or_else(|| {
            NooterraError::DisputeInvalidSigner {
                reason: "malformed signer public key".into(),
            }
        })?;
        let key_index = KeyStatusIndex::rebuild(&self.store.governance_events(tenant)?);
        if !key_index.is_active_at(&verdict.signer_key_id, verdict.issued_at) {
            return Err(NooterraError::DisputeInvalidSigner {
                reason: "signer key not active at issuedAt".into(),
            });
        }
        let context = json!({ "caseId": verdict.case_id.as_str() });
        let sig_ok = verify(
            &verdict.verdict_hash,
            &verdict.signature,
            &verifying_key,
            PURPOSE_ARBITRATION_VERDICT,
            &context,
        )
        .map_err(|e| NooterraError::Canonicalization(e.to_string()))?;
        if !sig_ok {
            warn!(case_id = %verdict.case_id, "verdict signature failed verification");
            return Err(NooterraError::DisputeInvalidSigner {
                reason: "signature verification failed".into(),
            });
        }

        // 3. caseId under_review; arbiter matches case's designated arbiter.
        let case = self
            .store
            .get_case(tenant, &verdict.case_id)?
            .ok_or_else(|| NooterraError::UnknownCase(verdict.case_id.to_string()))?;
        if case.arbiter_agent_id != verdict.arbiter_agent_id {
            return Err(NooterraError::ArbiterMismatch(case.case_id.to_string()));
        }

        // A retried verdict for a case this engine already closed resolves to
        // the adjustment on file rather than re-checking `under_review` — the
        // case is closed precisely because that earlier accept succeeded.
        let adjustment_id = SettlementAdjustment::adjustment_id_for(&case.agreement_hash);
        if let Some(existing) = self.store.get_adjustment(tenant, &adjustment_id)? {
            return Ok(AcceptOutcome {
                adjustment: existing,
                already_existed: true,
            });
        }

        if case.status != CaseStatus::UnderReview {
            return Err(NooterraError::CaseNotUnderReview(case.case_id.to_string()));
        }

        // 4. evidenceRefs binding-hash, if present, must match the case's
        // binding-source.
        let binding_refs: Vec<&String> = verdict
            .evidence_refs
            .iter()
            .filter(|r| r.starts_with(BINDING_EVIDENCE_PREFIX))
            .collect();
        if !binding_refs.is_empty() {
            let binding = self
                .store
                .get_settlement_binding(tenant, &case.agreement_hash)?
                .ok_or(NooterraError::ToolCallBindingSourceRequired)?;
            let all_match = binding_refs
                .iter()
                .all(|r| r.trim_start_matches(BINDING_EVIDENCE_PREFIX) == binding.request_sha256);
            if !all_match {
                return Err(NooterraError::ToolCallVerdictBindingEvidenceMismatch);
            }
        }

        // 5. releaseRatePct in [0, 100].
        if verdict.release_rate_pct > 100 {
            return Err(NooterraError::ReleaseRatePctOutOfRange(verdict.release_rate_pct));
        }

        // 6. Arbiter lifecycle is active.
        check_lifecycle(&arbiter)?;

        let hold = self
            .store
            .get_hold(tenant, &HoldHash::new(case.hold_hash.clone()))?
            .ok_or_else(|| NooterraError::UnknownHold(case.hold_hash.clone()))?;

        let resolution = settlement::resolve(&hold, verdict.release_rate_pct, now);
        let mut ops = settlement::ledger_ops(&hold, &resolution);
        ops.push(LedgerOp::AdjustmentUpsert(resolution.adjustment.clone()));

        let mut resolved_hold = hold.clone();
        resolved_hold.status = resolution.hold_status;
        ops.push(LedgerOp::HoldUpsert(resolved_hold));

        let mut closed_case = case.clone();
        closed_case.status = CaseStatus::Closed;
        ops.push(LedgerOp::CaseUpsert(closed_case));

        ops.push(LedgerOp::VerdictUpsert(verdict.clone()));

        ops.push(LedgerOp::EventAppend {
            stream_id: StreamId::new(format!("case_{}", case.case_id)),
            kind: "VERDICT_ACCEPTED".into(),
            actor: format!("agent:{}", verdict.arbiter_agent_id),
            payload: EventPayload::VerdictAccepted {
                case_id: case.case_id.to_string(),
                verdict_id: verdict.verdict_id.clone(),
            },
        });
        let hold_event = match resolution.hold_status {
            HoldStatus::Released => EventPayload::HoldReleased {
                hold_hash: hold.hold_hash.to_string(),
                adjustment_id: resolution.adjustment.adjustment_id.clone(),
            },
            _ => EventPayload::HoldRefunded {
                hold_hash: hold.hold_hash.to_string(),
                adjustment_id: resolution.adjustment.adjustment_id.clone(),
            },
        };
        ops.push(LedgerOp::EventAppend {
            stream_id: StreamId::new(format!("hold_{}", hold.hold_hash)),
            kind: "HOLD_RESOLVED".into(),
            actor: format!("agent:{}", verdict.arbiter_agent_id),
            payload: hold_event,
        });

        self.store.commit(tenant, ops)?;
        info!(%tenant, case_id = %case.case_id, pct = verdict.release_rate_pct, "verdict accepted, settlement applied");

        Ok(AcceptOutcome {
            adjustment: resolution.adjustment,
            already_existed: false,
        })
    }
}
