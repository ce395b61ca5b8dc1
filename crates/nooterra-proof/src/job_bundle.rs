//! `JobProofBundle.v1`: one job's event stream, the governance stream it was
//! signed against, the signer public keys in play, and a job snapshot — all
//! bound into one manifest.

use std::path::Path;

use ed25519_dalek::VerifyingKey;
use serde_json::{json, Value};
use tracing::info;

use nooterra_core::error::{NooterraError, Result};
use nooterra_core::event::Event;
use nooterra_core::model::Agent;
use nooterra_crypto::hash::sha256_hex;
use nooterra_crypto::keypair::KeyPair;
use nooterra_crypto::revocation::KeyStatusIndex;
use nooterra_crypto::signing::{sign, verify};
use nooterra_chain::verify_chain;

use crate::manifest::{read_jsonl_file, write_canonical_file, write_jsonl_file, ManifestEntry, ProofBundleManifest};

/// Everything [`write_job_proof_bundle`] needs beyond the output path.
pub struct JobBundleInput<'a> {
    pub job_events: &'a [Event],
    pub governance_events: &'a [Event],
    pub agents: &'a [Agent],
    pub job_snapshot: Value,
}

fn event_to_value(event: &Event) -> Result<Value> {
    serde_json::to_value(event).map_err(|e| NooterraError::Serialization(e.to_string()))
}

fn payload_material_line(event: &Event) -> Result<Value> {
    let payload = serde_json::to_value(&event.payload).map_err(|e| NooterraError::Serialization(e.to_string()))?;
    Ok(json!({ "eventId": event.id.as_str(), "payload": payload }))
}

/// Writes a complete `JobProofBundle.v1` to `out_dir` (created if absent).
/// Signs `attestation/bundle_head_attestation.json` over the manifest hash
/// when `signer` is given; the bundle is valid (just unattested) without
/// one.
pub fn write_job_proof_bundle(input: JobBundleInput<'_>, signer: Option<&KeyPair>, out_dir: &Path) -> Result<ProofBundleManifest> {
    std::fs::create_dir_all(out_dir).map_err(|e| NooterraError::Storage(e.to_string()))?;
    let mut files: Vec<ManifestEntry> = Vec::new();

    let job_event_lines: Vec<Value> = input.job_events.iter().map(event_to_value).collect::<Result<_>>()?;
    files.push(write_jsonl_file(out_dir, &out_dir.join("events/events.jsonl"), &job_event_lines)?);

    let job_payload_lines: Vec<Value> = input.job_events.iter().map(payload_material_line).collect::<Result<_>>()?;
    files.push(write_jsonl_file(out_dir, &out_dir.join("events/payload_material.jsonl"), &job_payload_lines)?);

    let gov_event_lines: Vec<Value> = input.governance_events.iter().map(event_to_value).collect::<Result<_>>()?;
    files.push(write_jsonl_file(out_dir, &out_dir.join("governance/events/events.jsonl"), &gov_event_lines)?);

    let gov_payload_lines: Vec<Value> = input.governance_events.iter().map(payload_material_line).collect::<Result<_>>()?;
    files.push(write_jsonl_file(out_dir, &out_dir.join("governance/events/payload_material.jsonl"), &gov_payload_lines)?);

    let gov_tip = input.governance_events.last();
    let gov_snapshot = json!({
        "streamId": "governance",
        "lastChainHash": gov_tip.map(|e| e.chain_hash.clone()),
        "lastEventId": gov_tip.map(|e| e.id.to_string()),
    });
    files.push(write_canonical_file(out_dir, &out_dir.join("governance/events/snapshot.json"), &gov_snapshot)?);

    let public_keys: Vec<Value> = input
        .agents
        .iter()
        .flat_map(|a| {
            a.public_keys.iter().map(move |k| {
                json!({
                    "agentId": a.agent_id.as_str(),
                    "keyId": k.key_id.as_str(),
                    "spkiPem": k.spki_pem,
                })
            })
        })
        .collect();
    files.push(write_canonical_file(out_dir, &out_dir.join("keys/public_keys.json"), &json!(public_keys))?);

    files.push(write_canonical_file(out_dir, &out_dir.join("job/snapshot.json"), &input.job_snapshot)?);

    files.sort_by(|a, b| a.path.cmp(&b.path));
    let manifest = ProofBundleManifest::build(files)?;
    let manifest_value = serde_json::to_value(&manifest).map_err(|e| NooterraError::Serialization(e.to_string()))?;
    std::fs::write(
        out_dir.join("manifest.json"),
        nooterra_crypto::canonical::to_canonical_bytes(&manifest_value).map_err(|e| NooterraError::Canonicalization(e.to_string()))?,
    )
    .map_err(|e| NooterraError::Storage(e.to_string()))?;

    if let Some(signer) = signer {
        let signature = sign(&manifest.manifest_hash, signer, nooterra_core::constants::PURPOSE_PROOF_BUNDLE_ATTESTATION, &Value::Null)
            .map_err(|e| NooterraError::Canonicalization(e.to_string()))?;
        let attestation = json!({
            "manifestHash": manifest.manifest_hash,
            "signerKeyId": signer.key_id.as_str(),
            "signature": signature,
        });
        write_canonical_file(out_dir, &out_dir.join("attestation/bundle_head_attestation.json"), &attestation)?;
    }

    info!(dir = %out_dir.display(), manifest_hash = %manifest.manifest_hash, "wrote job proof bundle");
    Ok(manifest)
}

#[derive(Debug, Clone, Default)]
pub struct VerificationReport {
    pub manifest_hash_ok: bool,
    pub files_ok: bool,
    pub job_chain_ok: bool,
    pub governance_chain_ok: bool,
    pub attestation_ok: Option<bool>,
    pub warnings: Vec<String>,
}

impl VerificationReport {
    pub fn ok(&self) -> bool {
        self.manifest_hash_ok
            && self.files_ok
            && self.job_chain_ok
            && self.governance_chain_ok
            && self.attestation_ok != Some(false)
    }
}

/// Re-reads a bundle directory written by [`write_job_proof_bundle`] and
/// checks every layer of integrity it promises: manifest-hash binding,
/// per-file content hashes, event-chain linkage for both streams, and (if
/// an attestation is present) its signature against `expected_signer`.
///
/// `strict`: when true, any warning (e.g. an unattested bundle, or an
/// attestation present with no `expected_signer` supplied to check it
/// against) is promoted to a hard failure, per spec §7's "strict mode
/// rejects any compatibility warning".
pub fn verify_bundle(dir: &Path, expected_signer: Option<&VerifyingKey>, strict: bool) -> Result<VerificationReport> {
    let manifest_bytes = std::fs::read(dir.join("manifest.json")).map_err(|e| NooterraError::Storage(e.to_string()))?;
    let manifest: ProofBundleManifest =
        serde_json::from_slice(&manifest_bytes).map_err(|e| NooterraError::Serialization(e.to_string()))?;

    let mut report = VerificationReport::default();

    let recomputed = manifest.recompute_hash()?;
    report.manifest_hash_ok = recomputed == manifest.manifest_hash;
    if !report.manifest_hash_ok {
        return Err(NooterraError::BundleIntegrity("manifest hash mismatch".into()));
    }

    report.files_ok = true;
    for entry in &manifest.files {
        let bytes = std::fs::read(dir.join(&entry.path)).map_err(|e| NooterraError::Storage(e.to_string()))?;
        if sha256_hex(&bytes) != entry.sha256 {
            report.files_ok = false;
            return Err(NooterraError::BundleIntegrity(format!("file hash mismatch: {}", entry.path)));
        }
    }

    let job_events: Vec<Event> = read_jsonl_file(&dir.join("events/events.jsonl"))?
        .into_iter()
        .map(|v| serde_json::from_value(v).map_err(|e| NooterraError::Serialization(e.to_string())))
        .collect::<Result<_>>()?;
    verify_chain(&job_events).map_err(|e| NooterraError::BundleIntegrity(e.to_string()))?;
    report.job_chain_ok = true;

    let governance_events: Vec<Event> = read_jsonl_file(&dir.join("governance/events/events.jsonl"))?
        .into_iter()
        .map(|v| serde_json::from_value(v).map_err(|e| NooterraError::Serialization(e.to_string())))
        .collect::<Result<_>>()?;
    verify_chain(&governance_events).map_err(|e| NooterraError::BundleIntegrity(e.to_string()))?;
    report.governance_chain_ok = true;

    let attestation_path = dir.join("attestation/bundle_head_attestation.json");
    if attestation_path.exists() {
        let attestation: Value =
            serde_json::from_slice(&std::fs::read(&attestation_path).map_err(|e| NooterraError::Storage(e.to_string()))?)
                .map_err(|e| NooterraError::Serialization(e.to_string()))?;
        let signature = attestation["signature"].as_str().unwrap_or_default();
        match expected_signer {
            Some(key) => {
                let ok = verify(
                    &manifest.manifest_hash,
                    signature,
                    key,
                    nooterra_core::constants::PURPOSE_PROOF_BUNDLE_ATTESTATION,
                    &Value::Null,
                )
                .map_err(|e| NooterraError::Canonicalization(e.to_string()))?;
                report.attestation_ok = Some(ok);
                if !ok {
                    return Err(NooterraError::BundleIntegrity("attestation signature invalid".into()));
                }
            }
            None => {
                report.warnings.push("attestation present but no expected signer key supplied".into());
            }
        }
    } else {
        report.warnings.push("bundle carries no head attestation".into());
    }

    if strict && !report.warnings.is_empty() {
        return Err(NooterraError::BundleIntegrity(format!(
            "strict verification rejected {} warning(s): {}",
            report.warnings.len(),
            report.warnings.join("; ")
        )));
    }

    Ok(report)
}

/// Governance-derived key status at a given instant, re-exposed so a
/// caller verifying a bundle can also check an individual event's signer
/// key was active at signing time (scenario 5's "ignoring any `revokedAt`
/// absence in `keys/public_keys.json`").
pub fn key_status_index(governance_events: &[Event]) -> KeyStatusIndex {
    KeyStatusIndex::rebuild(governance_events)
}
