//! `InvoiceBundle.v1`: wraps one or more `JobProofBundle`s with pricing, a
//! metering summary, a signed pricing matrix, and an aggregate verification
//! report (spec §6).
//!
//! Pricing and metering are caller-supplied JSON values rather than types
//! this crate owns — `nooterra-metering` derives the metering facts and a
//! higher layer (`nooterra-node`) is the one place that knows both it and
//! `nooterra-proof`, keeping the pipeline's dependency direction one-way.

use std::path::Path;

use ed25519_dalek::VerifyingKey;
use serde_json::{json, Value};
use tracing::info;

use nooterra_core::error::{NooterraError, Result};
use nooterra_crypto::hash::sha256_hex;
use nooterra_crypto::keypair::KeyPair;
use nooterra_crypto::signing::{sign, verify};

use crate::job_bundle::verify_bundle;
use crate::manifest::{write_canonical_file, ManifestEntry, ProofBundleManifest};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InvoiceBundleManifest {
    pub v: u32,
    pub job_bundle_manifest_hashes: Vec<String>,
    pub files: Vec<ManifestEntry>,
    pub manifest_hash: String,
}

/// Copies `job_bundle_dirs` (each a `JobProofBundle.v1` directory already
/// written and verified) under `out_dir/job_bundles/<n>/`, writes
/// `pricing.json` (signed if `signer` is given), `metering.json`, and
/// `verify/verification_report.json`, then binds everything into one
/// manifest.
pub fn write_invoice_bundle(
    job_bundle_dirs: &[&Path],
    pricing_matrix: &Value,
    metering_summary: &Value,
    signer: Option<&KeyPair>,
    out_dir: &Path,
) -> Result<InvoiceBundleManifest> {
    std::fs::create_dir_all(out_dir).map_err(|e| NooterraError::Storage(e.to_string()))?;
    let mut files: Vec<ManifestEntry> = Vec::new();
    let mut job_bundle_manifest_hashes = Vec::new();
    let mut per_job_reports = Vec::new();

    for (idx, job_dir) in job_bundle_dirs.iter().enumerate() {
        let dest = out_dir.join(format!("job_bundles/{idx}"));
        copy_dir(job_dir, &dest)?;

        let manifest_bytes = std::fs::read(dest.join("manifest.json")).map_err(|e| NooterraError::Storage(e.to_string()))?;
        let job_manifest: ProofBundleManifest =
            serde_json::from_slice(&manifest_bytes).map_err(|e| NooterraError::Serialization(e.to_string()))?;
        job_bundle_manifest_hashes.push(job_manifest.manifest_hash.clone());

        for entry in walk_files(&dest, out_dir)? {
            files.push(entry);
        }

        let report = verify_bundle(&dest, None, false)?;
        per_job_reports.push(json!({
            "jobBundleIndex": idx,
            "manifestHash": job_manifest.manifest_hash,
            "ok": report.ok(),
            "warnings": report.warnings,
        }));
    }

    let pricing_to_write = match signer {
        Some(signer) => {
            let pricing_hash = sha256_hex(&nooterra_crypto::canonical::to_canonical_bytes(pricing_matrix).map_err(|e| NooterraError::Canonicalization(e.to_string()))?);
            let signature = sign(&pricing_hash, signer, "invoice_pricing_matrix", &Value::Null)
                .map_err(|e| NooterraError::Canonicalization(e.to_string()))?;
            json!({
                "matrix": pricing_matrix,
                "pricingHash": pricing_hash,
                "signerKeyId": signer.key_id.as_str(),
                "signature": signature,
            })
        }
        None => pricing_matrix.clone(),
    };
    files.push(write_canonical_file(out_dir, &out_dir.join("pricing.json"), &pricing_to_write)?);
    files.push(write_canonical_file(out_dir, &out_dir.join("metering.json"), metering_summary)?);

    let verification_report = json!({ "jobBundles": per_job_reports });
    files.push(write_canonical_file(out_dir, &out_dir.join("verify/verification_report.json"), &verification_report)?);

    files.sort_by(|a, b| a.path.cmp(&b.path));
    let unsigned = json!({ "v": 1, "jobBundleManifestHashes": job_bundle_manifest_hashes, "files": files });
    let manifest_hash = sha256_hex(&nooterra_crypto::canonical::to_canonical_bytes(&unsigned).map_err(|e| NooterraError::Canonicalization(e.to_string()))?);

    let manifest = InvoiceBundleManifest {
        v: 1,
        job_bundle_manifest_hashes,
        files,
        manifest_hash,
    };
    let manifest_value = serde_json::to_value(&manifest).map_err(|e| NooterraError::Serialization(e.to_string()))?;
    std::fs::write(
        out_dir.join("manifest.json"),
        nooterra_crypto::canonical::to_canonical_bytes(&manifest_value).map_err(|e| NooterraError::Canonicalization(e.to_string()))?,
    )
    .map_err(|e| NooterraError::Storage(e.to_string()))?;

    info!(dir = %out_dir.display(), job_bundles = job_bundle_dirs.len(), "wrote invoice bundle");
    Ok(manifest)
}

/// Verifies a signed `pricing.json`'s binding; returns `false` for an
/// unsigned pricing payload (there is nothing to check) rather than erroring.
pub fn verify_pricing_signature(pricing_json: &Value, expected_signer: &VerifyingKey) -> Result<bool> {
    let (Some(hash), Some(sig)) = (pricing_json["pricingHash"].as_str(), pricing_json["signature"].as_str()) else {
        return Ok(false);
    };
    verify(hash, sig, expected_signer, "invoice_pricing_matrix", &Value::Null).map_err(|e| NooterraError::Canonicalization(e.to_string()))
}

fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    std::fs::create_dir_all(dst).map_err(|e| NooterraError::Storage(e.to_string()))?;
    for entry in std::fs::read_dir(src).map_err(|e| NooterraError::Storage(e.to_string()))? {
        let entry = entry.map_err(|e| NooterraError::Storage(e.to_string()))?;
        let ty = entry.file_type().map_err(|e| NooterraError::Storage(e.to_string()))?;
        let dest_path = dst.join(entry.file_name());
        if ty.is_dir() {
            copy_dir(&entry.path(), &dest_path)?;
        } else {
            std::fs::copy(entry.path(), &dest_path).map_err(|e| NooterraError::Storage(e.to_string()))?;
        }
    }
    Ok(())
}

fn walk_files(dir: &Path, root: &Path) -> Result<Vec<ManifestEntry>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| NooterraError::Storage(e.to_string()))? {
        let entry = entry.map_err(|e| NooterraError::Storage(e.to_string()))?;
        let path = entry.path();
        if path.is_dir() {
            out.extend(walk_files(&path, root)?);
        } else {
            let bytes = std::fs::read(&path).map_err(|e| NooterraError::Storage(e.to_string()))?;
            let rel = path.strip_prefix(root).unwrap_or(&path).to_string_lossy().replace('\\', "/");
            out.push(ManifestEntry {
                path: rel,
                sha256: sha256_hex(&bytes),
            });
        }
    }
    Ok(out)
}
