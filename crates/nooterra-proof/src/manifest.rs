//! `ProofBundleManifest.v1`: the file-listing + integrity-hash payload every
//! bundle carries at its root.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::json;

use nooterra_core::error::{NooterraError, Result};
use nooterra_crypto::canonical::to_canonical_bytes;
use nooterra_crypto::hash::sha256_hex;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub path: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofBundleManifest {
    pub v: u32,
    pub files: Vec<ManifestEntry>,
    pub manifest_hash: String,
}

impl ProofBundleManifest {
    /// Builds the manifest over `files` (already relative, sorted by the
    /// caller's write order) and computes `manifestHash` over everything
    /// except the hash field itself.
    pub fn build(files: Vec<ManifestEntry>) -> Result<Self> {
        let unsigned = json!({ "v": 1, "files": files });
        let manifest_hash = sha256_hex(&to_canonical_bytes(&unsigned).map_err(|e| NooterraError::Canonicalization(e.to_string()))?);
        Ok(Self {
            v: 1,
            files,
            manifest_hash,
        })
    }

    pub fn recompute_hash(&self) -> Result<String> {
        let unsigned = json!({ "v": self.v, "files": self.files });
        Ok(sha256_hex(&to_canonical_bytes(&unsigned).map_err(|e| NooterraError::Canonicalization(e.to_string()))?))
    }
}

/// Writes `value` as canonical JSON to `path`, returning the relative-path
/// manifest entry for it. `root` is stripped from `path` to produce the
/// entry's stored path.
pub(crate) fn write_canonical_file(root: &Path, path: &Path, value: &serde_json::Value) -> Result<ManifestEntry> {
    let bytes = to_canonical_bytes(value).map_err(|e| NooterraError::Canonicalization(e.to_string()))?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| NooterraError::Storage(e.to_string()))?;
    }
    fs::write(path, &bytes).map_err(|e| NooterraError::Storage(e.to_string()))?;
    let rel = path
        .strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/");
    Ok(ManifestEntry {
        path: rel,
        sha256: sha256_hex(&bytes),
    })
}

/// Same as [`write_canonical_file`] but for newline-delimited canonical-JSON
/// lines (`events.jsonl`, `payload_material.jsonl`).
pub(crate) fn write_jsonl_file(root: &Path, path: &Path, lines: &[serde_json::Value]) -> Result<ManifestEntry> {
    let mut bytes = Vec::new();
    for line in lines {
        bytes.extend(to_canonical_bytes(line).map_err(|e| NooterraError::Canonicalization(e.to_string()))?);
        bytes.push(b'\n');
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| NooterraError::Storage(e.to_string()))?;
    }
    fs::write(path, &bytes).map_err(|e| NooterraError::Storage(e.to_string()))?;
    let rel = path
        .strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/");
    Ok(ManifestEntry {
        path: rel,
        sha256: sha256_hex(&bytes),
    })
}

pub(crate) fn read_jsonl_file(path: &Path) -> Result<Vec<serde_json::Value>> {
    let text = fs::read_to_string(path).map_err(|e| NooterraError::Storage(e.to_string()))?;
    text.lines()
        .filter(|l| !l.is_empty())
        .map(|l| serde_json::from_str(l).map_err(|e| NooterraError::Serialization(e.to_string())))
        .collect()
}
