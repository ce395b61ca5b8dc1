use sha2::{Digest, Sha256};

use crate::canonical::{to_canonical_bytes, CanonError};

/// `H(x) := lowercase_hex(SHA-256(B))` for raw bytes `B`.
pub fn sha256_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    hex::encode(digest)
}

/// `H(x)` over the canonical-JSON form of a serde value.
pub fn hash_canonical_json(value: &serde_json::Value) -> Result<String, CanonError> {
    Ok(sha256_hex(&to_canonical_bytes(value)?))
}
