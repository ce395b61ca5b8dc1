use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde_json::Value;

use crate::canonical::{to_canonical_bytes, CanonError};
use crate::hash::sha256_hex;
use crate::keypair::KeyPair;

/// Computes the purpose+context-bound message:
/// `H(purpose ∥ H(canonicalJSON(context)) ∥ payloadHashHex)`.
/// Binding the purpose and context into what is actually signed prevents a
/// signature produced for one protocol use from being replayed as another.
pub fn binding_message(purpose: &str, context: &Value, payload_hash_hex: &str) -> Result<String, CanonError> {
    let context_hash = sha256_hex(&to_canonical_bytes(context)?);
    Ok(sha256_hex(
        format!("{purpose}{context_hash}{payload_hash_hex}").as_bytes(),
    ))
}

pub fn sign(
    payload_hash_hex: &str,
    keypair: &KeyPair,
    purpose: &str,
    context: &Value,
) -> Result<String, CanonError> {
    let message = binding_message(purpose, context, payload_hash_hex)?;
    let sig = keypair.sign_raw(message.as_bytes());
    Ok(hex::encode(sig.to_bytes()))
}

pub fn verify(
    payload_hash_hex: &str,
    signature_hex: &str,
    public_key: &VerifyingKey,
    purpose: &str,
    context: &Value,
) -> Result<bool, CanonError> {
    let message = binding_message(purpose, context, payload_hash_hex)?;
    let Ok(sig_bytes) = hex::decode(signature_hex) else {
        return Ok(false);
    };
    let Ok(sig_bytes): Result<[u8; 64], _> = sig_bytes.try_into() else {
        return Ok(false);
    };
    let sig = Signature::from_bytes(&sig_bytes);
    Ok(public_key.verify(message.as_bytes(), &sig).is_ok())
}

/// Reconstruct a `VerifyingKey` from raw bytes, for public-key records
/// persisted/loaded out of a store.
pub fn verifying_key_from_bytes(bytes: &[u8]) -> Option<VerifyingKey> {
    let arr: [u8; 32] = bytes.try_into().ok()?;
    VerifyingKey::from_bytes(&arr).ok()
}
