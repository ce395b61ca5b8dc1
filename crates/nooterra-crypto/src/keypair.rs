use ed25519_dalek::pkcs8::{DecodePublicKey, EncodePublicKey};
use pkcs8::LineEnding;
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use nooterra_core::types::KeyId;
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use crate::hash::sha256_hex;

/// An Ed25519 keypair. The signing key is held in a `Zeroizing` wrapper and
/// wiped from memory on drop.
pub struct KeyPair {
    pub key_id: KeyId,
    pub verifying_key: VerifyingKey,
    signing_key: Zeroizing<[u8; 32]>,
}

/// SHA-256 of the SPKI DER encoding of the public key, lowercase hex.
pub fn key_id_from_verifying_key(vk: &VerifyingKey) -> KeyId {
    let der = vk
        .to_public_key_der()
        .expect("ed25519 public key always encodes to SPKI DER");
    KeyId::new(sha256_hex(der.as_bytes()))
}

/// Decodes an SPKI PEM-encoded Ed25519 public key, the form `PublicKeyRecord`
/// persists for an agent's registered keys.
pub fn verifying_key_from_spki_pem(pem: &str) -> Option<VerifyingKey> {
    VerifyingKey::from_public_key_pem(pem).ok()
}

/// Round-trips `vk` to the same SPKI PEM form `verifying_key_from_spki_pem` reads back.
pub fn spki_pem_from_verifying_key(vk: &VerifyingKey) -> String {
    vk.to_public_key_pem(LineEnding::LF)
        .expect("ed25519 public key always encodes to SPKI PEM")
}

impl KeyPair {
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();
        let key_id = key_id_from_verifying_key(&verifying_key);
        Self {
            key_id,
            verifying_key,
            signing_key: Zeroizing::new(signing_key.to_bytes()),
        }
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&bytes);
        let verifying_key = signing_key.verifying_key();
        let key_id = key_id_from_verifying_key(&verifying_key);
        Self {
            key_id,
            verifying_key,
            signing_key: Zeroizing::new(bytes),
        }
    }

    pub fn sign_raw(&self, message: &[u8]) -> ed25519_dalek::Signature {
        let signing_key = SigningKey::from_bytes(&self.signing_key);
        signing_key.sign(message)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyPair {{ key_id: {:?} }}", self.key_id)
    }
}
