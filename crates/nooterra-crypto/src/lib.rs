pub mod canonical;
pub mod hash;
pub mod keypair;
pub mod revocation;
pub mod signing;

pub use canonical::{to_canonical_bytes, CanonError};
pub use hash::{hash_canonical_json, sha256_hex};
pub use keypair::{
    key_id_from_verifying_key, spki_pem_from_verifying_key, verifying_key_from_spki_pem, KeyPair,
};
pub use revocation::KeyStatusIndex;
pub use signing::{binding_message, sign, verify, verifying_key_from_bytes};
