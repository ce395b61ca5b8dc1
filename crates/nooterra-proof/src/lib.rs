//! `JobProofBundle.v1` / `InvoiceBundle.v1` file-format writer and verifier
//! (spec §6 "Proof bundles").
//!
//! A proof bundle is a directory of canonical-JSON files plus a manifest
//! binding every file's SHA-256 into one `manifestHash`, optionally signed
//! as an attestation over that hash. Canonical-JSON bindings mean the
//! manifest (and any signature over it) is stable across key reordering.

pub mod invoice_bundle;
pub mod job_bundle;
pub mod manifest;

pub use invoice_bundle::{write_invoice_bundle, InvoiceBundleManifest};
pub use job_bundle::{verify_bundle, write_job_proof_bundle, JobBundleInput, VerificationReport};
pub use manifest::{ManifestEntry, ProofBundleManifest};
