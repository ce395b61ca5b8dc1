//! Protocol-wide constants for the agent-economy substrate.

// ── Basis points ─────────────────────────────────────────────────────────────

/// Basis-point scale: 10_000 bps == 100%.
pub const BPS_SCALE: u32 = 10_000;

// ── Authority grants ─────────────────────────────────────────────────────────

/// Maximum chain-of-delegation depth an `AuthorityGrant` may carry.
pub const MAX_DELEGATION_DEPTH: u32 = 8;

// ── x402 gate ────────────────────────────────────────────────────────────────

/// Default challenge window when a gate does not specify one, in milliseconds.
pub const DEFAULT_CHALLENGE_WINDOW_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// Default holdback rate in basis points when a gate does not specify one.
pub const DEFAULT_HOLDBACK_BPS: u32 = 0;

// ── Arbitration ──────────────────────────────────────────────────────────────

/// Evidence-ref prefix a dispute-open envelope must carry to bind to the
/// settlement's request hash.
pub const BINDING_EVIDENCE_PREFIX: &str = "http:request_sha256:";

// ── Event chain ──────────────────────────────────────────────────────────────

/// Stream id of the tenant-wide governance stream carrying signer-key
/// lifecycle events.
pub const GOVERNANCE_STREAM_ID: &str = "governance";

/// Current event schema version.
pub const EVENT_SCHEMA_VERSION: u32 = 1;

// ── Signature purposes ───────────────────────────────────────────────────────

pub const PURPOSE_DISPUTE_OPEN: &str = "dispute_open";
pub const PURPOSE_ARBITRATION_VERDICT: &str = "arbitration_verdict";
pub const PURPOSE_EVENT_CHAIN: &str = "event_chain";
pub const PURPOSE_PROOF_BUNDLE_ATTESTATION: &str = "proof_bundle_attestation";
