use thiserror::Error;

/// The HTTP status class an external adapter would map this error onto.
/// The core never constructs an HTTP response itself; this is pure data an
/// adapter consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpClass {
    Validation400,
    Conflict409,
    Gone410,
    TooMany429,
}

#[derive(Debug, Error)]
pub enum NooterraError {
    // ── Validation ───────────────────────────────────────────────────────────
    #[error("{0} is required")]
    FieldRequired(String),

    #[error("{0} is invalid: {1}")]
    FieldInvalid(String, String),

    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("currency mismatch: wallet holds {wallet}, op uses {op}")]
    CurrencyMismatch { wallet: String, op: String },

    // ── Idempotency ──────────────────────────────────────────────────────────
    #[error("idempotency key conflict for scope {scope}")]
    IdempotencyKeyConflict { scope: String },

    // ── Ledger ───────────────────────────────────────────────────────────────
    #[error("insufficient available balance: need {need}, have {have}")]
    InsufficientAvailable { need: u64, have: u64 },

    #[error("insufficient escrow-locked balance: need {need}, have {have}")]
    InsufficientEscrowLocked { need: u64, have: u64 },

    #[error("insufficient heldback balance: need {need}, have {have}")]
    InsufficientHeldback { need: u64, have: u64 },

    #[error("unknown wallet: {0}")]
    UnknownWallet(String),

    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    // ── Authority grant (X402_AUTHORITY_GRANT_*) ────────────────────────────
    #[error("authority grant revoked")]
    AuthorityGrantRevoked,

    #[error("authority grant expired")]
    AuthorityGrantExpired,

    #[error("authority grant not yet active")]
    AuthorityGrantNotActive,

    #[error("authority grant per-call limit exceeded: max {max}, requested {requested}")]
    AuthorityGrantPerCallExceeded { max: u64, requested: u64 },

    #[error("authority grant total limit exceeded: max {max}, running total would be {would_be}")]
    AuthorityGrantTotalExceeded { max: u64, would_be: u64 },

    #[error("authority grant actor mismatch")]
    AuthorityGrantActorMismatch,

    #[error("unknown authority grant: {0}")]
    UnknownAuthorityGrant(String),

    // ── Agent lifecycle ──────────────────────────────────────────────────────
    #[error("agent is suspended: {0}")]
    AgentSuspended(String),

    #[error("agent is throttled: {0}")]
    AgentThrottled(String),

    // ── x402 gate ────────────────────────────────────────────────────────────
    #[error("unknown gate: {0}")]
    UnknownGate(String),

    #[error("invalid gate state transition: from {from} via {event}")]
    InvalidGateTransition { from: String, event: String },

    // ── Dispute / holdback / arbitration lifecycle ──────────────────────────
    #[error("dispute already open for this agreement")]
    DisputeAlreadyOpen,

    #[error("dispute window expired")]
    DisputeWindowExpired,

    #[error("invalid dispute or verdict signer")]
    DisputeInvalidSigner { reason: String },

    #[error("tool-call binding source required")]
    ToolCallBindingSourceRequired,

    #[error("tool-call open binding evidence required")]
    ToolCallOpenBindingEvidenceRequired,

    #[error("tool-call open binding evidence mismatch")]
    ToolCallOpenBindingEvidenceMismatch,

    #[error("tool-call verdict binding evidence mismatch")]
    ToolCallVerdictBindingEvidenceMismatch,

    #[error("unknown hold: {0}")]
    UnknownHold(String),

    #[error("hold is not in held state: {0}")]
    HoldNotHeld(String),

    #[error("unknown arbitration case: {0}")]
    UnknownCase(String),

    #[error("arbitration case is not under review: {0}")]
    CaseNotUnderReview(String),

    #[error("arbiter mismatch for case {0}")]
    ArbiterMismatch(String),

    #[error("release rate percent out of range: {0}")]
    ReleaseRatePctOutOfRange(u32),

    #[error("envelope hash mismatch")]
    EnvelopeHashMismatch,

    // ── Maintenance ──────────────────────────────────────────────────────────
    #[error("maintenance task already running")]
    MaintenanceAlreadyRunning,

    // ── Signer key / governance ──────────────────────────────────────────────
    #[error("signer key revoked: {0}")]
    SignerKeyRevoked(String),

    #[error("signer key not active: {0}")]
    SignerKeyNotActive(String),

    // ── Crypto / canonicalization ────────────────────────────────────────────
    #[error("canonicalization error: {0}")]
    Canonicalization(String),

    #[error("signature verification failed")]
    SignatureInvalid,

    // ── Integrity (proof bundle verification) ───────────────────────────────
    #[error("proof bundle integrity error: {0}")]
    BundleIntegrity(String),

    // ── Storage ──────────────────────────────────────────────────────────────
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("{0}")]
    Other(String),
}

impl NooterraError {
    /// Stable machine-readable error code, matching the `{code, message,
    /// details?}` envelope an HTTP adapter would serve.
    pub fn code(&self) -> &'static str {
        use NooterraError::*;
        match self {
            FieldRequired(_) => "FIELD_REQUIRED",
            FieldInvalid(..) => "FIELD_INVALID",
            ZeroAmount => "AMOUNT_MUST_BE_POSITIVE",
            CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            IdempotencyKeyConflict { .. } => "IDEMPOTENCY_KEY_CONFLICT",
            InsufficientAvailable { .. } => "INSUFFICIENT_AVAILABLE_BALANCE",
            InsufficientEscrowLocked { .. } => "INSUFFICIENT_ESCROW_LOCKED_BALANCE",
            InsufficientHeldback { .. } => "INSUFFICIENT_HELDBACK_BALANCE",
            UnknownWallet(_) => "UNKNOWN_WALLET",
            UnknownAgent(_) => "UNKNOWN_AGENT",
            AuthorityGrantRevoked => "X402_AUTHORITY_GRANT_REVOKED",
            AuthorityGrantExpired => "X402_AUTHORITY_GRANT_EXPIRED",
            AuthorityGrantNotActive => "X402_AUTHORITY_GRANT_NOT_ACTIVE",
            AuthorityGrantPerCallExceeded { .. } => "X402_AUTHORITY_GRANT_PER_CALL_EXCEEDED",
            AuthorityGrantTotalExceeded { .. } => "X402_AUTHORITY_GRANT_TOTAL_EXCEEDED",
            AuthorityGrantActorMismatch => "X402_AUTHORITY_GRANT_ACTOR_MISMATCH",
            UnknownAuthorityGrant(_) => "UNKNOWN_AUTHORITY_GRANT",
            AgentSuspended(_) => "X402_AGENT_SUSPENDED",
            AgentThrottled(_) => "X402_AGENT_THROTTLED",
            UnknownGate(_) => "UNKNOWN_GATE",
            InvalidGateTransition { .. } => "X402_GATE_INVALID_TRANSITION",
            DisputeAlreadyOpen => "DISPUTE_ALREADY_OPEN",
            DisputeWindowExpired => "DISPUTE_WINDOW_EXPIRED",
            DisputeInvalidSigner { .. } => "DISPUTE_INVALID_SIGNER",
            ToolCallBindingSourceRequired => "X402_TOOL_CALL_BINDING_SOURCE_REQUIRED",
            ToolCallOpenBindingEvidenceRequired => "X402_TOOL_CALL_OPEN_BINDING_EVIDENCE_REQUIRED",
            ToolCallOpenBindingEvidenceMismatch => "X402_TOOL_CALL_OPEN_BINDING_EVIDENCE_MISMATCH",
            ToolCallVerdictBindingEvidenceMismatch => {
                "X402_TOOL_CALL_VERDICT_BINDING_EVIDENCE_MISMATCH"
            }
            UnknownHold(_) => "UNKNOWN_HOLD",
            HoldNotHeld(_) => "HOLD_NOT_HELD",
            UnknownCase(_) => "UNKNOWN_CASE",
            CaseNotUnderReview(_) => "CASE_NOT_UNDER_REVIEW",
            ArbiterMismatch(_) => "ARBITER_MISMATCH",
            ReleaseRatePctOutOfRange(_) => "RELEASE_RATE_PCT_OUT_OF_RANGE",
            EnvelopeHashMismatch => "ENVELOPE_HASH_MISMATCH",
            MaintenanceAlreadyRunning => "MAINTENANCE_ALREADY_RUNNING",
            SignerKeyRevoked(_) => "SIGNER_KEY_REVOKED",
            SignerKeyNotActive(_) => "SIGNER_KEY_NOT_ACTIVE",
            Canonicalization(_) => "CANONICALIZATION_ERROR",
            SignatureInvalid => "SIGNATURE_INVALID",
            BundleIntegrity(_) => "BUNDLE_INTEGRITY_ERROR",
            Storage(_) => "STORAGE_ERROR",
            Serialization(_) => "SERIALIZATION_ERROR",
            Other(_) => "OTHER",
        }
    }

    pub fn http_class(&self) -> HttpClass {
        use NooterraError::*;
        match self {
            FieldRequired(_) | FieldInvalid(..) | ZeroAmount | CurrencyMismatch { .. }
            | ReleaseRatePctOutOfRange(_) | Canonicalization(_) | EnvelopeHashMismatch
            | SignatureInvalid => HttpClass::Validation400,
            AgentSuspended(_) => HttpClass::Gone410,
            AgentThrottled(_) => HttpClass::TooMany429,
            _ => HttpClass::Conflict409,
        }
    }
}

pub type Result<T> = std::result::Result<T, NooterraError>;
