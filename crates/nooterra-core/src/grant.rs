use serde::{Deserialize, Serialize};

use crate::types::{AgentId, Cents, Currency, GrantId, KeyId, PrincipalRef, Timestamp};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantScope {
    pub allowed_provider_ids: Vec<String>,
    pub allowed_tool_ids: Vec<String>,
    pub allowed_risk_classes: Vec<String>,
    pub side_effecting_allowed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpendEnvelope {
    pub currency: Currency,
    pub max_per_call_cents: Cents,
    pub max_total_cents: Cents,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainBinding {
    pub depth: u32,
    pub max_delegation_depth: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Validity {
    pub issued_at: Timestamp,
    pub not_before: Timestamp,
    pub expires_at: Option<Timestamp>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Revocation {
    pub revocable: bool,
    pub revoked_at: Option<Timestamp>,
    pub revocation_reason_code: Option<String>,
}

impl Default for Revocation {
    fn default() -> Self {
        Self {
            revocable: true,
            revoked_at: None,
            revocation_reason_code: None,
        }
    }
}

/// A signed envelope from a principal delegating spending/tool authority to
/// a grantee agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityGrant {
    pub grant_id: GrantId,
    pub principal_ref: PrincipalRef,
    pub grantee_agent_id: AgentId,
    pub scope: GrantScope,
    pub spend_envelope: SpendEnvelope,
    pub chain_binding: ChainBinding,
    pub validity: Validity,
    pub revocation: Revocation,
    /// Hash over the canonical form of this grant minus its signature.
    pub grant_hash: String,
    pub signer_key_id: KeyId,
    pub signature: String,
}

impl AuthorityGrant {
    pub fn is_revoked(&self) -> bool {
        self.revocation.revoked_at.is_some()
    }

    pub fn is_active_at(&self, at: Timestamp) -> bool {
        !self.is_revoked()
            && at >= self.validity.not_before
            && self.validity.expires_at.map(|exp| at < exp).unwrap_or(true)
    }

    /// Revoke this grant. Invariant: once revoked, both fields are set together.
    pub fn revoke(&mut self, at: Timestamp, reason_code: impl Into<String>) {
        self.revocation.revoked_at = Some(at);
        self.revocation.revocation_reason_code = Some(reason_code.into());
    }
}
