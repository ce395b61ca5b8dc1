//! Authority-grant enforcement, evaluated atomically on `authorize-payment`
//! (spec §4.3 "Authority grant enforcement").

use std::sync::Arc;

use tracing::warn;

use nooterra_core::error::{NooterraError, Result};
use nooterra_core::gate::GateState;
use nooterra_core::grant::AuthorityGrant;
use nooterra_core::types::{AgentId, Cents, GrantId, TenantId, Timestamp};
use nooterra_store::Store;

/// What an authorize-payment call is checking a grant against.
pub struct GrantCheck<'a> {
    pub payer_agent_id: &'a AgentId,
    pub provider_id: &'a str,
    pub tool_id: &'a str,
    pub risk_class: &'a str,
    pub side_effecting: bool,
    pub amount_cents: Cents,
}

pub struct AuthorityGrantValidator {
    store: Arc<dyn Store>,
}

impl AuthorityGrantValidator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn load(&self, tenant: &TenantId, grant_id: &GrantId) -> Result<AuthorityGrant> {
        self.store
            .get_grant(tenant, grant_id)?
            .ok_or_else(|| NooterraError::UnknownAuthorityGrant(grant_id.to_string()))
    }

    /// Running total: the sum over all `executed`/`released` gates
    /// referencing the grant (spec §4.3: "Running total is the sum over all
    /// released/executed gates referencing the grant").
    pub fn running_total(&self, tenant: &TenantId, grant_id: &GrantId) -> Result<Cents> {
        let gates = self.store.gates_for_grant(tenant, grant_id)?;
        Ok(gates
            .iter()
            .filter(|g| {
                matches!(
                    g.state,
                    GateState::Executed
                        | GateState::Verified
                        | GateState::Released
                        | GateState::Held
                        | GateState::Disputed
                        | GateState::Closed
                )
            })
            .map(|g| g.amount_cents)
            .sum())
    }

    /// Validates `grant` against `check` at time `now`. Fail-closed: the
    /// first violated invariant is returned, matching the reason codes in
    /// spec §4.3.
    pub fn authorize(
        &self,
        tenant: &TenantId,
        grant: &AuthorityGrant,
        check: &GrantCheck<'_>,
        now: Timestamp,
    ) -> Result<()> {
        if grant.is_revoked() {
            warn!(grant_id = %grant.grant_id, "authority grant revoked");
            return Err(NooterraError::AuthorityGrantRevoked);
        }
        if now < grant.validity.not_before {
            return Err(NooterraError::AuthorityGrantNotActive);
        }
        if let Some(expires_at) = grant.validity.expires_at {
            if now >= expires_at {
                return Err(NooterraError::AuthorityGrantExpired);
            }
        }
        if &grant.grantee_agent_id != check.payer_agent_id {
            return Err(NooterraError::AuthorityGrantActorMismatch);
        }

        let scope = &grant.scope;
        if !scope.allowed_provider_ids.is_empty()
            && !scope.allowed_provider_ids.iter().any(|p| p == check.provider_id)
        {
            return Err(NooterraError::FieldInvalid(
                "providerId".into(),
                "not in grant scope".into(),
            ));
        }
        if !scope.allowed_tool_ids.is_empty() && !scope.allowed_tool_ids.iter().any(|t| t == check.tool_id) {
            return Err(NooterraError::FieldInvalid(
                "toolId".into(),
                "not in grant scope".into(),
            ));
        }
        if !scope.allowed_risk_classes.is_empty()
            && !scope.allowed_risk_classes.iter().any(|r| r == check.risk_class)
        {
            return Err(NooterraError::FieldInvalid(
                "riskClass".into(),
                "not in grant scope".into(),
            ));
        }
        if check.side_effecting && !scope.side_effecting_allowed {
            return Err(NooterraError::FieldInvalid(
                "sideEffecting".into(),
                "not allowed by grant scope".into(),
            ));
        }

        if check.amount_cents > grant.spend_envelope.max_per_call_cents {
            return Err(NooterraError::AuthorityGrantPerCallExceeded {
                max: grant.spend_envelope.max_per_call_cents,
                requested: check.amount_cents,
            });
        }

        let running_total = self.running_total(tenant, &grant.grant_id)?;
        let would_be = running_total + check.amount_cents;
        if would_be > grant.spend_envelope.max_total_cents {
            return Err(NooterraError::AuthorityGrantTotalExceeded {
                max: grant.spend_envelope.max_total_cents,
                would_be,
            });
        }

        Ok(())
    }
}
