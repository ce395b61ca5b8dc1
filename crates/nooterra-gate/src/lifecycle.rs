//! Agent lifecycle gating (spec §4.3 "Lifecycle gating").

use nooterra_core::error::{NooterraError, Result};
use nooterra_core::model::Agent;
use nooterra_core::types::LifecycleStatus;

/// Any operation issued against a `suspended` agent fails closed; a
/// `throttled` agent fails with a distinct (retryable) reason code.
pub fn check_lifecycle(agent: &Agent) -> Result<()> {
    match agent.lifecycle_status {
        LifecycleStatus::Active => Ok(()),
        LifecycleStatus::Suspended => Err(NooterraError::AgentSuspended(agent.agent_id.to_string())),
        LifecycleStatus::Throttled => Err(NooterraError::AgentThrottled(agent.agent_id.to_string())),
    }
}
