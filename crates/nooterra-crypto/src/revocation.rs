use std::collections::HashMap;

use nooterra_core::event::{Event, EventPayload, GovernancePayload};
use nooterra_core::types::{KeyId, Timestamp};

/// Derives signer-key eligibility solely by folding the governance stream.
/// A verifier must never trust an out-of-band "keys" manifest's
/// `revokedAt` — that value is at most a cache of what this index computes
/// authoritatively.
#[derive(Debug, Default)]
pub struct KeyStatusIndex {
    /// For each key, the earliest timestamp at which it became ineligible
    /// (rotated away from, or explicitly revoked).
    ineligible_from: HashMap<KeyId, Timestamp>,
}

impl KeyStatusIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a governance-stream event into the index. Idempotent: folding
    /// the same event twice does not change the result.
    pub fn apply_governance_event(&mut self, event: &Event) {
        let (key_id, at) = match &event.payload {
            EventPayload::Governance(GovernancePayload::ServerSignerKeyRevoked {
                key_id, ..
            }) => (key_id.clone(), event.at),
            EventPayload::Governance(GovernancePayload::ServerSignerKeyRotated {
                key_id, ..
            }) => (key_id.clone(), event.at),
            _ => return,
        };
        let entry = self.ineligible_from.entry(key_id).or_insert(at);
        if at < *entry {
            *entry = at;
        }
    }

    pub fn rebuild(events: &[Event]) -> Self {
        let mut idx = Self::new();
        for event in events {
            idx.apply_governance_event(event);
        }
        idx
    }

    /// True if `key_id` was eligible to produce a valid signature at `at`.
    pub fn is_active_at(&self, key_id: &KeyId, at: Timestamp) -> bool {
        match self.ineligible_from.get(key_id) {
            Some(revoked_at) => at < *revoked_at,
            None => true,
        }
    }
}
