//! Idempotency-key replay/conflict semantics (spec §4.5, §7, §8).
//!
//! `(scope, key) -> requestHash -> responseEnvelope`. A second call with the
//! same key: identical `requestHash` replays the stored envelope
//! byte-for-byte; a different `requestHash` is `IDEMPOTENCY_KEY_CONFLICT`.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use nooterra_core::error::{NooterraError, Result};
use nooterra_core::idempotency::{IdempotencyRecord, IdempotencyScope};
use nooterra_store::Store;

/// Outcome of checking an idempotency key before running an operation.
#[derive(Debug)]
pub enum IdempotencyCheck {
    /// No prior record for this key — caller should run the operation and
    /// then call [`IdempotencyGuard::record`].
    Fresh,
    /// A prior record with the same `requestHash` exists — replay it
    /// byte-for-byte, never re-running the operation.
    Replay(Value),
}

/// Wraps a [`Store`] to implement the replay/conflict rule once, shared by
/// every mutating endpoint that carries an `x-idempotency-key`.
pub struct IdempotencyGuard {
    store: Arc<dyn Store>,
}

impl IdempotencyGuard {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Look up `(scope, key)`. `request_hash` is the caller's canonical hash
    /// of the request body.
    pub fn check(
        &self,
        scope: &IdempotencyScope,
        key: &str,
        request_hash: &str,
    ) -> Result<IdempotencyCheck> {
        match self.store.idempotency_get(scope, key)? {
            None => Ok(IdempotencyCheck::Fresh),
            Some(record) if record.request_hash == request_hash => {
                debug!(scope = %scope.route, key, "idempotency replay");
                Ok(IdempotencyCheck::Replay(record.response_envelope))
            }
            Some(_) => {
                warn!(scope = %scope.route, key, "idempotency key conflict");
                Err(NooterraError::IdempotencyKeyConflict {
                    scope: scope.route.clone(),
                })
            }
        }
    }

    /// Persist the response envelope produced by a fresh operation so a
    /// later replay with the same key returns it unchanged.
    pub fn record(
        &self,
        scope: IdempotencyScope,
        key: impl Into<String>,
        request_hash: impl Into<String>,
        response_envelope: Value,
        at: nooterra_core::types::Timestamp,
    ) -> Result<()> {
        self.store.idempotency_put(IdempotencyRecord {
            scope,
            key: key.into(),
            request_hash: request_hash.into(),
            response_envelope,
            created_at: at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nooterra_core::clock::FixedClock;
    use nooterra_core::types::TenantId;
    use nooterra_crypto::KeyPair;
    use serde_json::json;
    use std::sync::Arc;

    fn guard() -> (IdempotencyGuard, IdempotencyScope) {
        let clock = Arc::new(FixedClock::new(0));
        let signer = Arc::new(KeyPair::generate());
        let store: Arc<dyn Store> =
            Arc::new(nooterra_store::InMemoryStore::open_temp(clock, signer).unwrap());
        let scope = IdempotencyScope {
            tenant_id: TenantId::new("t1"),
            route: "x402/gate/create".into(),
        };
        (IdempotencyGuard::new(store), scope)
    }

    #[test]
    fn fresh_key_then_replay_on_same_hash() {
        let (guard, scope) = guard();
        assert!(matches!(
            guard.check(&scope, "k1", "h1").unwrap(),
            IdempotencyCheck::Fresh
        ));
        guard
            .record(scope.clone(), "k1", "h1", json!({"ok": true}), 0)
            .unwrap();
        match guard.check(&scope, "k1", "h1").unwrap() {
            IdempotencyCheck::Replay(v) => assert_eq!(v, json!({"ok": true})),
            IdempotencyCheck::Fresh => panic!("expected replay"),
        }
    }

    #[test]
    fn conflicting_hash_rejected() {
        let (guard, scope) = guard();
        guard
            .record(scope.clone(), "k1", "h1", json!({"ok": true}), 0)
            .unwrap();
        let err = guard.check(&scope, "k1", "h2").unwrap_err();
        assert!(matches!(err, NooterraError::IdempotencyKeyConflict { .. }));
    }
}
