//! The canonical per-stream hash-chained event log.
//!
//! This crate owns the pure chain-hash computation, event construction and
//! signing, and the per-stream locking discipline. Durable storage of the
//! chain tip and the events themselves belongs to `nooterra-store`, which
//! calls into [`EventChainer`] to build each appended [`Event`].

pub mod locks;

use std::sync::Arc;

use nooterra_core::clock::Clock;
use nooterra_core::error::{NooterraError, Result};
use nooterra_core::event::{ChainSnapshot, Event, EventPayload};
use nooterra_core::types::{EventId, KeyId, StreamId};
use nooterra_crypto::canonical::to_canonical_bytes;
use nooterra_crypto::hash::sha256_hex;
use nooterra_crypto::keypair::KeyPair;
use nooterra_crypto::signing;
use serde_json::{json, Value};

pub use locks::StreamLocks;

/// Computes `chainHash = H(canonicalJSON({prev: prevChainHash, ...event}))`.
pub fn compute_chain_hash(prev_chain_hash: Option<&str>, event_core: &Value) -> Result<String> {
    let mut obj = match event_core {
        Value::Object(m) => m.clone(),
        other => {
            return Err(NooterraError::Canonicalization(format!(
                "event core must be an object, got {other}"
            )))
        }
    };
    obj.insert(
        "prev".to_string(),
        prev_chain_hash.map(Value::from).unwrap_or(Value::Null),
    );
    let bytes = to_canonical_bytes(&Value::Object(obj))
        .map_err(|e| NooterraError::Canonicalization(e.to_string()))?;
    Ok(sha256_hex(&bytes))
}

/// Builds and signs events for a single logical append-only log, one
/// instance shared across all streams in a tenant.
pub struct EventChainer {
    clock: Arc<dyn Clock>,
    signer: Arc<KeyPair>,
}

impl EventChainer {
    pub fn new(clock: Arc<dyn Clock>, signer: Arc<KeyPair>) -> Self {
        Self { clock, signer }
    }

    pub fn signer_key_id(&self) -> KeyId {
        self.signer.key_id.clone()
    }

    /// Build the next event for `stream_id` given the current chain tip.
    /// Caller must hold `stream_id`'s lock (see [`StreamLocks`]) for the
    /// duration between reading `prev_chain_hash` and persisting the result.
    pub fn build_event(
        &self,
        event_id: EventId,
        stream_id: StreamId,
        kind: impl Into<String>,
        actor: impl Into<String>,
        payload: EventPayload,
        prev_chain_hash: Option<&str>,
    ) -> Result<Event> {
        let at = self.clock.now();
        let kind = kind.into();
        let actor = actor.into();

        let payload_value = serde_json::to_value(&payload)
            .map_err(|e| NooterraError::Serialization(e.to_string()))?;
        let core = json!({
            "v": 1,
            "id": event_id.as_str(),
            "at": at,
            "streamId": stream_id.as_str(),
            "type": kind,
            "actor": actor,
            "payload": payload_value,
        });
        let chain_hash = compute_chain_hash(prev_chain_hash, &core)?;

        let signature = signing::sign(&chain_hash, &self.signer, "event_chain", &Value::Null)
            .map_err(|e| NooterraError::Canonicalization(e.to_string()))?;

        Ok(Event {
            v: 1,
            id: event_id,
            at,
            stream_id,
            kind,
            actor,
            payload,
            prev_chain_hash: prev_chain_hash.map(|s| s.to_string()),
            chain_hash,
            signer_key_id: self.signer.key_id.clone(),
            signature,
        })
    }
}

pub fn snapshot(stream_id: StreamId, last: Option<&Event>) -> ChainSnapshot {
    ChainSnapshot {
        stream_id,
        last_chain_hash: last.map(|e| e.chain_hash.clone()),
        last_event_id: last.map(|e| e.id.clone()),
    }
}

/// Replays a stream's events, verifying `chainHash_i = H(canonicalJSON({prev:
/// chainHash_{i-1}, ...event_i}))` for each link. Returns an error on the
/// first mismatch, naming the offending event id.
pub fn verify_chain(events: &[Event]) -> Result<()> {
    let mut prev: Option<String> = None;
    for event in events {
        let payload_value = serde_json::to_value(&event.payload)
            .map_err(|e| NooterraError::Serialization(e.to_string()))?;
        let core = json!({
            "v": event.v,
            "id": event.id.as_str(),
            "at": event.at,
            "streamId": event.stream_id.as_str(),
            "type": event.kind,
            "actor": event.actor,
            "payload": payload_value,
        });
        let expected = compute_chain_hash(prev.as_deref(), &core)?;
        if expected != event.chain_hash {
            return Err(NooterraError::BundleIntegrity(format!(
                "chain hash mismatch at event {}",
                event.id
            )));
        }
        prev = Some(event.chain_hash.clone());
    }
    Ok(())
}
