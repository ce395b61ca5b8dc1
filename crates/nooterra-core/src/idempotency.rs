use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{TenantId, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyScope {
    pub tenant_id: TenantId,
    pub route: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub scope: IdempotencyScope,
    pub key: String,
    pub request_hash: String,
    pub response_envelope: Value,
    pub created_at: Timestamp,
}
