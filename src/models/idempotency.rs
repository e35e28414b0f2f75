//! Idempotency record models.
//!
//! These types are generic over the guarded endpoint: nothing here knows
//! about payroll.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The uniqueness tuple of an idempotency record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdempotencyScope {
    /// The tenant of the caller.
    pub tenant_id: String,
    /// The acting user.
    pub user_id: String,
    /// The client-supplied key.
    pub key: String,
    /// Logical endpoint identifier, e.g. `POST /payroll/periods/:id/finalize`.
    pub endpoint: String,
}

/// A response captured on the first successful completion of a guarded
/// operation, replayed verbatim for matching retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    /// HTTP status code.
    pub status: u16,
    /// Value of the `Content-Type` header, if any.
    pub content_type: Option<String>,
    /// Response body exactly as first sent.
    pub body: String,
}

/// A committed idempotency record. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    /// Unique tuple identifying the record.
    pub scope: IdempotencyScope,
    /// Hex digest of the logical request the key was first used for.
    pub fingerprint: String,
    /// The response to replay.
    pub response: StoredResponse,
    /// When the record was committed.
    pub created_at: DateTime<Utc>,
}
