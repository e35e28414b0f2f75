//! The idempotency gate protocol.
//!
//! The gate is transport independent: it takes a scope, a fingerprint and
//! the guarded operation, and decides whether to run the operation, replay
//! a stored response, or reject the request as a conflict. The HTTP
//! middleware in `api` is a thin adapter over [`IdempotencyGate::execute`].

use std::future::Future;

use chrono::Utc;
use tracing::{info, warn};

use crate::error::{CoreError, CoreResult};
use crate::models::{IdempotencyRecord, IdempotencyScope, StoredResponse};
use crate::store::{IdempotencyStoreRef, SaveOutcome};

use super::RequestFingerprint;

/// What the gate decided before running the guarded operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// First use of the key: run the operation.
    Proceed,
    /// Matching retry: replay the stored response instead.
    Replay(StoredResponse),
}

/// What happened when the gate tried to persist a fresh response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// This response is now the canonical one for the key.
    Recorded,
    /// A racing caller committed first with the same fingerprint; its
    /// response is canonical.
    Converged(StoredResponse),
    /// A racing caller committed first with a different fingerprint. The
    /// next request with this key will be rejected.
    Conflicted,
}

/// The response handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateResponse {
    /// Status, content type and body to send.
    pub response: StoredResponse,
    /// True if the response came from the store rather than a fresh run.
    pub replayed: bool,
}

/// Guards mutations with caller-supplied idempotency keys.
#[derive(Clone)]
pub struct IdempotencyGate {
    store: IdempotencyStoreRef,
}

impl IdempotencyGate {
    /// Creates a gate over the given record store.
    pub fn new(store: IdempotencyStoreRef) -> Self {
        Self { store }
    }

    /// Looks up the key and compares fingerprints.
    ///
    /// Fails with `IdempotencyConflict` if the key was already used for a
    /// different logical request.
    pub async fn check(
        &self,
        scope: &IdempotencyScope,
        fingerprint: &RequestFingerprint,
    ) -> CoreResult<GateDecision> {
        match self.store.find(scope).await? {
            None => Ok(GateDecision::Proceed),
            Some(record) if record.fingerprint == fingerprint.as_str() => {
                info!(
                    tenant_id = %scope.tenant_id,
                    idempotency_key = %scope.key,
                    endpoint = %scope.endpoint,
                    "Replaying stored response"
                );
                Ok(GateDecision::Replay(record.response))
            }
            Some(_) => {
                warn!(
                    tenant_id = %scope.tenant_id,
                    idempotency_key = %scope.key,
                    endpoint = %scope.endpoint,
                    "Idempotency key reused for a different request"
                );
                Err(CoreError::IdempotencyConflict {
                    key: scope.key.clone(),
                    endpoint: scope.endpoint.clone(),
                })
            }
        }
    }

    /// Persists the first successful response for a key.
    pub async fn record(
        &self,
        scope: &IdempotencyScope,
        fingerprint: &RequestFingerprint,
        response: StoredResponse,
    ) -> CoreResult<RecordOutcome> {
        let record = IdempotencyRecord {
            scope: scope.clone(),
            fingerprint: fingerprint.as_str().to_string(),
            response,
            created_at: Utc::now(),
        };
        match self.store.save(record).await? {
            SaveOutcome::Inserted => Ok(RecordOutcome::Recorded),
            SaveOutcome::Matched(existing) => Ok(RecordOutcome::Converged(existing.response)),
            SaveOutcome::Conflict(_) => {
                warn!(
                    tenant_id = %scope.tenant_id,
                    idempotency_key = %scope.key,
                    endpoint = %scope.endpoint,
                    "Lost idempotency race to a different request; keeping the committed record"
                );
                Ok(RecordOutcome::Conflicted)
            }
        }
    }

    /// Returns a response committed by a racing caller for the same logical
    /// request, if any.
    pub async fn converged(
        &self,
        scope: &IdempotencyScope,
        fingerprint: &RequestFingerprint,
    ) -> CoreResult<Option<StoredResponse>> {
        Ok(self
            .store
            .find(scope)
            .await?
            .filter(|r| r.fingerprint == fingerprint.as_str())
            .map(|r| r.response))
    }

    /// Runs `operation` at most once per logical request.
    ///
    /// The operation reports its outcome as a [`StoredResponse`]; only 2xx
    /// responses are recorded. If the operation fails and a racing caller
    /// has meanwhile committed a response for the same logical request,
    /// that response is returned instead of the failure.
    pub async fn execute<F, Fut>(
        &self,
        scope: &IdempotencyScope,
        fingerprint: &RequestFingerprint,
        operation: F,
    ) -> CoreResult<GateResponse>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CoreResult<StoredResponse>>,
    {
        if let GateDecision::Replay(response) = self.check(scope, fingerprint).await? {
            return Ok(GateResponse {
                response,
                replayed: true,
            });
        }

        match operation().await {
            Ok(response) if is_success(response.status) => {
                let outcome = match self.record(scope, fingerprint, response.clone()).await {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        // The operation has committed; report its result even
                        // though a retry will run it again.
                        warn!(
                            idempotency_key = %scope.key,
                            error = %err,
                            "Failed to persist idempotency record"
                        );
                        RecordOutcome::Recorded
                    }
                };
                Ok(match outcome {
                    RecordOutcome::Converged(winner) => GateResponse {
                        response: winner,
                        replayed: true,
                    },
                    RecordOutcome::Recorded | RecordOutcome::Conflicted => GateResponse {
                        response,
                        replayed: false,
                    },
                })
            }
            Ok(response) => Ok(match self.converged(scope, fingerprint).await? {
                Some(winner) => GateResponse {
                    response: winner,
                    replayed: true,
                },
                None => GateResponse {
                    response,
                    replayed: false,
                },
            }),
            Err(err) => match self.converged(scope, fingerprint).await? {
                Some(winner) => Ok(GateResponse {
                    response: winner,
                    replayed: true,
                }),
                None => Err(err),
            },
        }
    }
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}
