//! Response types for the payroll API.
//!
//! Errors are rendered as `{code, message, details?}` with a stable,
//! lowercase `code` clients can match on.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{PayrollPeriod, Payslip, PeriodStatus};
use crate::payroll::{FinalizeOutcome, RunOutcome};

/// API error response structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Optional details about the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    /// Creates a new API error.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Creates a new API error with details.
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: Some(details.into()),
        }
    }

    /// Creates a validation error.
    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }
}

/// API error with HTTP status code.
#[derive(Debug)]
pub struct ApiErrorResponse {
    /// The HTTP status code.
    pub status: StatusCode,
    /// The error body.
    pub error: ApiError,
}

impl ApiErrorResponse {
    /// A 400 `validation_error`.
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: ApiError::validation_error(message),
        }
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}

impl From<CoreError> for ApiErrorResponse {
    fn from(err: CoreError) -> Self {
        let (status, error) = match &err {
            CoreError::Validation { message } => {
                (StatusCode::BAD_REQUEST, ApiError::validation_error(message.clone()))
            }
            CoreError::InvalidState {
                period_id, status, ..
            } => (
                StatusCode::BAD_REQUEST,
                ApiError::with_details(
                    "invalid_state",
                    err.to_string(),
                    format!("period {} is {}", period_id, status),
                ),
            ),
            CoreError::IdempotencyConflict { .. } => (
                StatusCode::CONFLICT,
                ApiError::with_details(
                    "idempotency_conflict",
                    err.to_string(),
                    "Use a new idempotency key for a different request",
                ),
            ),
            CoreError::PeriodNotFound { .. } | CoreError::PayslipNotFound { .. } => {
                (StatusCode::NOT_FOUND, ApiError::new("not_found", err.to_string()))
            }
            CoreError::LockTimeout { .. } => (
                StatusCode::SERVICE_UNAVAILABLE,
                ApiError::with_details(
                    "lock_timeout",
                    err.to_string(),
                    "Another operation holds the period; retry later",
                ),
            ),
            CoreError::Rendering { .. } => (
                StatusCode::BAD_GATEWAY,
                ApiError::new("render_failed", err.to_string()),
            ),
            CoreError::Calculation { .. }
            | CoreError::Storage { .. }
            | CoreError::ConfigNotFound { .. }
            | CoreError::ConfigParseError { .. } => {
                error!(error = %err, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError::new("internal_error", "Internal server error"),
                )
            }
        };
        Self { status, error }
    }
}

/// Body of a successful finalize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeResponse {
    /// The finalized period.
    pub period_id: Uuid,
    /// Always `finalized`.
    pub status: PeriodStatus,
    /// Commit time of the finalize.
    pub finalized_at: Option<DateTime<Utc>>,
    /// Number of payslips written.
    pub payslip_count: usize,
    /// The payslips written.
    pub payslips: Vec<Payslip>,
}

impl From<FinalizeOutcome> for FinalizeResponse {
    fn from(outcome: FinalizeOutcome) -> Self {
        Self {
            period_id: outcome.period.id,
            status: outcome.period.status,
            finalized_at: outcome.period.finalized_at,
            payslip_count: outcome.payslips.len(),
            payslips: outcome.payslips,
        }
    }
}

/// Body of a successful run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResponse {
    /// The period after the run.
    pub period: PayrollPeriod,
    /// Number of result rows computed.
    pub result_count: usize,
}

impl From<RunOutcome> for RunResponse {
    fn from(outcome: RunOutcome) -> Self {
        Self {
            period: outcome.period,
            result_count: outcome.results.len(),
        }
    }
}

/// Body of `GET /payroll/periods/{id}/payslips`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayslipListResponse {
    /// The period the payslips belong to.
    pub period_id: Uuid,
    /// Payslips ordered by employee id.
    pub payslips: Vec<Payslip>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_serialization() {
        let error = ApiError::new("validation_error", "Test message");
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("\"code\":\"validation_error\""));
        assert!(json.contains("\"message\":\"Test message\""));
        assert!(!json.contains("details"));
    }

    #[test]
    fn test_error_codes_and_statuses() {
        let cases = [
            (CoreError::validation("x"), StatusCode::BAD_REQUEST, "validation_error"),
            (
                CoreError::InvalidState {
                    period_id: Uuid::nil(),
                    status: PeriodStatus::Draft,
                    message: "finalize requires a reviewed period".to_string(),
                },
                StatusCode::BAD_REQUEST,
                "invalid_state",
            ),
            (
                CoreError::IdempotencyConflict {
                    key: "k1".to_string(),
                    endpoint: "POST /payroll/periods/:id/finalize".to_string(),
                },
                StatusCode::CONFLICT,
                "idempotency_conflict",
            ),
            (
                CoreError::PeriodNotFound {
                    period_id: Uuid::nil(),
                },
                StatusCode::NOT_FOUND,
                "not_found",
            ),
            (
                CoreError::LockTimeout {
                    period_id: Uuid::nil(),
                    waited_ms: 5000,
                },
                StatusCode::SERVICE_UNAVAILABLE,
                "lock_timeout",
            ),
            (
                CoreError::Rendering {
                    payslip_id: Uuid::nil(),
                    message: "offline".to_string(),
                },
                StatusCode::BAD_GATEWAY,
                "render_failed",
            ),
            (
                CoreError::storage("connection refused"),
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
            ),
        ];

        for (err, status, code) in cases {
            let response = ApiErrorResponse::from(err);
            assert_eq!(response.status, status);
            assert_eq!(response.error.code, code);
        }
    }

    #[test]
    fn test_internal_error_does_not_leak_details() {
        let response = ApiErrorResponse::from(CoreError::storage("password=hunter2"));
        assert!(!response.error.message.contains("hunter2"));
        assert!(response.error.details.is_none());
    }
}
