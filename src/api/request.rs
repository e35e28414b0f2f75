//! Request types for the payroll API.
//!
//! Every payroll endpoint is tenant scoped. Authentication happens upstream
//! and forwards the caller's identity in the `X-Tenant-Id` and `X-User-Id`
//! headers.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

use super::response::ApiErrorResponse;

/// Header carrying the caller's tenant.
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Header carrying the acting user.
pub const USER_HEADER: &str = "x-user-id";

/// Request body for `POST /payroll/periods`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePeriodRequest {
    /// The pay schedule the period belongs to.
    pub schedule_id: String,
    /// First day of the period (inclusive).
    pub start_date: NaiveDate,
    /// Last day of the period (inclusive).
    pub end_date: NaiveDate,
}

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// Tenant the request acts on.
    pub tenant_id: String,
    /// User performing the request.
    pub user_id: String,
}

impl Caller {
    /// Reads the caller identity headers.
    ///
    /// Fails with a validation error if either header is missing or blank.
    pub fn from_headers(headers: &HeaderMap) -> CoreResult<Self> {
        Ok(Self {
            tenant_id: required_header(headers, TENANT_HEADER)?,
            user_id: required_header(headers, USER_HEADER)?,
        })
    }
}

fn required_header(headers: &HeaderMap, name: &str) -> CoreResult<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| CoreError::validation(format!("missing required header {}", name)))
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiErrorResponse;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Caller::from_headers(&parts.headers).map_err(ApiErrorResponse::from)
    }
}
