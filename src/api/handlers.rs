//! HTTP request handlers for the payroll API.

use axum::{
    Json, Router,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    middleware,
    routing::{get, post},
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{PayrollPeriod, Payslip};

use super::middleware::require_idempotency_key;
use super::request::{Caller, CreatePeriodRequest};
use super::response::{ApiErrorResponse, FinalizeResponse, PayslipListResponse, RunResponse};
use super::state::AppState;

type ApiResult<T> = Result<T, ApiErrorResponse>;

/// Creates the API router with all endpoints.
///
/// Finalize sits behind the idempotency middleware; every other route is
/// unguarded.
pub fn create_router(state: AppState) -> Router {
    let guarded = Router::new()
        .route("/payroll/periods/:id/finalize", post(finalize_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_idempotency_key,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .route("/payroll/periods", post(create_period_handler))
        .route("/payroll/periods/:id", get(get_period_handler))
        .route("/payroll/periods/:id/payslips", get(list_payslips_handler))
        .route("/payroll/periods/:id/run", post(run_handler))
        .route("/payroll/periods/:id/reopen", post(reopen_handler))
        .route("/payroll/payslips/:id/regenerate", post(regenerate_handler))
        .merge(guarded)
        .with_state(state)
}

async fn health_handler() -> &'static str {
    "ok"
}

/// Handler for POST /payroll/periods.
async fn create_period_handler(
    State(state): State<AppState>,
    caller: Caller,
    payload: Result<Json<CreatePeriodRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<PayrollPeriod>)> {
    let correlation_id = Uuid::new_v4();
    let Json(request) = payload.map_err(|rejection| {
        warn!(
            correlation_id = %correlation_id,
            error = %rejection.body_text(),
            "Rejected period request body"
        );
        ApiErrorResponse::validation(rejection.body_text())
    })?;

    let period = state
        .service()
        .create_period(
            &caller.tenant_id,
            &request.schedule_id,
            request.start_date,
            request.end_date,
        )
        .await
        .map_err(|err| failure(correlation_id, "create period", err))?;

    info!(
        correlation_id = %correlation_id,
        tenant_id = %caller.tenant_id,
        user_id = %caller.user_id,
        period_id = %period.id,
        "Period created"
    );
    Ok((StatusCode::CREATED, Json(period)))
}

/// Handler for GET /payroll/periods/{id}.
async fn get_period_handler(
    State(state): State<AppState>,
    caller: Caller,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<PayrollPeriod>> {
    let correlation_id = Uuid::new_v4();
    let period_id = resource_id(path)?;

    let period = state
        .service()
        .get_period(&caller.tenant_id, period_id)
        .await
        .map_err(|err| failure(correlation_id, "get period", err))?;
    Ok(Json(period))
}

/// Handler for GET /payroll/periods/{id}/payslips.
async fn list_payslips_handler(
    State(state): State<AppState>,
    caller: Caller,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<PayslipListResponse>> {
    let correlation_id = Uuid::new_v4();
    let period_id = resource_id(path)?;

    let payslips = state
        .service()
        .list_payslips(&caller.tenant_id, period_id)
        .await
        .map_err(|err| failure(correlation_id, "list payslips", err))?;
    Ok(Json(PayslipListResponse {
        period_id,
        payslips,
    }))
}

/// Handler for POST /payroll/periods/{id}/run.
async fn run_handler(
    State(state): State<AppState>,
    caller: Caller,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<RunResponse>> {
    let correlation_id = Uuid::new_v4();
    let period_id = resource_id(path)?;
    info!(
        correlation_id = %correlation_id,
        tenant_id = %caller.tenant_id,
        user_id = %caller.user_id,
        period_id = %period_id,
        "Running payroll period"
    );

    let outcome = state
        .service()
        .run(&caller.tenant_id, period_id)
        .await
        .map_err(|err| failure(correlation_id, "run", err))?;
    Ok(Json(outcome.into()))
}

/// Handler for POST /payroll/periods/{id}/finalize.
///
/// Reached only through the idempotency middleware.
async fn finalize_handler(
    State(state): State<AppState>,
    caller: Caller,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<FinalizeResponse>> {
    let correlation_id = Uuid::new_v4();
    let period_id = resource_id(path)?;
    info!(
        correlation_id = %correlation_id,
        tenant_id = %caller.tenant_id,
        user_id = %caller.user_id,
        period_id = %period_id,
        "Finalizing payroll period"
    );

    let outcome = state
        .service()
        .finalize(&caller.tenant_id, period_id)
        .await
        .map_err(|err| failure(correlation_id, "finalize", err))?;
    Ok(Json(outcome.into()))
}

/// Handler for POST /payroll/periods/{id}/reopen.
async fn reopen_handler(
    State(state): State<AppState>,
    caller: Caller,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<PayrollPeriod>> {
    let correlation_id = Uuid::new_v4();
    let period_id = resource_id(path)?;
    info!(
        correlation_id = %correlation_id,
        tenant_id = %caller.tenant_id,
        user_id = %caller.user_id,
        period_id = %period_id,
        "Reopening payroll period"
    );

    let period = state
        .service()
        .reopen(&caller.tenant_id, period_id)
        .await
        .map_err(|err| failure(correlation_id, "reopen", err))?;
    Ok(Json(period))
}

/// Handler for POST /payroll/payslips/{id}/regenerate.
async fn regenerate_handler(
    State(state): State<AppState>,
    caller: Caller,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Payslip>> {
    let correlation_id = Uuid::new_v4();
    let payslip_id = resource_id(path)?;

    let payslip = state
        .service()
        .regenerate_payslip(&caller.tenant_id, payslip_id)
        .await
        .map_err(|err| failure(correlation_id, "regenerate payslip", err))?;
    Ok(Json(payslip))
}

fn resource_id(path: Result<Path<Uuid>, PathRejection>) -> ApiResult<Uuid> {
    path.map(|Path(id)| id)
        .map_err(|rejection| ApiErrorResponse::validation(rejection.body_text()))
}

fn failure(correlation_id: Uuid, operation: &str, err: CoreError) -> ApiErrorResponse {
    warn!(
        correlation_id = %correlation_id,
        operation,
        error = %err,
        "Request failed"
    );
    err.into()
}
