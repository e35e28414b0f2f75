//! HTTP API for the payroll core.
//!
//! Exposes the payroll period lifecycle over REST. Finalize is guarded by
//! the idempotency middleware.

mod handlers;
mod middleware;
mod request;
mod response;
mod state;

pub use handlers::create_router;
pub use middleware::{REPLAYED_HEADER, require_idempotency_key};
pub use request::{Caller, CreatePeriodRequest, TENANT_HEADER, USER_HEADER};
pub use response::{ApiError, ApiErrorResponse, FinalizeResponse, PayslipListResponse, RunResponse};
pub use state::AppState;
