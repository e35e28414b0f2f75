//! Idempotency middleware.
//!
//! Adapts [`IdempotencyGate`](crate::idempotency::IdempotencyGate) to axum.
//! Attach it with `route_layer` so the matched route template is known:
//!
//! ```ignore
//! Router::new()
//!     .route("/payroll/periods/:id/finalize", post(finalize_handler))
//!     .route_layer(middleware::from_fn_with_state(state.clone(), require_idempotency_key));
//! ```
//!
//! Only the status, content type and body of a response are stored and
//! replayed.

use axum::{
    body::{Body, to_bytes},
    extract::{MatchedPath, Request, State},
    http::{HeaderName, HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::idempotency::{GateResponse, RequestFingerprint};
use crate::models::{IdempotencyScope, StoredResponse};

use super::request::Caller;
use super::response::ApiErrorResponse;
use super::state::AppState;

/// Header set on responses served from the idempotency store.
pub const REPLAYED_HEADER: &str = "idempotent-replayed";

const MAX_KEY_LEN: usize = 255;

/// Requires an idempotency key and runs the route at most once per key.
pub async fn require_idempotency_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    match guard(&state, request, next).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn guard(
    state: &AppState,
    request: Request,
    next: Next,
) -> Result<Response, ApiErrorResponse> {
    let config = &state.config().idempotency;

    let key = request
        .headers()
        .get(config.header.as_str())
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or_else(|| CoreError::validation(format!("missing {} header", config.header)))?
        .to_string();
    if key.len() > MAX_KEY_LEN {
        return Err(ApiErrorResponse::validation(format!(
            "{} must be at most {} characters",
            config.header, MAX_KEY_LEN
        )));
    }
    let caller = Caller::from_headers(request.headers())?;

    let method = request.method().as_str().to_string();
    let path = request.uri().path().to_string();
    let template = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| path.clone());

    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, config.max_body_bytes).await.map_err(|_| {
        ApiErrorResponse::validation(format!(
            "request body exceeds {} bytes",
            config.max_body_bytes
        ))
    })?;

    let fingerprint = RequestFingerprint::compute(&method, &template, &path, &bytes);
    let scope = IdempotencyScope {
        tenant_id: caller.tenant_id,
        user_id: caller.user_id,
        key,
        endpoint: format!("{} {}", method, template),
    };
    debug!(
        tenant_id = %scope.tenant_id,
        idempotency_key = %scope.key,
        fingerprint = %fingerprint,
        "Checking idempotency key"
    );

    let request = Request::from_parts(parts, Body::from(bytes));
    let outcome = state
        .gate()
        .execute(&scope, &fingerprint, move || async move {
            capture(next.run(request).await).await
        })
        .await?;

    Ok(into_response(outcome))
}

async fn capture(response: Response) -> CoreResult<StoredResponse> {
    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .map_err(|err| CoreError::storage(format!("failed to buffer response: {}", err)))?;
    let body = String::from_utf8(bytes.to_vec())
        .map_err(|_| CoreError::storage("response body is not valid UTF-8"))?;

    Ok(StoredResponse {
        status,
        content_type,
        body,
    })
}

fn into_response(outcome: GateResponse) -> Response {
    let GateResponse { response, replayed } = outcome;
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut http = (status, response.body).into_response();
    let headers = http.headers_mut();
    match response
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
    {
        Some(value) => {
            headers.insert(header::CONTENT_TYPE, value);
        }
        None => {
            headers.remove(header::CONTENT_TYPE);
        }
    }
    if replayed {
        headers.insert(
            HeaderName::from_static(REPLAYED_HEADER),
            HeaderValue::from_static("true"),
        );
    }
    http
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replayed_response_carries_marker_and_content_type() {
        let response = into_response(GateResponse {
            response: StoredResponse {
                status: 200,
                content_type: Some("application/json".to_string()),
                body: r#"{"status":"finalized"}"#.to_string(),
            },
            replayed: true,
        });

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(response.headers()[REPLAYED_HEADER], "true");
    }

    #[test]
    fn test_fresh_response_has_no_marker() {
        let response = into_response(GateResponse {
            response: StoredResponse {
                status: 400,
                content_type: None,
                body: String::new(),
            },
            replayed: false,
        });

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get(REPLAYED_HEADER).is_none());
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());
    }

    #[tokio::test]
    async fn test_capture_keeps_status_and_body() {
        let response = (
            StatusCode::CREATED,
            [(header::CONTENT_TYPE, "application/json")],
            r#"{"ok":true}"#,
        )
            .into_response();

        let stored = capture(response).await.unwrap();
        assert_eq!(stored.status, 201);
        assert_eq!(stored.content_type.as_deref(), Some("application/json"));
        assert_eq!(stored.body, r#"{"ok":true}"#);
    }
}
