//! Gateway-generated responses.
//!
//! # Responsibilities
//! - Render rejection decisions as JSON error bodies
//! - Render internal faults as an opaque 500 with a correlation ID
//! - Attach the composed gateway headers to both
//!
//! # Design Decisions
//! - Bodies never echo request content or signature details

use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::gateway::Decision;
use crate::security::headers::{format_timestamp, merge_headers};

/// Status and body for a rejection. `None` for `Admit`.
pub fn rejection_body(decision: &Decision) -> Option<(StatusCode, Value)> {
    match decision {
        Decision::Admit => None,
        Decision::RejectCors => Some((
            StatusCode::FORBIDDEN,
            json!({ "error": "CORS policy violation" }),
        )),
        Decision::RejectThreat(_) => Some((
            StatusCode::FORBIDDEN,
            json!({ "error": "Request blocked for security reasons" }),
        )),
        Decision::RejectQuota { retry_after } => Some((
            StatusCode::TOO_MANY_REQUESTS,
            json!({
                "error": "Rate limit exceeded",
                "retryAfter": format_timestamp(*retry_after),
            }),
        )),
    }
}

/// Response for a rejection decision, carrying the composed headers.
pub fn rejection_response(decision: &Decision, headers: HeaderMap) -> Option<Response> {
    rejection_body(decision).map(|(status, body)| json_response(status, body, headers))
}

/// Opaque 500 for a pipeline fault.
pub fn internal_error_response(request_id: Uuid, headers: HeaderMap) -> Response {
    json_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "error": "Internal server error", "requestId": request_id }),
        headers,
    )
}

pub fn json_response(status: StatusCode, body: Value, headers: HeaderMap) -> Response {
    let mut response = (status, Json(body)).into_response();
    merge_headers(response.headers_mut(), headers);
    response
}
