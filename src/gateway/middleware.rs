//! Axum integration for the gateway pipeline.

use std::any::Any;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use crate::error::GatewayError;
use crate::gateway::{Gateway, RequestView};
use crate::http::request::{client_identifier, RequestId};
use crate::http::response::{internal_error_response, rejection_response};
use crate::observability::metrics;
use crate::security::headers::merge_headers;

/// Protect every route behind it with the gateway pipeline.
///
/// ```ignore
/// let app = Router::new()
///     .route("/api/items", get(list_items))
///     .layer(axum::middleware::from_fn_with_state(gateway, gateway_middleware));
/// ```
///
/// The body is buffered for scanning and handed to the handler unchanged.
/// Rejected requests never reach `next`.
pub async fn gateway_middleware(
    State(gateway): State<Gateway>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let (mut parts, body) = request.into_parts();
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client_id = client_identifier(&parts.headers, peer);

    let bytes = match axum::body::to_bytes(body, gateway.max_body_bytes()).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return fault_response(&gateway, &client_id, &parts, GatewayError::BodyRead(e.to_string()), start);
        }
    };

    let outcome = {
        let body_text = String::from_utf8_lossy(&bytes);
        // A present but unreadable Origin must not pass as absent.
        let origin = parts
            .headers
            .get(header::ORIGIN)
            .map(|v| v.to_str().unwrap_or(""));
        let view = RequestView {
            method: parts.method.as_str(),
            path: parts.uri.path(),
            url: parts
                .uri
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or_else(|| parts.uri.path()),
            origin,
            client_id: &client_id,
            body: &body_text,
        };
        panic::catch_unwind(AssertUnwindSafe(|| gateway.evaluate(&view, Utc::now())))
    };

    let evaluation = match outcome {
        Ok(Ok(evaluation)) => evaluation,
        Ok(Err(e)) => return fault_response(&gateway, &client_id, &parts, e, start),
        Err(payload) => {
            let error = GatewayError::Panic(panic_message(payload.as_ref()));
            return fault_response(&gateway, &client_id, &parts, error, start);
        }
    };

    metrics::record_decision(evaluation.decision.label(), start);

    if let Some(response) = rejection_response(&evaluation.decision, evaluation.headers.clone()) {
        return response;
    }

    parts.extensions.insert(RequestId(evaluation.request_id));
    let request = Request::from_parts(parts, Body::from(bytes));
    let mut response = next.run(request).await;
    merge_headers(response.headers_mut(), evaluation.headers);
    response
}

fn fault_response(
    gateway: &Gateway,
    client_id: &str,
    parts: &Parts,
    error: GatewayError,
    start: Instant,
) -> Response {
    let (request_id, headers) = gateway.fault(client_id, parts.method.as_str(), parts.uri.path(), &error);
    metrics::record_decision("internal_error", start);
    internal_error_response(request_id, headers)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
