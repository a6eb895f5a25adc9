//! Trace Id Middleware
//!
//! Assigns every request a trace id, attaches it to a tracing span so all
//! downstream log lines carry it, and echoes it in the `x-trace-id`
//! response header.

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

static TRACE_ID_HEADER: HeaderName = HeaderName::from_static("x-trace-id");

/// Request extension carrying the assigned trace id.
#[derive(Debug, Clone, Copy)]
pub struct TraceId(pub Uuid);

pub async fn trace_id_middleware(mut request: Request<Body>, next: Next) -> Response {
    let trace_id = Uuid::new_v4();
    request.extensions_mut().insert(TraceId(trace_id));

    let span = tracing::info_span!(
        "request",
        trace_id = %trace_id,
        method = %request.method(),
        path = %request.uri().path(),
    );

    let mut response = next.run(request).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&trace_id.to_string()) {
        response.headers_mut().insert(TRACE_ID_HEADER.clone(), value);
    }
    response
}
