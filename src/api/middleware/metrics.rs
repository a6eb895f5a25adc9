//! Request Metrics Middleware
//!
//! Wraps every request in a timing scope. The in-flight gauge rises on
//! entry and falls on exit; the count/duration pair is labelled with the
//! matched route template instead of the raw URI, so dynamic path segments
//! do not blow up the label space.

use axum::{
    body::Body,
    extract::MatchedPath,
    http::Request,
    middleware::Next,
    response::Response,
};
use std::time::Instant;

use crate::metrics;

/// The route template a request matched, or its literal path when the
/// router never matched it (404s and friends).
fn route_template(request: &Request<Body>) -> String {
    match request.extensions().get::<MatchedPath>() {
        Some(matched) => matched.as_str().to_string(),
        None => request.uri().path().to_string(),
    }
}

pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let endpoint = route_template(&request);
    let method = request.method().as_str().to_string();

    metrics::adjust_http_requests_in_flight(1.0);
    let started = Instant::now();
    let response = next.run(request).await;
    let elapsed = started.elapsed().as_secs_f64();
    metrics::adjust_http_requests_in_flight(-1.0);

    metrics::record_http_request(&method, &endpoint, response.status().as_u16(), elapsed);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_template_falls_back_to_the_literal_path() {
        let request = Request::builder()
            .uri("/api/orders/1b2c")
            .body(Body::empty())
            .unwrap();
        assert_eq!(route_template(&request), "/api/orders/1b2c");
    }
}
