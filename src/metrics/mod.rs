//! Metrics Module
//!
//! Prometheus-compatible metrics for monitoring:
//! - API request metrics (latency, count, in-flight)
//! - Matching engine metrics (orders, trades, volume)
//! - Settlement metrics (outcomes)

#![allow(dead_code)]

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::models::{OrderSide, OrderType};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Metric names as constants for consistency
pub mod names {
    // API metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "http_requests_in_flight";

    // Matching engine metrics
    pub const ORDERS_SUBMITTED_TOTAL: &str = "orders_submitted_total";
    pub const ORDERS_CANCELLED_TOTAL: &str = "orders_cancelled_total";
    pub const TRADES_EXECUTED_TOTAL: &str = "trades_executed_total";
    pub const TRADE_VOLUME_QUOTE: &str = "trade_volume_quote";

    // Settlement metrics
    pub const SETTLEMENTS_TOTAL: &str = "settlements_total";
}

/// Label keys
pub mod labels {
    pub const METHOD: &str = "method";
    pub const ENDPOINT: &str = "endpoint";
    pub const STATUS: &str = "status";
    pub const ASSET: &str = "asset";
    pub const SIDE: &str = "side";
    pub const ORDER_TYPE: &str = "order_type";
    pub const OUTCOME: &str = "outcome";
}

/// Initialize the Prometheus exporter and return the render handle.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(names::HTTP_REQUEST_DURATION_SECONDS.to_string()),
            &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
        )
        .expect("histogram buckets are non-empty")
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Record one HTTP request.
pub fn record_http_request(method: &str, endpoint: &str, status: u16, duration_secs: f64) {
    counter!(
        names::HTTP_REQUESTS_TOTAL,
        labels::METHOD => method.to_string(),
        labels::ENDPOINT => endpoint.to_string(),
        labels::STATUS => status.to_string()
    )
    .increment(1);
    histogram!(
        names::HTTP_REQUEST_DURATION_SECONDS,
        labels::METHOD => method.to_string(),
        labels::ENDPOINT => endpoint.to_string()
    )
    .record(duration_secs);
}

/// Track in-flight HTTP requests.
pub fn adjust_http_requests_in_flight(delta: f64) {
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(delta);
}

pub fn record_order_submitted(asset: &str, side: OrderSide, order_type: OrderType) {
    counter!(
        names::ORDERS_SUBMITTED_TOTAL,
        labels::ASSET => asset.to_string(),
        labels::SIDE => side.to_string(),
        labels::ORDER_TYPE => order_type.to_string()
    )
    .increment(1);
}

pub fn record_order_cancelled(asset: &str) {
    counter!(
        names::ORDERS_CANCELLED_TOTAL,
        labels::ASSET => asset.to_string()
    )
    .increment(1);
}

pub fn record_trade_executed(asset: &str, quote_volume: Decimal) {
    counter!(
        names::TRADES_EXECUTED_TOTAL,
        labels::ASSET => asset.to_string()
    )
    .increment(1);
    histogram!(
        names::TRADE_VOLUME_QUOTE,
        labels::ASSET => asset.to_string()
    )
    .record(quote_volume.to_f64().unwrap_or(0.0));
}

pub fn record_settlement(outcome: &str) {
    counter!(
        names::SETTLEMENTS_TOTAL,
        labels::OUTCOME => outcome.to_string()
    )
    .increment(1);
}
