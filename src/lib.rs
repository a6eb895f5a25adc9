//! Universal Exchange Backend
//!
//! A small exchange backend: limit and market orders against assets quoted
//! in USDC, matched in a central limit order book with price-time priority,
//! with atomic balance settlement per trade and an asynchronous simulated
//! settlement path for funding movements.

use std::sync::Arc;

use axum::{middleware as axum_middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod api;
pub mod config;
pub mod events;
pub mod metrics;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

use crate::config::AppConfig;
use crate::events::EventBus;
use crate::services::matching::MatchingEngine;
use crate::store::Store;

pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn Store>,
    pub bus: Arc<EventBus>,
    pub engine: Arc<MatchingEngine>,
    pub metrics: Option<PrometheusHandle>,
}

/// Assemble the full application router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/metrics", get(api::handlers::health::metrics))
        .nest("/api", api::routes::create_router())
        .layer(axum_middleware::from_fn(
            api::middleware::metrics_middleware,
        ))
        .layer(axum_middleware::from_fn(
            api::middleware::trace_id_middleware,
        ))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
