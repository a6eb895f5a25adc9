use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::api::handlers;
use crate::AppState;

/// All routes mounted under `/api`.
pub fn create_router() -> Router<Arc<AppState>> {
    Router::new()
        // Settlements
        .route("/settle", post(handlers::settlement::create_settlement))
        .route("/settlements", get(handlers::settlement::list_settlements))
        .route(
            "/settlements/address/:address",
            get(handlers::settlement::get_settlements_by_address),
        )
        .route("/settlements/:id", get(handlers::settlement::get_settlement))
        // Balances & assets
        .route("/balance/:address", get(handlers::balance::get_balance))
        .route(
            "/balance/:address/all",
            get(handlers::balance::get_all_balances),
        )
        .route("/assets", get(handlers::asset::list_assets))
        // Orders
        .route(
            "/orders",
            post(handlers::order::create_order).get(handlers::order::list_orders),
        )
        .route("/orders/book/:asset", get(handlers::order::get_book))
        .route("/orders/:id", get(handlers::order::get_order))
        .route("/orders/:id/cancel", post(handlers::order::cancel_order))
        // Trades
        .route("/trades", get(handlers::trade::list_trades))
        // Health
        .route("/health", get(handlers::health::health_check))
}
