//! Order API Handlers
//!
//! Thin adapter over the matching engine. These routes use the
//! `{success, data}` envelope, and the matching `{success:false, error,
//! message}` error shape.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::models::{CreateOrderRequest, OrderResponse, OrderStatus};
use crate::services::matching::{MatchingError, NewOrder};
use crate::store::{BookLevel, OrderFilter, Store};
use crate::utils::response::{ApiErrorBody, ApiResponse};
use crate::utils::validation::{
    describe_validation_errors, is_valid_address, is_valid_asset_symbol, normalize_address,
};
use crate::AppState;

type EnvelopeError = (StatusCode, Json<ApiErrorBody>);

fn envelope_error(status: StatusCode, error: &str, message: &str) -> EnvelopeError {
    (
        status,
        Json(ApiErrorBody {
            success: false,
            error: error.to_string(),
            message: message.to_string(),
        }),
    )
}

fn map_engine_error(err: MatchingError) -> EnvelopeError {
    match &err {
        MatchingError::UnknownAsset(_)
        | MatchingError::PriceRequired
        | MatchingError::MarketPriceNotAllowed
        | MatchingError::InvalidAmount(_)
        | MatchingError::InvalidPrice(_) => {
            envelope_error(StatusCode::BAD_REQUEST, "Validation Error", &err.to_string())
        }
        MatchingError::InsufficientBalance { .. } => envelope_error(
            StatusCode::BAD_REQUEST,
            "Insufficient Balance",
            &err.to_string(),
        ),
        MatchingError::OrderNotFound(_) => {
            envelope_error(StatusCode::NOT_FOUND, "Not Found", &err.to_string())
        }
        MatchingError::CannotCancel { .. } => {
            envelope_error(StatusCode::BAD_REQUEST, "Cannot Cancel", &err.to_string())
        }
        MatchingError::Store(inner) => {
            tracing::error!("Matching engine store failure: {}", inner);
            envelope_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
                "unexpected error while processing the order",
            )
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderData {
    /// Id of the first trade generated by this submission, if any.
    pub trade_id: Option<Uuid>,
    pub order_id: Uuid,
    pub trades: Vec<crate::models::Trade>,
    pub remaining_amount: Decimal,
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct OrdersQuery {
    pub address: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOrderData {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct BookData {
    pub asset: String,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    pub timestamp: DateTime<Utc>,
}

/// POST /api/orders
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CreateOrderData>>), EnvelopeError> {
    req.validate().map_err(|e| {
        envelope_error(
            StatusCode::BAD_REQUEST,
            "Validation Error",
            &describe_validation_errors(&e),
        )
    })?;

    let result = state
        .engine
        .process_order(NewOrder {
            address: normalize_address(&req.address),
            asset: req.asset.clone(),
            side: req.side,
            order_type: req.order_type,
            amount: req.amount,
            price: req.price,
        })
        .await
        .map_err(map_engine_error)?;

    let data = CreateOrderData {
        trade_id: result.trades.first().map(|t| t.id),
        order_id: result.order_id,
        trades: result.trades,
        remaining_amount: result.remaining_amount,
        status: result.status,
    };
    Ok((StatusCode::CREATED, Json(ApiResponse::success(data))))
}

/// GET /api/orders?address=&status=
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OrdersQuery>,
) -> Result<Json<ApiResponse<Vec<OrderResponse>>>, EnvelopeError> {
    let address = match query.address {
        Some(raw) => {
            if !is_valid_address(&raw) {
                return Err(envelope_error(
                    StatusCode::BAD_REQUEST,
                    "Validation Error",
                    "address must be a 0x-prefixed 40-character hex string",
                ));
            }
            Some(normalize_address(&raw))
        }
        None => None,
    };
    let status = match query.status.as_deref() {
        Some(raw) => Some(OrderStatus::from_str(raw).map_err(|e| {
            envelope_error(StatusCode::BAD_REQUEST, "Validation Error", &e)
        })?),
        None => None,
    };

    let orders = state
        .store
        .orders(&OrderFilter { address, status })
        .await
        .map_err(|e| {
            tracing::error!("Failed to list orders: {}", e);
            envelope_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
                "failed to list orders",
            )
        })?;

    Ok(Json(ApiResponse::success(
        orders.into_iter().map(OrderResponse::from).collect(),
    )))
}

/// GET /api/orders/:id
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderResponse>>, EnvelopeError> {
    let order = state.store.order(id).await.map_err(|e| {
        tracing::error!("Failed to read order: {}", e);
        envelope_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal Server Error",
            "failed to read order",
        )
    })?;

    match order {
        Some(order) => Ok(Json(ApiResponse::success(OrderResponse::from(order)))),
        None => Err(envelope_error(
            StatusCode::NOT_FOUND,
            "Not Found",
            &format!("Order not found: {id}"),
        )),
    }
}

/// POST /api/orders/:id/cancel
pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CancelOrderData>, EnvelopeError> {
    state
        .engine
        .cancel_order(id)
        .await
        .map_err(map_engine_error)?;

    Ok(Json(CancelOrderData {
        success: true,
        message: format!("Order {id} cancelled"),
    }))
}

/// GET /api/orders/book/:asset
pub async fn get_book(
    State(state): State<Arc<AppState>>,
    Path(asset): Path<String>,
) -> Result<Json<ApiResponse<BookData>>, EnvelopeError> {
    if !is_valid_asset_symbol(&asset) {
        return Err(envelope_error(
            StatusCode::BAD_REQUEST,
            "Validation Error",
            "asset must be 3-10 uppercase alphanumeric characters",
        ));
    }

    let book = state.store.book(&asset).await.map_err(|e| {
        tracing::error!("Failed to aggregate book: {}", e);
        envelope_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal Server Error",
            "failed to aggregate order book",
        )
    })?;

    Ok(Json(ApiResponse::success(BookData {
        asset,
        bids: book.bids,
        asks: book.asks,
        timestamp: Utc::now(),
    })))
}
