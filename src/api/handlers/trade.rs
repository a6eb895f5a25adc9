//! Trade History Handlers

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::models::Trade;
use crate::store::{Store, TradeFilter};
use crate::utils::response::{ApiErrorBody, ApiResponse};
use crate::utils::validation::{is_valid_address, is_valid_asset_symbol, normalize_address};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TradesQuery {
    pub asset: Option<String>,
    pub address: Option<String>,
}

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

/// GET /api/trades?asset=&address=
pub async fn list_trades(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TradesQuery>,
) -> Result<Json<ApiResponse<Vec<Trade>>>, EnvelopeError> {
    if let Some(asset) = &query.asset {
        if !is_valid_asset_symbol(asset) {
            return Err(envelope_error(
                StatusCode::BAD_REQUEST,
                "Validation Error",
                "asset must be 3-10 uppercase alphanumeric characters",
            ));
        }
    }
    let address = match &query.address {
        Some(raw) => {
            if !is_valid_address(raw) {
                return Err(envelope_error(
                    StatusCode::BAD_REQUEST,
                    "Validation Error",
                    "address must be a 0x-prefixed 40-character hex string",
                ));
            }
            Some(normalize_address(raw))
        }
        None => None,
    };

    let trades = state
        .store
        .trades(&TradeFilter {
            asset: query.asset,
            address,
        })
        .await
        .map_err(|e| {
            tracing::error!("Failed to list trades: {}", e);
            envelope_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
                "failed to list trades",
            )
        })?;

    Ok(Json(ApiResponse::success(trades)))
}
