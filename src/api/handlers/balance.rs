//! Balance API Handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::AssetBalance;
use crate::store::Store;
use crate::utils::response::AppError;
use crate::utils::validation::{is_valid_address, is_valid_asset_symbol, normalize_address};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    pub asset: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub address: String,
    pub asset: String,
    pub balance: Decimal,
}

#[derive(Debug, Serialize)]
pub struct AllBalancesResponse {
    pub address: String,
    pub balances: Vec<AssetBalance>,
    pub total: usize,
    pub timestamp: DateTime<Utc>,
}

/// GET /api/balance/:address?asset=ETH
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    Query(query): Query<BalanceQuery>,
) -> Result<Json<BalanceResponse>, AppError> {
    if !is_valid_address(&address) {
        return Err(AppError::validation(
            "address must be a 0x-prefixed 40-character hex string",
        ));
    }
    let Some(asset) = query.asset else {
        return Err(AppError::validation("asset query parameter is required"));
    };
    if !is_valid_asset_symbol(&asset) {
        return Err(AppError::validation(
            "asset must be 3-10 uppercase alphanumeric characters",
        ));
    }

    let address = normalize_address(&address);
    let balance = state
        .store
        .balance(&address, &asset)
        .await
        .map_err(|e| {
            tracing::error!("Failed to read balance: {}", e);
            AppError::internal("failed to read balance")
        })?;

    Ok(Json(BalanceResponse {
        address,
        asset,
        balance: balance.total(),
    }))
}

/// GET /api/balance/:address/all
pub async fn get_all_balances(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<AllBalancesResponse>, AppError> {
    if !is_valid_address(&address) {
        return Err(AppError::validation(
            "address must be a 0x-prefixed 40-character hex string",
        ));
    }

    let address = normalize_address(&address);
    let balances: Vec<AssetBalance> = state
        .store
        .balances(&address)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list balances: {}", e);
            AppError::internal("failed to list balances")
        })?
        .into_iter()
        .map(AssetBalance::from)
        .collect();

    let total = balances.len();
    Ok(Json(AllBalancesResponse {
        address,
        balances,
        total,
        timestamp: Utc::now(),
    }))
}
