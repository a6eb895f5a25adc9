//! Settlement API Handlers
//!
//! The request surface only records the settlement and publishes the
//! request event; the asynchronous processor moves the funds.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::events::SettlementRequested;
use crate::models::settlement::SettleRequest;
use crate::models::{Settlement, SettlementRole, SettlementStatus};
use crate::store::Store;
use crate::utils::response::AppError;
use crate::utils::validation::{
    describe_validation_errors, is_valid_address, normalize_address,
};
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleAccepted {
    pub settlement_id: Uuid,
    pub status: SettlementStatus,
}

#[derive(Debug, Serialize)]
pub struct SettlementWithRole {
    #[serde(flatten)]
    pub settlement: Settlement,
    pub role: SettlementRole,
}

#[derive(Debug, Serialize)]
pub struct AddressSettlementsResponse {
    pub address: String,
    pub settlements: Vec<SettlementWithRole>,
    pub total: usize,
    pub timestamp: DateTime<Utc>,
}

/// POST /api/settle
pub async fn create_settlement(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SettleRequest>,
) -> Result<(StatusCode, Json<SettleAccepted>), AppError> {
    req.validate()
        .map_err(|e| AppError::validation(&describe_validation_errors(&e)))?;
    if req.amount <= Decimal::ZERO {
        return Err(AppError::validation("amount must be positive"));
    }

    let from = normalize_address(&req.from);
    let to = normalize_address(&req.to);
    if from == to {
        return Err(AppError::validation(
            "sender and receiver must be distinct addresses",
        ));
    }

    let settlement = Settlement::new(&from, &to, req.amount, &req.asset);
    state
        .store
        .insert_settlement(&settlement)
        .await
        .map_err(|e| {
            tracing::error!("Failed to insert settlement: {}", e);
            AppError::internal("failed to record settlement")
        })?;

    state.bus.publish_settlement_requested(SettlementRequested {
        id: settlement.id,
        from,
        to,
        amount: settlement.amount,
        asset: settlement.asset.clone(),
    });

    tracing::info!(settlement_id = %settlement.id, "settlement accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(SettleAccepted {
            settlement_id: settlement.id,
            status: SettlementStatus::Pending,
        }),
    ))
}

/// GET /api/settlements
pub async fn list_settlements(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Settlement>>, AppError> {
    let settlements = state.store.settlements().await.map_err(|e| {
        tracing::error!("Failed to list settlements: {}", e);
        AppError::internal("failed to list settlements")
    })?;
    Ok(Json(settlements))
}

/// GET /api/settlements/:id
pub async fn get_settlement(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Settlement>, AppError> {
    let settlement = state.store.settlement(id).await.map_err(|e| {
        tracing::error!("Failed to read settlement: {}", e);
        AppError::internal("failed to read settlement")
    })?;

    settlement
        .map(Json)
        .ok_or_else(|| AppError::not_found(&format!("Settlement not found: {id}")))
}

/// GET /api/settlements/address/:address
pub async fn get_settlements_by_address(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<AddressSettlementsResponse>, AppError> {
    if !is_valid_address(&address) {
        return Err(AppError::validation(
            "address must be a 0x-prefixed 40-character hex string",
        ));
    }

    let address = normalize_address(&address);
    let settlements: Vec<SettlementWithRole> = state
        .store
        .settlements_by_address(&address)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list settlements: {}", e);
            AppError::internal("failed to list settlements")
        })?
        .into_iter()
        .map(|(settlement, role)| SettlementWithRole { settlement, role })
        .collect();

    let total = settlements.len();
    Ok(Json(AddressSettlementsResponse {
        address,
        settlements,
        total,
        timestamp: Utc::now(),
    }))
}
