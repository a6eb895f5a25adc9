use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::asset::{AssetInfo, ASSETS};

#[derive(Debug, Serialize)]
pub struct AssetsResponse {
    pub assets: &'static [AssetInfo],
    pub total: usize,
    pub timestamp: DateTime<Utc>,
}

/// GET /api/assets - the fixed asset catalogue.
pub async fn list_assets() -> Json<AssetsResponse> {
    Json(AssetsResponse {
        assets: ASSETS,
        total: ASSETS.len(),
        timestamp: Utc::now(),
    })
}
