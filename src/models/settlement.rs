use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;
use validator::Validate;

use crate::utils::validation::{validate_address, validate_asset_symbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "settlement_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SettlementStatus {
    Pending,
    Confirmed,
    Failed,
}

impl SettlementStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SettlementStatus::Confirmed | SettlementStatus::Failed)
    }
}

impl fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettlementStatus::Pending => write!(f, "pending"),
            SettlementStatus::Confirmed => write!(f, "confirmed"),
            SettlementStatus::Failed => write!(f, "failed"),
        }
    }
}

/// An out-of-book asynchronous transfer between two addresses.
///
/// Created `pending`, transitioned exactly once to `confirmed` or `failed`
/// by the settlement processor, immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub id: Uuid,
    #[serde(rename = "from")]
    pub from_address: String,
    #[serde(rename = "to")]
    pub to_address: String,
    pub amount: Decimal,
    pub asset: String,
    pub status: SettlementStatus,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl Settlement {
    pub fn new(from: &str, to: &str, amount: Decimal, asset: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            from_address: from.to_string(),
            to_address: to.to_string(),
            amount,
            asset: asset.to_string(),
            status: SettlementStatus::Pending,
            failure_reason: None,
            created_at: Utc::now(),
            confirmed_at: None,
        }
    }
}

/// Which side of a settlement an address was on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementRole {
    Sender,
    Receiver,
}

/// Request body for POST /api/settle.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SettleRequest {
    #[validate(custom = "validate_address")]
    pub from: String,
    #[validate(custom = "validate_address")]
    pub to: String,
    pub amount: Decimal,
    #[validate(custom = "validate_asset_symbol")]
    pub asset: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_new_settlement_is_pending() {
        let s = Settlement::new(
            "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb",
            dec!(100),
            "USDC",
        );
        assert_eq!(s.status, SettlementStatus::Pending);
        assert!(s.confirmed_at.is_none());
        assert!(s.failure_reason.is_none());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!SettlementStatus::Pending.is_terminal());
        assert!(SettlementStatus::Confirmed.is_terminal());
        assert!(SettlementStatus::Failed.is_terminal());
    }
}
