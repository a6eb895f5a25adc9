//! Matching Engine Types

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{OrderSide, OrderStatus, OrderType, Trade};
use crate::store::StoreError;

/// A validated order submission, ready for the engine.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub address: String,
    pub asset: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub amount: Decimal,
    pub price: Option<Decimal>,
}

/// Result of processing one order.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub trades: Vec<Trade>,
    pub remaining_amount: Decimal,
}

impl MatchResult {
    pub fn filled_amount(&self) -> Decimal {
        self.trades.iter().map(|t| t.amount).sum()
    }
}

/// Matching engine errors.
#[derive(Debug, thiserror::Error)]
pub enum MatchingError {
    #[error("Unknown asset: {0}")]
    UnknownAsset(String),

    #[error("Limit orders require a positive price")]
    PriceRequired,

    #[error("Market orders must not carry a price")]
    MarketPriceNotAllowed,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Insufficient {asset} balance: required {required}, available {available}")]
    InsufficientBalance {
        asset: String,
        required: Decimal,
        available: Decimal,
    },

    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("Order {id} cannot be cancelled. Current status: {status}")]
    CannotCancel { id: Uuid, status: OrderStatus },

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for MatchingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InsufficientBalance {
                asset,
                required,
                available,
            } => MatchingError::InsufficientBalance {
                asset,
                required,
                available,
            },
            other => MatchingError::Store(other),
        }
    }
}
