use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// An executed match between one buy and one sell order.
///
/// Immutable after creation; `price` is always the resting order's price.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: Uuid,
    pub buy_order_id: Uuid,
    pub sell_order_id: Uuid,
    pub asset: String,
    pub amount: Decimal,
    pub price: Decimal,
    pub buyer_address: String,
    pub seller_address: String,
    pub created_at: DateTime<Utc>,
}

impl Trade {
    /// Quote-currency value of the trade at the quote asset's scale.
    pub fn quote_value(&self, quote_decimals: u32) -> Decimal {
        use rust_decimal::RoundingStrategy;
        (self.amount * self.price).round_dp_with_strategy(quote_decimals, RoundingStrategy::ToZero)
    }
}
