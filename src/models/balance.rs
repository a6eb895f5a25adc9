use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A per-address, per-asset balance.
///
/// `available` is spendable; `frozen` is escrowed for resting orders. The
/// externally reported balance is the sum of the two.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Balance {
    pub address: String,
    pub asset: String,
    pub available: Decimal,
    pub frozen: Decimal,
}

impl Balance {
    /// An implicit zero balance for an account that has never been written.
    pub fn zero(address: &str, asset: &str) -> Self {
        Self {
            address: address.to_string(),
            asset: asset.to_string(),
            available: Decimal::ZERO,
            frozen: Decimal::ZERO,
        }
    }

    pub fn total(&self) -> Decimal {
        self.available + self.frozen
    }
}

/// One entry of a per-address balance listing.
#[derive(Debug, Clone, Serialize)]
pub struct AssetBalance {
    pub asset: String,
    pub balance: Decimal,
    pub available: Decimal,
    pub frozen: Decimal,
}

impl From<Balance> for AssetBalance {
    fn from(b: Balance) -> Self {
        Self {
            asset: b.asset.clone(),
            balance: b.total(),
            available: b.available,
            frozen: b.frozen,
        }
    }
}
