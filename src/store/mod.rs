//! Durable State Store
//!
//! Backend-agnostic persistence for balances, orders, trades and
//! settlements. Two implementations are provided: an in-memory store used
//! by tests and by deployments without a configured database, and a
//! Postgres store for everything else.
//!
//! Every trait method is a single logical atomic unit. The composite
//! operations (`reserve`, `release`, `transfer`, `apply_fill`) exist so the
//! matching engine and the settlement processor never have to sequence
//! non-atomic balance writes themselves.

mod memory;
mod postgres;
mod seed;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use seed::seed_demo_balances;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{
    Balance, Order, OrderSide, OrderStatus, Settlement, SettlementRole, SettlementStatus, Trade,
};

/// Most recent rows returned by trade history queries.
pub const TRADE_HISTORY_LIMIT: usize = 100;

/// Price levels per side in the aggregated book.
pub const BOOK_DEPTH: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        asset: String,
        required: Decimal,
        available: Decimal,
    },

    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("Settlement not found: {0}")]
    SettlementNotFound(Uuid),

    #[error("Escrow accounting underflow: {0}")]
    EscrowUnderflow(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Filter for order listings.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub address: Option<String>,
    pub status: Option<OrderStatus>,
}

/// Filter for trade history. `address` matches buyer or seller.
#[derive(Debug, Clone, Default)]
pub struct TradeFilter {
    pub asset: Option<String>,
    pub address: Option<String>,
}

/// One aggregated price level of the order book.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookLevel {
    pub price: Decimal,
    pub total_remaining: Decimal,
    pub order_count: i64,
}

/// Aggregated order book for one asset: bids descending, asks ascending.
#[derive(Debug, Clone, Serialize)]
pub struct OrderBook {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

/// One matching step, committed as a unit.
///
/// Applies the trade insert, the maker order update, and the four balance
/// legs: buyer gains base (available), seller's escrowed base is spent,
/// buyer's escrowed quote is spent, seller gains quote (available). The
/// taker order itself is persisted separately at the end of the match loop.
#[derive(Debug, Clone)]
pub struct FillBatch {
    pub trade: Trade,
    pub maker_order_id: Uuid,
    pub maker_status: OrderStatus,
    pub maker_remaining: Decimal,
    pub quote_asset: String,
    pub quote_amount: Decimal,
}

#[async_trait]
pub trait Store: Send + Sync {
    // ---- balances ----

    /// Read a balance; missing rows read as zero.
    async fn balance(&self, address: &str, asset: &str) -> Result<Balance, StoreError>;

    /// Write a balance row directly. Seeding and test plumbing only.
    async fn put_balance(
        &self,
        address: &str,
        asset: &str,
        available: Decimal,
        frozen: Decimal,
    ) -> Result<(), StoreError>;

    /// All balances of an address, sorted by asset.
    async fn balances(&self, address: &str) -> Result<Vec<Balance>, StoreError>;

    /// Whether any balance row exists at all (seed guard).
    async fn has_balances(&self) -> Result<bool, StoreError>;

    /// Move `amount` from available to frozen, failing without mutation if
    /// the available balance is short.
    async fn reserve(&self, address: &str, asset: &str, amount: Decimal)
        -> Result<(), StoreError>;

    /// Move `amount` from frozen back to available.
    async fn release(&self, address: &str, asset: &str, amount: Decimal)
        -> Result<(), StoreError>;

    /// Atomically debit `from` and credit `to` by `amount` of `asset`,
    /// failing without mutation if `from` has insufficient available funds.
    async fn transfer(
        &self,
        from: &str,
        to: &str,
        asset: &str,
        amount: Decimal,
    ) -> Result<(), StoreError>;

    /// Commit one matching step as a unit.
    async fn apply_fill(&self, fill: &FillBatch) -> Result<(), StoreError>;

    // ---- settlements ----

    async fn insert_settlement(&self, settlement: &Settlement) -> Result<(), StoreError>;

    /// Transition a settlement out of `pending` exactly once. Returns false
    /// when the settlement is already terminal (or unknown).
    async fn settle_terminal(
        &self,
        id: Uuid,
        status: SettlementStatus,
        confirmed_at: Option<DateTime<Utc>>,
        reason: Option<&str>,
    ) -> Result<bool, StoreError>;

    async fn settlement(&self, id: Uuid) -> Result<Option<Settlement>, StoreError>;

    /// All settlements, newest first.
    async fn settlements(&self) -> Result<Vec<Settlement>, StoreError>;

    /// Settlements where the address is sender or receiver, newest first,
    /// annotated with the address's role.
    async fn settlements_by_address(
        &self,
        address: &str,
    ) -> Result<Vec<(Settlement, SettlementRole)>, StoreError>;

    // ---- orders ----

    async fn insert_order(&self, order: &Order) -> Result<(), StoreError>;

    async fn order(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

    /// Orders matching the filter, newest first.
    async fn orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError>;

    async fn update_order(
        &self,
        id: Uuid,
        status: OrderStatus,
        remaining: Decimal,
    ) -> Result<(), StoreError>;

    /// Conditional cancel: succeeds only from `pending` or
    /// `partially_filled`. Returns the cancelled order, or `None` when the
    /// order was already terminal. Unknown ids are also `None`.
    async fn cancel_order(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

    /// Live resting orders on `side` for `asset`, best price first, then
    /// arrival order within a price level.
    async fn match_candidates(
        &self,
        asset: &str,
        side: OrderSide,
    ) -> Result<Vec<Order>, StoreError>;

    // ---- trades ----

    /// Trades matching the filter, newest first, capped at
    /// [`TRADE_HISTORY_LIMIT`].
    async fn trades(&self, filter: &TradeFilter) -> Result<Vec<Trade>, StoreError>;

    // ---- book ----

    /// Aggregated top-of-book: up to [`BOOK_DEPTH`] price levels per side
    /// over live resting limit orders.
    async fn book(&self, asset: &str) -> Result<OrderBook, StoreError>;
}
