//! Postgres Store
//!
//! `sqlx`-backed [`Store`] implementation. Composite balance operations run
//! inside a single transaction; conditional updates are single-statement
//! compare-and-swap queries so concurrent workers cannot double-apply a
//! transition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::{
    Balance, Order, OrderSide, OrderStatus, Settlement, SettlementRole, SettlementStatus, Trade,
};

use super::{
    BookLevel, FillBatch, OrderBook, OrderFilter, Store, StoreError, TradeFilter, BOOK_DEPTH,
    TRADE_HISTORY_LIMIT,
};

const ORDER_COLUMNS: &str = "id, address, asset, side, order_type, price, amount, \
                             remaining_amount, status, created_at, updated_at";

const SETTLEMENT_COLUMNS: &str = "id, from_address, to_address, amount, asset, status, \
                                  failure_reason, created_at, confirmed_at";

const TRADE_COLUMNS: &str = "id, buy_order_id, sell_order_id, asset, amount, price, \
                             buyer_address, seller_address, created_at";

/// Postgres-backed [`Store`] implementation.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and run pending migrations.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Upsert-credit an available balance inside a transaction.
    async fn credit_available(
        tx: &mut Transaction<'_, Postgres>,
        address: &str,
        asset: &str,
        amount: Decimal,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO balances (address, asset, available, frozen)
            VALUES ($1, $2, $3, 0)
            ON CONFLICT (address, asset) DO UPDATE SET
                available = balances.available + $3,
                updated_at = NOW()
            "#,
        )
        .bind(address)
        .bind(asset)
        .bind(amount)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Conditionally debit a frozen balance inside a transaction.
    async fn debit_frozen(
        tx: &mut Transaction<'_, Postgres>,
        address: &str,
        asset: &str,
        amount: Decimal,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE balances
            SET frozen = frozen - $3, updated_at = NOW()
            WHERE address = $1 AND asset = $2 AND frozen >= $3
            "#,
        )
        .bind(address)
        .bind(asset)
        .bind(amount)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::EscrowUnderflow(format!(
                "debit of {} {} from {} exceeds escrow",
                amount, asset, address
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn balance(&self, address: &str, asset: &str) -> Result<Balance, StoreError> {
        let row: Option<Balance> = sqlx::query_as(
            "SELECT address, asset, available, frozen FROM balances WHERE address = $1 AND asset = $2",
        )
        .bind(address)
        .bind(asset)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.unwrap_or_else(|| Balance::zero(address, asset)))
    }

    async fn put_balance(
        &self,
        address: &str,
        asset: &str,
        available: Decimal,
        frozen: Decimal,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO balances (address, asset, available, frozen)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (address, asset) DO UPDATE SET
                available = $3, frozen = $4, updated_at = NOW()
            "#,
        )
        .bind(address)
        .bind(asset)
        .bind(available)
        .bind(frozen)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn balances(&self, address: &str) -> Result<Vec<Balance>, StoreError> {
        let rows: Vec<Balance> = sqlx::query_as(
            "SELECT address, asset, available, frozen FROM balances WHERE address = $1 ORDER BY asset",
        )
        .bind(address)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn has_balances(&self) -> Result<bool, StoreError> {
        let exists: (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM balances)")
            .fetch_one(&self.pool)
            .await?;
        Ok(exists.0)
    }

    async fn reserve(
        &self,
        address: &str,
        asset: &str,
        amount: Decimal,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE balances
            SET available = available - $3, frozen = frozen + $3, updated_at = NOW()
            WHERE address = $1 AND asset = $2 AND available >= $3
            "#,
        )
        .bind(address)
        .bind(asset)
        .bind(amount)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let current = self.balance(address, asset).await?;
            return Err(StoreError::InsufficientBalance {
                asset: asset.to_string(),
                required: amount,
                available: current.available,
            });
        }
        Ok(())
    }

    async fn release(
        &self,
        address: &str,
        asset: &str,
        amount: Decimal,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE balances
            SET available = available + $3, frozen = frozen - $3, updated_at = NOW()
            WHERE address = $1 AND asset = $2 AND frozen >= $3
            "#,
        )
        .bind(address)
        .bind(asset)
        .bind(amount)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::EscrowUnderflow(format!(
                "release of {} {} for {} exceeds escrow",
                amount, asset, address
            )));
        }
        Ok(())
    }

    async fn transfer(
        &self,
        from: &str,
        to: &str,
        asset: &str,
        amount: Decimal,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let debit = sqlx::query(
            r#"
            UPDATE balances
            SET available = available - $3, updated_at = NOW()
            WHERE address = $1 AND asset = $2 AND available >= $3
            "#,
        )
        .bind(from)
        .bind(asset)
        .bind(amount)
        .execute(&mut *tx)
        .await?;

        if debit.rows_affected() == 0 {
            tx.rollback().await?;
            let current = self.balance(from, asset).await?;
            return Err(StoreError::InsufficientBalance {
                asset: asset.to_string(),
                required: amount,
                available: current.available,
            });
        }

        Self::credit_available(&mut tx, to, asset, amount).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn apply_fill(&self, fill: &FillBatch) -> Result<(), StoreError> {
        let trade = &fill.trade;
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "INSERT INTO trades ({TRADE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        ))
        .bind(trade.id)
        .bind(trade.buy_order_id)
        .bind(trade.sell_order_id)
        .bind(&trade.asset)
        .bind(trade.amount)
        .bind(trade.price)
        .bind(&trade.buyer_address)
        .bind(&trade.seller_address)
        .bind(trade.created_at)
        .execute(&mut *tx)
        .await?;

        let maker = sqlx::query(
            "UPDATE orders SET status = $2, remaining_amount = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(fill.maker_order_id)
        .bind(fill.maker_status)
        .bind(fill.maker_remaining)
        .execute(&mut *tx)
        .await?;
        if maker.rows_affected() == 0 {
            return Err(StoreError::OrderNotFound(fill.maker_order_id));
        }

        Self::credit_available(&mut tx, &trade.buyer_address, &trade.asset, trade.amount).await?;
        Self::debit_frozen(&mut tx, &trade.seller_address, &trade.asset, trade.amount).await?;
        Self::debit_frozen(&mut tx, &trade.buyer_address, &fill.quote_asset, fill.quote_amount)
            .await?;
        Self::credit_available(&mut tx, &trade.seller_address, &fill.quote_asset, fill.quote_amount)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn insert_settlement(&self, settlement: &Settlement) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO settlements ({SETTLEMENT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        ))
        .bind(settlement.id)
        .bind(&settlement.from_address)
        .bind(&settlement.to_address)
        .bind(settlement.amount)
        .bind(&settlement.asset)
        .bind(settlement.status)
        .bind(&settlement.failure_reason)
        .bind(settlement.created_at)
        .bind(settlement.confirmed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn settle_terminal(
        &self,
        id: Uuid,
        status: SettlementStatus,
        confirmed_at: Option<DateTime<Utc>>,
        reason: Option<&str>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE settlements
            SET status = $2, confirmed_at = $3, failure_reason = $4
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(confirmed_at)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn settlement(&self, id: Uuid) -> Result<Option<Settlement>, StoreError> {
        let row: Option<Settlement> = sqlx::query_as(&format!(
            "SELECT {SETTLEMENT_COLUMNS} FROM settlements WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn settlements(&self) -> Result<Vec<Settlement>, StoreError> {
        let rows: Vec<Settlement> = sqlx::query_as(&format!(
            "SELECT {SETTLEMENT_COLUMNS} FROM settlements ORDER BY created_at DESC, seq DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn settlements_by_address(
        &self,
        address: &str,
    ) -> Result<Vec<(Settlement, SettlementRole)>, StoreError> {
        let rows: Vec<Settlement> = sqlx::query_as(&format!(
            r#"
            SELECT {SETTLEMENT_COLUMNS} FROM settlements
            WHERE from_address = $1 OR to_address = $1
            ORDER BY created_at DESC, seq DESC
            "#
        ))
        .bind(address)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|s| {
                let role = if s.from_address == address {
                    SettlementRole::Sender
                } else {
                    SettlementRole::Receiver
                };
                (s, role)
            })
            .collect())
    }

    async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        ))
        .bind(order.id)
        .bind(&order.address)
        .bind(&order.asset)
        .bind(order.side)
        .bind(order.order_type)
        .bind(order.price)
        .bind(order.amount)
        .bind(order.remaining_amount)
        .bind(order.status)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let row: Option<Order> =
            sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row)
    }

    async fn orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let rows: Vec<Order> = sqlx::query_as(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE ($1::text IS NULL OR address = $1)
              AND ($2::order_status IS NULL OR status = $2)
            ORDER BY created_at DESC, seq DESC
            "#
        ))
        .bind(filter.address.as_deref())
        .bind(filter.status)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn update_order(
        &self,
        id: Uuid,
        status: OrderStatus,
        remaining: Decimal,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE orders SET status = $2, remaining_amount = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .bind(remaining)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::OrderNotFound(id));
        }
        Ok(())
    }

    async fn cancel_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let row: Option<Order> = sqlx::query_as(&format!(
            r#"
            UPDATE orders SET status = 'cancelled', updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'partially_filled')
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn match_candidates(
        &self,
        asset: &str,
        side: OrderSide,
    ) -> Result<Vec<Order>, StoreError> {
        let order_by = match side {
            OrderSide::Buy => "price DESC, seq ASC",
            OrderSide::Sell => "price ASC, seq ASC",
        };
        let rows: Vec<Order> = sqlx::query_as(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE asset = $1 AND side = $2
              AND status IN ('pending', 'partially_filled')
              AND price IS NOT NULL
            ORDER BY {order_by}
            "#
        ))
        .bind(asset)
        .bind(side)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn trades(&self, filter: &TradeFilter) -> Result<Vec<Trade>, StoreError> {
        let rows: Vec<Trade> = sqlx::query_as(&format!(
            r#"
            SELECT {TRADE_COLUMNS} FROM trades
            WHERE ($1::text IS NULL OR asset = $1)
              AND ($2::text IS NULL OR buyer_address = $2 OR seller_address = $2)
            ORDER BY created_at DESC, seq DESC
            LIMIT $3
            "#
        ))
        .bind(filter.asset.as_deref())
        .bind(filter.address.as_deref())
        .bind(TRADE_HISTORY_LIMIT as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn book(&self, asset: &str) -> Result<OrderBook, StoreError> {
        let side_levels = |side: &'static str, order: &'static str| {
            let pool = self.pool.clone();
            let asset = asset.to_string();
            async move {
                let rows: Vec<(Decimal, Decimal, i64)> = sqlx::query_as(&format!(
                    r#"
                    SELECT price, SUM(remaining_amount) AS total_remaining, COUNT(*) AS order_count
                    FROM orders
                    WHERE asset = $1 AND side = '{side}'
                      AND status IN ('pending', 'partially_filled')
                      AND price IS NOT NULL
                    GROUP BY price
                    ORDER BY price {order}
                    LIMIT $2
                    "#
                ))
                .bind(&asset)
                .bind(BOOK_DEPTH as i64)
                .fetch_all(&pool)
                .await?;

                Ok::<Vec<BookLevel>, StoreError>(
                    rows.into_iter()
                        .map(|(price, total_remaining, order_count)| BookLevel {
                            price,
                            total_remaining,
                            order_count,
                        })
                        .collect(),
                )
            }
        };

        let bids = side_levels("buy", "DESC").await?;
        let asks = side_levels("sell", "ASC").await?;
        Ok(OrderBook { bids, asks })
    }
}
