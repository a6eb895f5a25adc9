//! In-Memory Store
//!
//! Single-process store backed by indexed maps behind one `parking_lot`
//! write lock, so every trait operation is atomic by construction. Used by
//! the test suites and by deployments without a configured database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::{
    Balance, Order, OrderSide, OrderStatus, Settlement, SettlementRole, SettlementStatus, Trade,
};

use super::{
    BookLevel, FillBatch, OrderBook, OrderFilter, Store, StoreError, TradeFilter, BOOK_DEPTH,
    TRADE_HISTORY_LIMIT,
};

#[derive(Debug, Default)]
struct Inner {
    balances: HashMap<(String, String), Balance>,
    orders: HashMap<Uuid, Order>,
    settlements: HashMap<Uuid, Settlement>,
    settlement_arrival: Vec<Uuid>,
    trades: Vec<Trade>,
    /// Arrival sequence per order, the time-priority tie-breaker.
    order_seq: HashMap<Uuid, u64>,
    next_seq: u64,
}

impl Inner {
    fn balance_mut(&mut self, address: &str, asset: &str) -> &mut Balance {
        self.balances
            .entry((address.to_string(), asset.to_string()))
            .or_insert_with(|| Balance::zero(address, asset))
    }

    fn available(&self, address: &str, asset: &str) -> Decimal {
        self.balances
            .get(&(address.to_string(), asset.to_string()))
            .map(|b| b.available)
            .unwrap_or(Decimal::ZERO)
    }

    fn frozen(&self, address: &str, asset: &str) -> Decimal {
        self.balances
            .get(&(address.to_string(), asset.to_string()))
            .map(|b| b.frozen)
            .unwrap_or(Decimal::ZERO)
    }

    fn seq(&self, id: &Uuid) -> u64 {
        self.order_seq.get(id).copied().unwrap_or(u64::MAX)
    }
}

/// In-memory [`Store`] implementation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn balance(&self, address: &str, asset: &str) -> Result<Balance, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .balances
            .get(&(address.to_string(), asset.to_string()))
            .cloned()
            .unwrap_or_else(|| Balance::zero(address, asset)))
    }

    async fn put_balance(
        &self,
        address: &str,
        asset: &str,
        available: Decimal,
        frozen: Decimal,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let entry = inner.balance_mut(address, asset);
        entry.available = available;
        entry.frozen = frozen;
        Ok(())
    }

    async fn balances(&self, address: &str) -> Result<Vec<Balance>, StoreError> {
        let inner = self.inner.read();
        let mut out: Vec<Balance> = inner
            .balances
            .values()
            .filter(|b| b.address == address)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.asset.cmp(&b.asset));
        Ok(out)
    }

    async fn has_balances(&self) -> Result<bool, StoreError> {
        Ok(!self.inner.read().balances.is_empty())
    }

    async fn reserve(
        &self,
        address: &str,
        asset: &str,
        amount: Decimal,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let available = inner.available(address, asset);
        if available < amount {
            return Err(StoreError::InsufficientBalance {
                asset: asset.to_string(),
                required: amount,
                available,
            });
        }
        let entry = inner.balance_mut(address, asset);
        entry.available -= amount;
        entry.frozen += amount;
        Ok(())
    }

    async fn release(
        &self,
        address: &str,
        asset: &str,
        amount: Decimal,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let frozen = inner.frozen(address, asset);
        if frozen < amount {
            return Err(StoreError::EscrowUnderflow(format!(
                "release {} {} for {} exceeds frozen {}",
                amount, asset, address, frozen
            )));
        }
        let entry = inner.balance_mut(address, asset);
        entry.frozen -= amount;
        entry.available += amount;
        Ok(())
    }

    async fn transfer(
        &self,
        from: &str,
        to: &str,
        asset: &str,
        amount: Decimal,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let available = inner.available(from, asset);
        if available < amount {
            return Err(StoreError::InsufficientBalance {
                asset: asset.to_string(),
                required: amount,
                available,
            });
        }
        inner.balance_mut(from, asset).available -= amount;
        inner.balance_mut(to, asset).available += amount;
        Ok(())
    }

    async fn apply_fill(&self, fill: &FillBatch) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let trade = &fill.trade;

        // Validate everything before the first mutation so a failure leaves
        // the store untouched.
        let seller_base = inner.frozen(&trade.seller_address, &trade.asset);
        if seller_base < trade.amount {
            return Err(StoreError::EscrowUnderflow(format!(
                "seller {} holds {} {} in escrow, trade needs {}",
                trade.seller_address, seller_base, trade.asset, trade.amount
            )));
        }
        let buyer_quote = inner.frozen(&trade.buyer_address, &fill.quote_asset);
        if buyer_quote < fill.quote_amount {
            return Err(StoreError::EscrowUnderflow(format!(
                "buyer {} holds {} {} in escrow, trade needs {}",
                trade.buyer_address, buyer_quote, fill.quote_asset, fill.quote_amount
            )));
        }

        let now = Utc::now();
        let maker = inner
            .orders
            .get_mut(&fill.maker_order_id)
            .ok_or(StoreError::OrderNotFound(fill.maker_order_id))?;
        maker.status = fill.maker_status;
        maker.remaining_amount = fill.maker_remaining;
        maker.updated_at = now;

        inner.trades.push(trade.clone());

        let base = trade.asset.clone();
        let quote = fill.quote_asset.clone();
        inner.balance_mut(&trade.buyer_address, &base).available += trade.amount;
        inner.balance_mut(&trade.seller_address, &base).frozen -= trade.amount;
        inner.balance_mut(&trade.buyer_address, &quote).frozen -= fill.quote_amount;
        inner.balance_mut(&trade.seller_address, &quote).available += fill.quote_amount;

        Ok(())
    }

    async fn insert_settlement(&self, settlement: &Settlement) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        inner.settlement_arrival.push(settlement.id);
        inner.settlements.insert(settlement.id, settlement.clone());
        Ok(())
    }

    async fn settle_terminal(
        &self,
        id: Uuid,
        status: SettlementStatus,
        confirmed_at: Option<DateTime<Utc>>,
        reason: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write();
        let Some(settlement) = inner.settlements.get_mut(&id) else {
            return Ok(false);
        };
        if settlement.status != SettlementStatus::Pending {
            return Ok(false);
        }
        settlement.status = status;
        settlement.confirmed_at = confirmed_at;
        settlement.failure_reason = reason.map(str::to_string);
        Ok(true)
    }

    async fn settlement(&self, id: Uuid) -> Result<Option<Settlement>, StoreError> {
        Ok(self.inner.read().settlements.get(&id).cloned())
    }

    async fn settlements(&self) -> Result<Vec<Settlement>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .settlement_arrival
            .iter()
            .rev()
            .filter_map(|id| inner.settlements.get(id).cloned())
            .collect())
    }

    async fn settlements_by_address(
        &self,
        address: &str,
    ) -> Result<Vec<(Settlement, SettlementRole)>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .settlement_arrival
            .iter()
            .rev()
            .filter_map(|id| inner.settlements.get(id))
            .filter_map(|s| {
                if s.from_address == address {
                    Some((s.clone(), SettlementRole::Sender))
                } else if s.to_address == address {
                    Some((s.clone(), SettlementRole::Receiver))
                } else {
                    None
                }
            })
            .collect())
    }

    async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.order_seq.insert(order.id, seq);
        inner.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.inner.read().orders.get(&id).cloned())
    }

    async fn orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let inner = self.inner.read();
        let mut out: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| {
                filter
                    .address
                    .as_deref()
                    .map_or(true, |addr| o.address == addr)
            })
            .filter(|o| filter.status.map_or(true, |s| o.status == s))
            .cloned()
            .collect();
        out.sort_by(|a, b| inner.seq(&b.id).cmp(&inner.seq(&a.id)));
        Ok(out)
    }

    async fn update_order(
        &self,
        id: Uuid,
        status: OrderStatus,
        remaining: Decimal,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let order = inner
            .orders
            .get_mut(&id)
            .ok_or(StoreError::OrderNotFound(id))?;
        order.status = status;
        order.remaining_amount = remaining;
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn cancel_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let mut inner = self.inner.write();
        let Some(order) = inner.orders.get_mut(&id) else {
            return Ok(None);
        };
        if !order.status.is_live() {
            return Ok(None);
        }
        order.status = OrderStatus::Cancelled;
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }

    async fn match_candidates(
        &self,
        asset: &str,
        side: OrderSide,
    ) -> Result<Vec<Order>, StoreError> {
        let inner = self.inner.read();
        let mut out: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| {
                o.asset == asset && o.side == side && o.status.is_live() && o.price.is_some()
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            let pa = a.price.unwrap_or(Decimal::ZERO);
            let pb = b.price.unwrap_or(Decimal::ZERO);
            let by_price = match side {
                OrderSide::Buy => pb.cmp(&pa),
                OrderSide::Sell => pa.cmp(&pb),
            };
            by_price.then(inner.seq(&a.id).cmp(&inner.seq(&b.id)))
        });
        Ok(out)
    }

    async fn trades(&self, filter: &TradeFilter) -> Result<Vec<Trade>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .trades
            .iter()
            .rev()
            .filter(|t| filter.asset.as_deref().map_or(true, |a| t.asset == a))
            .filter(|t| {
                filter.address.as_deref().map_or(true, |addr| {
                    t.buyer_address == addr || t.seller_address == addr
                })
            })
            .take(TRADE_HISTORY_LIMIT)
            .cloned()
            .collect())
    }

    async fn book(&self, asset: &str) -> Result<OrderBook, StoreError> {
        let inner = self.inner.read();

        let aggregate = |side: OrderSide, descending: bool| -> Vec<BookLevel> {
            let mut levels: HashMap<Decimal, (Decimal, i64)> = HashMap::new();
            for order in inner.orders.values().filter(|o| {
                o.asset == asset && o.side == side && o.status.is_live() && o.price.is_some()
            }) {
                let price = order.price.expect("filtered on price presence");
                let entry = levels.entry(price).or_insert((Decimal::ZERO, 0));
                entry.0 += order.remaining_amount;
                entry.1 += 1;
            }
            let mut out: Vec<BookLevel> = levels
                .into_iter()
                .map(|(price, (total_remaining, order_count))| BookLevel {
                    price,
                    total_remaining,
                    order_count,
                })
                .collect();
            if descending {
                out.sort_by(|a, b| b.price.cmp(&a.price));
            } else {
                out.sort_by(|a, b| a.price.cmp(&b.price));
            }
            out.truncate(BOOK_DEPTH);
            out
        };

        Ok(OrderBook {
            bids: aggregate(OrderSide::Buy, true),
            asks: aggregate(OrderSide::Sell, false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderType;
    use rust_decimal_macros::dec;

    const ALICE: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const BOB: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    fn limit_order(address: &str, side: OrderSide, amount: Decimal, price: Decimal) -> Order {
        let now = Utc::now();
        Order {
            id: Uuid::new_v4(),
            address: address.to_string(),
            asset: "ETH".to_string(),
            side,
            order_type: OrderType::Limit,
            price: Some(price),
            amount,
            remaining_amount: amount,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_missing_balance_reads_zero() {
        let store = MemoryStore::new();
        let b = store.balance(ALICE, "ETH").await.unwrap();
        assert_eq!(b.available, Decimal::ZERO);
        assert_eq!(b.frozen, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_reserve_and_release() {
        let store = MemoryStore::new();
        store
            .put_balance(ALICE, "ETH", dec!(2), Decimal::ZERO)
            .await
            .unwrap();

        store.reserve(ALICE, "ETH", dec!(1.5)).await.unwrap();
        let b = store.balance(ALICE, "ETH").await.unwrap();
        assert_eq!(b.available, dec!(0.5));
        assert_eq!(b.frozen, dec!(1.5));

        let err = store.reserve(ALICE, "ETH", dec!(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::InsufficientBalance { .. }));

        store.release(ALICE, "ETH", dec!(1.5)).await.unwrap();
        let b = store.balance(ALICE, "ETH").await.unwrap();
        assert_eq!(b.available, dec!(2));
        assert_eq!(b.frozen, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_transfer_insufficient_leaves_state_untouched() {
        let store = MemoryStore::new();
        store
            .put_balance(ALICE, "USDC", dec!(50), Decimal::ZERO)
            .await
            .unwrap();

        let err = store.transfer(ALICE, BOB, "USDC", dec!(100)).await.unwrap_err();
        match err {
            StoreError::InsufficientBalance {
                required,
                available,
                ..
            } => {
                assert_eq!(required, dec!(100));
                assert_eq!(available, dec!(50));
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(store.balance(ALICE, "USDC").await.unwrap().available, dec!(50));
        assert_eq!(store.balance(BOB, "USDC").await.unwrap().available, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_candidates_price_time_priority() {
        let store = MemoryStore::new();
        let first = limit_order(ALICE, OrderSide::Sell, dec!(1), dec!(2000));
        let second = limit_order(BOB, OrderSide::Sell, dec!(1), dec!(1999));
        let third = limit_order(ALICE, OrderSide::Sell, dec!(1), dec!(2000));
        store.insert_order(&first).await.unwrap();
        store.insert_order(&second).await.unwrap();
        store.insert_order(&third).await.unwrap();

        let candidates = store.match_candidates("ETH", OrderSide::Sell).await.unwrap();
        let ids: Vec<Uuid> = candidates.iter().map(|o| o.id).collect();
        // Best (lowest) ask first; equal prices in arrival order.
        assert_eq!(ids, vec![second.id, first.id, third.id]);
    }

    #[tokio::test]
    async fn test_cancel_is_conditional() {
        let store = MemoryStore::new();
        let order = limit_order(ALICE, OrderSide::Buy, dec!(1), dec!(2000));
        store.insert_order(&order).await.unwrap();

        let cancelled = store.cancel_order(order.id).await.unwrap();
        assert!(cancelled.is_some());
        assert_eq!(cancelled.unwrap().status, OrderStatus::Cancelled);

        // Second cancel is a no-op.
        assert!(store.cancel_order(order.id).await.unwrap().is_none());
        assert!(store.cancel_order(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_book_aggregation() {
        let store = MemoryStore::new();
        store
            .insert_order(&limit_order(ALICE, OrderSide::Buy, dec!(1), dec!(2000)))
            .await
            .unwrap();
        store
            .insert_order(&limit_order(BOB, OrderSide::Buy, dec!(2), dec!(2000)))
            .await
            .unwrap();
        store
            .insert_order(&limit_order(ALICE, OrderSide::Buy, dec!(1), dec!(2001)))
            .await
            .unwrap();
        store
            .insert_order(&limit_order(BOB, OrderSide::Sell, dec!(1.5), dec!(2002)))
            .await
            .unwrap();

        let book = store.book("ETH").await.unwrap();
        assert_eq!(book.bids.len(), 2);
        assert_eq!(book.bids[0].price, dec!(2001));
        assert_eq!(book.bids[1].price, dec!(2000));
        assert_eq!(book.bids[1].total_remaining, dec!(3));
        assert_eq!(book.bids[1].order_count, 2);
        assert_eq!(book.asks.len(), 1);
        assert_eq!(book.asks[0].total_remaining, dec!(1.5));
    }

    #[tokio::test]
    async fn test_settle_terminal_exactly_once() {
        let store = MemoryStore::new();
        let s = Settlement::new(ALICE, BOB, dec!(100), "USDC");
        store.insert_settlement(&s).await.unwrap();

        let first = store
            .settle_terminal(s.id, SettlementStatus::Confirmed, Some(Utc::now()), None)
            .await
            .unwrap();
        assert!(first);

        let second = store
            .settle_terminal(s.id, SettlementStatus::Failed, None, Some("nope"))
            .await
            .unwrap();
        assert!(!second);

        let stored = store.settlement(s.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SettlementStatus::Confirmed);
        assert!(stored.failure_reason.is_none());
    }
}
