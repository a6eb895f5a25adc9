//! Matching Engine
//!
//! Admission, escrow, the match loop, and cancellation. Everything runs
//! under a per-asset mutex so two orders on the same asset cannot observe
//! each other's half-applied book mutations; each matching step itself is
//! committed atomically by the store.

use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::events::EventBus;
use crate::models::{
    asset, Order, OrderSide, OrderStatus, OrderType, Trade, QUOTE_ASSET,
};
use crate::store::{FillBatch, Store};

use super::types::{MatchResult, MatchingError, NewOrder};

/// Funds escrowed for an order at admission.
#[derive(Debug, Clone, Copy)]
enum EscrowHold {
    /// Base asset, sell orders: the full order amount.
    Base(Decimal),
    /// Quote asset, buy orders: `amount × price` for limit orders, the
    /// entire available quote balance for market orders.
    Quote(Decimal),
}

pub struct MatchingEngine {
    store: Arc<dyn Store>,
    bus: Arc<EventBus>,
    asset_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl MatchingEngine {
    pub fn new(store: Arc<dyn Store>, bus: Arc<EventBus>) -> Self {
        Self {
            store,
            bus,
            asset_locks: DashMap::new(),
        }
    }

    fn asset_lock(&self, asset: &str) -> Arc<Mutex<()>> {
        self.asset_locks
            .entry(asset.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Process a new order: validate, escrow funds, match against the book,
    /// and persist the outcome.
    pub async fn process_order(&self, new_order: NewOrder) -> Result<MatchResult, MatchingError> {
        let asset_info = asset::lookup(&new_order.asset)
            .ok_or_else(|| MatchingError::UnknownAsset(new_order.asset.clone()))?;
        let quote_decimals = asset::quote_decimals();
        validate_order(&new_order, asset_info.decimals, quote_decimals)?;

        let lock = self.asset_lock(&new_order.asset);
        let _guard = lock.lock().await;

        let hold = self.place_escrow(&new_order).await?;

        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            address: new_order.address.clone(),
            asset: new_order.asset.clone(),
            side: new_order.side,
            order_type: new_order.order_type,
            price: new_order.price,
            amount: new_order.amount,
            remaining_amount: new_order.amount,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        if let Err(e) = self.store.insert_order(&order).await {
            self.undo_escrow(&new_order.address, &new_order.asset, hold)
                .await;
            return Err(e.into());
        }

        tracing::debug!(
            order_id = %order.id,
            asset = %order.asset,
            side = %order.side,
            order_type = %order.order_type,
            amount = %order.amount,
            "order admitted"
        );

        let candidates = self
            .store
            .match_candidates(&order.asset, order.side.opposite())
            .await?;

        let mut trades: Vec<Trade> = Vec::new();
        let mut remaining = order.amount;
        let mut quote_spent = Decimal::ZERO;
        let quote_budget = match hold {
            EscrowHold::Quote(held) => held,
            EscrowHold::Base(_) => Decimal::ZERO,
        };

        for maker in candidates {
            if remaining.is_zero() {
                break;
            }
            let Some(maker_price) = maker.price else {
                continue;
            };

            // Candidates come best price first, so the first crossing
            // failure ends the loop.
            if let Some(limit) = order.price {
                let crosses = match order.side {
                    OrderSide::Buy => limit >= maker_price,
                    OrderSide::Sell => maker_price >= limit,
                };
                if !crosses {
                    break;
                }
            }

            let mut qty = remaining.min(maker.remaining_amount);
            if order.side == OrderSide::Buy && order.order_type == OrderType::Market {
                let budget_left = quote_budget - quote_spent;
                let affordable = (budget_left / maker_price)
                    .round_dp_with_strategy(asset_info.decimals, RoundingStrategy::ToZero);
                qty = qty.min(affordable);
                if qty <= Decimal::ZERO {
                    break;
                }
            }

            // Both legs of the quote movement use the same truncated value,
            // so conservation stays exact at the quote asset's scale.
            let quote_amount =
                (qty * maker_price).round_dp_with_strategy(quote_decimals, RoundingStrategy::ToZero);
            if quote_amount.is_zero() {
                // Dust: the fill would move base for no quote.
                break;
            }

            let maker_remaining = maker.remaining_amount - qty;
            let maker_status = if maker_remaining.is_zero() {
                OrderStatus::Filled
            } else {
                OrderStatus::PartiallyFilled
            };

            let (buy_order_id, sell_order_id, buyer_address, seller_address) = match order.side {
                OrderSide::Buy => (order.id, maker.id, order.address.clone(), maker.address.clone()),
                OrderSide::Sell => (maker.id, order.id, maker.address.clone(), order.address.clone()),
            };

            let trade = Trade {
                id: Uuid::new_v4(),
                buy_order_id,
                sell_order_id,
                asset: order.asset.clone(),
                amount: qty,
                price: maker_price,
                buyer_address,
                seller_address,
                created_at: Utc::now(),
            };

            let fill = FillBatch {
                trade: trade.clone(),
                maker_order_id: maker.id,
                maker_status,
                maker_remaining,
                quote_asset: QUOTE_ASSET.to_string(),
                quote_amount,
            };
            self.store.apply_fill(&fill).await?;

            remaining -= qty;
            quote_spent += quote_amount;

            tracing::info!(
                trade_id = %trade.id,
                asset = %trade.asset,
                amount = %trade.amount,
                price = %trade.price,
                maker_order_id = %maker.id,
                taker_order_id = %order.id,
                "trade executed"
            );
            crate::metrics::record_trade_executed(&trade.asset, trade.amount * trade.price);

            self.bus.publish_trade(trade.clone());
            trades.push(trade);
        }

        let status = if remaining.is_zero() {
            OrderStatus::Filled
        } else if order.order_type == OrderType::Market {
            // Market remainders never rest: immediate-or-cancel.
            OrderStatus::Cancelled
        } else if trades.is_empty() {
            OrderStatus::Pending
        } else {
            OrderStatus::PartiallyFilled
        };

        self.settle_escrow(&order, status, remaining, quote_budget, quote_spent)
            .await?;
        self.store.update_order(order.id, status, remaining).await?;

        crate::metrics::record_order_submitted(&order.asset, order.side, order.order_type);
        tracing::info!(
            order_id = %order.id,
            status = %status,
            filled = %(order.amount - remaining),
            remaining = %remaining,
            trades = trades.len(),
            "order processed"
        );

        Ok(MatchResult {
            order_id: order.id,
            status,
            trades,
            remaining_amount: remaining,
        })
    }

    /// Cancel a live order and refund the escrow held for its remainder.
    pub async fn cancel_order(&self, id: Uuid) -> Result<Order, MatchingError> {
        let existing = self
            .store
            .order(id)
            .await?
            .ok_or(MatchingError::OrderNotFound(id))?;

        let lock = self.asset_lock(&existing.asset);
        let _guard = lock.lock().await;

        match self.store.cancel_order(id).await? {
            Some(cancelled) => {
                if cancelled.remaining_amount > Decimal::ZERO {
                    match cancelled.side {
                        OrderSide::Sell => {
                            self.store
                                .release(
                                    &cancelled.address,
                                    &cancelled.asset,
                                    cancelled.remaining_amount,
                                )
                                .await?;
                        }
                        OrderSide::Buy => {
                            if let Some(price) = cancelled.price {
                                self.store
                                    .release(
                                        &cancelled.address,
                                        QUOTE_ASSET,
                                        cancelled.remaining_amount * price,
                                    )
                                    .await?;
                            }
                        }
                    }
                }
                crate::metrics::record_order_cancelled(&cancelled.asset);
                tracing::info!(order_id = %id, "order cancelled");
                Ok(cancelled)
            }
            None => {
                // The conditional update lost: report the current state.
                let current = self
                    .store
                    .order(id)
                    .await?
                    .ok_or(MatchingError::OrderNotFound(id))?;
                Err(MatchingError::CannotCancel {
                    id,
                    status: current.status,
                })
            }
        }
    }

    /// Escrow funds for a new order, closing the check-then-trade race: the
    /// reservation happens under the asset lock, as one atomic store op.
    async fn place_escrow(&self, new_order: &NewOrder) -> Result<EscrowHold, MatchingError> {
        match (new_order.side, new_order.order_type) {
            (OrderSide::Sell, _) => {
                self.store
                    .reserve(&new_order.address, &new_order.asset, new_order.amount)
                    .await?;
                Ok(EscrowHold::Base(new_order.amount))
            }
            (OrderSide::Buy, OrderType::Limit) => {
                let price = new_order.price.ok_or(MatchingError::PriceRequired)?;
                let cost = new_order.amount * price;
                self.store
                    .reserve(&new_order.address, QUOTE_ASSET, cost)
                    .await?;
                Ok(EscrowHold::Quote(cost))
            }
            (OrderSide::Buy, OrderType::Market) => {
                // A market buy has no definite cost; hold the whole quote
                // balance for the duration of the call and return the
                // unspent part afterwards.
                let balance = self.store.balance(&new_order.address, QUOTE_ASSET).await?;
                let held = balance.available;
                if held > Decimal::ZERO {
                    self.store
                        .reserve(&new_order.address, QUOTE_ASSET, held)
                        .await?;
                }
                Ok(EscrowHold::Quote(held))
            }
        }
    }

    async fn undo_escrow(&self, address: &str, base_asset: &str, hold: EscrowHold) {
        let result = match hold {
            EscrowHold::Base(amount) if amount > Decimal::ZERO => {
                self.store.release(address, base_asset, amount).await
            }
            EscrowHold::Quote(amount) if amount > Decimal::ZERO => {
                self.store.release(address, QUOTE_ASSET, amount).await
            }
            _ => Ok(()),
        };
        if let Err(e) = result {
            tracing::error!("Failed to roll back escrow for {}: {}", address, e);
        }
    }

    /// Release whatever part of the admission escrow the final order state
    /// no longer needs. A live limit order keeps exactly its remainder
    /// escrowed; filled and cancelled orders keep nothing.
    async fn settle_escrow(
        &self,
        order: &Order,
        status: OrderStatus,
        remaining: Decimal,
        quote_budget: Decimal,
        quote_spent: Decimal,
    ) -> Result<(), MatchingError> {
        match order.side {
            OrderSide::Sell => {
                if order.order_type == OrderType::Market && remaining > Decimal::ZERO {
                    self.store
                        .release(&order.address, &order.asset, remaining)
                        .await?;
                }
            }
            OrderSide::Buy => {
                let needed = match (status, order.price) {
                    (OrderStatus::Pending | OrderStatus::PartiallyFilled, Some(price)) => {
                        remaining * price
                    }
                    _ => Decimal::ZERO,
                };
                let excess = quote_budget - quote_spent - needed;
                if excess > Decimal::ZERO {
                    self.store
                        .release(&order.address, QUOTE_ASSET, excess)
                        .await?;
                }
            }
        }
        Ok(())
    }
}

fn validate_order(
    order: &NewOrder,
    base_decimals: u32,
    quote_decimals: u32,
) -> Result<(), MatchingError> {
    if order.amount <= Decimal::ZERO {
        return Err(MatchingError::InvalidAmount(
            "amount must be positive".to_string(),
        ));
    }
    if order.amount.normalize().scale() > base_decimals {
        return Err(MatchingError::InvalidAmount(format!(
            "amount precision exceeds {} decimals",
            base_decimals
        )));
    }
    match order.order_type {
        OrderType::Limit => {
            let price = order.price.ok_or(MatchingError::PriceRequired)?;
            if price <= Decimal::ZERO {
                return Err(MatchingError::InvalidPrice(
                    "price must be positive".to_string(),
                ));
            }
            if price.normalize().scale() > quote_decimals {
                return Err(MatchingError::InvalidPrice(format!(
                    "price precision exceeds {} decimals",
                    quote_decimals
                )));
            }
        }
        OrderType::Market => {
            if order.price.is_some() {
                return Err(MatchingError::MarketPriceNotAllowed);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn new_order(
        side: OrderSide,
        order_type: OrderType,
        amount: Decimal,
        price: Option<Decimal>,
    ) -> NewOrder {
        NewOrder {
            address: "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_string(),
            asset: "ETH".to_string(),
            side,
            order_type,
            amount,
            price,
        }
    }

    #[test]
    fn test_limit_requires_price() {
        let order = new_order(OrderSide::Buy, OrderType::Limit, dec!(1), None);
        assert!(matches!(
            validate_order(&order, 18, 6),
            Err(MatchingError::PriceRequired)
        ));
    }

    #[test]
    fn test_market_rejects_price() {
        let order = new_order(OrderSide::Buy, OrderType::Market, dec!(1), Some(dec!(2000)));
        assert!(matches!(
            validate_order(&order, 18, 6),
            Err(MatchingError::MarketPriceNotAllowed)
        ));
    }

    #[test]
    fn test_rejects_non_positive_values() {
        let order = new_order(OrderSide::Sell, OrderType::Limit, dec!(0), Some(dec!(2000)));
        assert!(matches!(
            validate_order(&order, 18, 6),
            Err(MatchingError::InvalidAmount(_))
        ));

        let order = new_order(OrderSide::Sell, OrderType::Limit, dec!(1), Some(dec!(-1)));
        assert!(matches!(
            validate_order(&order, 18, 6),
            Err(MatchingError::InvalidPrice(_))
        ));
    }

    #[test]
    fn test_rejects_excess_precision() {
        // BTC allows 8 decimals.
        let order = new_order(OrderSide::Sell, OrderType::Limit, dec!(0.000000001), Some(dec!(1)));
        assert!(matches!(
            validate_order(&order, 8, 6),
            Err(MatchingError::InvalidAmount(_))
        ));

        // USDC price precision is 6 decimals.
        let order = new_order(OrderSide::Buy, OrderType::Limit, dec!(1), Some(dec!(0.0000001)));
        assert!(matches!(
            validate_order(&order, 8, 6),
            Err(MatchingError::InvalidPrice(_))
        ));
    }
}
