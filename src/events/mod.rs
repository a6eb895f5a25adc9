//! Event Bus
//!
//! Typed in-process topics for the settlement lifecycle and executed
//! trades. Each topic is a `tokio::sync::broadcast` channel consumed by
//! worker tasks; delivery is at-least-once within the process lifetime and
//! ordered per publisher. When Redis is configured, every publish is
//! mirrored as JSON to a channel of the same name for external consumers.

pub mod redis;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::Trade;

/// Topic names, shared with the Redis mirror channels.
pub mod topics {
    pub const SETTLEMENT_REQUESTS: &str = "settlement_requests";
    pub const SETTLEMENT_CONFIRMED: &str = "settlement_confirmed";
    pub const SETTLEMENT_FAILED: &str = "settlement_failed";
    pub const TRADES: &str = "trades";
}

/// Payload of `settlement_requests`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementRequested {
    pub id: Uuid,
    pub from: String,
    pub to: String,
    pub amount: Decimal,
    pub asset: String,
}

/// Payload of `settlement_confirmed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementConfirmed {
    pub id: Uuid,
}

/// Payload of `settlement_failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementFailed {
    pub id: Uuid,
    pub reason: String,
}

/// In-process topic-based publish/subscribe bus.
pub struct EventBus {
    settlement_requests: broadcast::Sender<SettlementRequested>,
    settlement_confirmed: broadcast::Sender<SettlementConfirmed>,
    settlement_failed: broadcast::Sender<SettlementFailed>,
    trades: broadcast::Sender<Trade>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (settlement_requests, _) = broadcast::channel(capacity);
        let (settlement_confirmed, _) = broadcast::channel(capacity);
        let (settlement_failed, _) = broadcast::channel(capacity);
        let (trades, _) = broadcast::channel(capacity);
        Self {
            settlement_requests,
            settlement_confirmed,
            settlement_failed,
            trades,
        }
    }

    // A send error only means nobody is subscribed, which is fine for
    // fire-and-forget topics.

    pub fn publish_settlement_requested(&self, event: SettlementRequested) {
        tracing::debug!(topic = topics::SETTLEMENT_REQUESTS, id = %event.id, "publishing event");
        let _ = self.settlement_requests.send(event);
    }

    pub fn publish_settlement_confirmed(&self, event: SettlementConfirmed) {
        tracing::debug!(topic = topics::SETTLEMENT_CONFIRMED, id = %event.id, "publishing event");
        let _ = self.settlement_confirmed.send(event);
    }

    pub fn publish_settlement_failed(&self, event: SettlementFailed) {
        tracing::debug!(
            topic = topics::SETTLEMENT_FAILED,
            id = %event.id,
            reason = %event.reason,
            "publishing event"
        );
        let _ = self.settlement_failed.send(event);
    }

    pub fn publish_trade(&self, trade: Trade) {
        tracing::debug!(
            topic = topics::TRADES,
            id = %trade.id,
            asset = %trade.asset,
            "publishing event"
        );
        let _ = self.trades.send(trade);
    }

    pub fn subscribe_settlement_requests(&self) -> broadcast::Receiver<SettlementRequested> {
        self.settlement_requests.subscribe()
    }

    pub fn subscribe_settlement_confirmed(&self) -> broadcast::Receiver<SettlementConfirmed> {
        self.settlement_confirmed.subscribe()
    }

    pub fn subscribe_settlement_failed(&self) -> broadcast::Receiver<SettlementFailed> {
        self.settlement_failed.subscribe()
    }

    pub fn subscribe_trades(&self) -> broadcast::Receiver<Trade> {
        self.trades.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe_settlement_requests();

        bus.publish_settlement_requested(SettlementRequested {
            id: Uuid::new_v4(),
            from: "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_string(),
            to: "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb".to_string(),
            amount: dec!(100),
            asset: "USDC".to_string(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.amount, dec!(100));
        assert_eq!(event.asset, "USDC");
    }

    #[tokio::test]
    async fn test_publisher_ordering_preserved() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe_settlement_confirmed();

        let ids: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            bus.publish_settlement_confirmed(SettlementConfirmed { id: *id });
        }
        for id in &ids {
            assert_eq!(rx.recv().await.unwrap().id, *id);
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_fine() {
        let bus = EventBus::new(16);
        bus.publish_settlement_failed(SettlementFailed {
            id: Uuid::new_v4(),
            reason: "Processing error occurred".to_string(),
        });
    }
}
