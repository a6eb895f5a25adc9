#![allow(dead_code)]

use std::sync::Arc;

use rust_decimal::Decimal;

use universal_exchange_backend::config::AppConfig;
use universal_exchange_backend::events::EventBus;
use universal_exchange_backend::models::{OrderSide, OrderType};
use universal_exchange_backend::services::matching::{MatchingEngine, NewOrder};
use universal_exchange_backend::store::{MemoryStore, Store};
use universal_exchange_backend::AppState;

pub const ALICE: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
pub const BOB: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
pub const CAROL: &str = "0xcccccccccccccccccccccccccccccccccccccccc";

pub struct Harness {
    pub store: Arc<dyn Store>,
    pub bus: Arc<EventBus>,
    pub engine: Arc<MatchingEngine>,
}

pub fn harness() -> Harness {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let bus = Arc::new(EventBus::new(64));
    let engine = Arc::new(MatchingEngine::new(store.clone(), bus.clone()));
    Harness { store, bus, engine }
}

impl Harness {
    pub async fn fund(&self, address: &str, asset: &str, amount: Decimal) {
        self.store
            .put_balance(address, asset, amount, Decimal::ZERO)
            .await
            .expect("funding a test balance");
    }

    /// Externally visible balance: available plus escrowed.
    pub async fn total_balance(&self, address: &str, asset: &str) -> Decimal {
        self.store
            .balance(address, asset)
            .await
            .expect("reading a test balance")
            .total()
    }

    pub async fn available(&self, address: &str, asset: &str) -> Decimal {
        self.store
            .balance(address, asset)
            .await
            .expect("reading a test balance")
            .available
    }

    pub fn into_app_state(self) -> Arc<AppState> {
        Arc::new(AppState {
            config: AppConfig::default(),
            store: self.store,
            bus: self.bus,
            engine: self.engine,
            metrics: None,
        })
    }
}

pub fn limit(address: &str, side: OrderSide, amount: Decimal, price: Decimal) -> NewOrder {
    NewOrder {
        address: address.to_string(),
        asset: "ETH".to_string(),
        side,
        order_type: OrderType::Limit,
        amount,
        price: Some(price),
    }
}

pub fn market(address: &str, side: OrderSide, amount: Decimal) -> NewOrder {
    NewOrder {
        address: address.to_string(),
        asset: "ETH".to_string(),
        side,
        order_type: OrderType::Market,
        amount,
        price: None,
    }
}
