//! Settlement processor scenarios: the asynchronous funding path.

mod common;

use std::time::Duration;

use common::{harness, ALICE, BOB};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use universal_exchange_backend::events::SettlementRequested;
use universal_exchange_backend::models::{Settlement, SettlementStatus};
use universal_exchange_backend::services::settlement::SettlementProcessor;
use universal_exchange_backend::store::Store;

/// Poll until the settlement leaves `pending` or the timeout hits.
async fn wait_for_terminal(
    store: &dyn universal_exchange_backend::store::Store,
    id: uuid::Uuid,
) -> Settlement {
    for _ in 0..200 {
        let settlement = store
            .settlement(id)
            .await
            .expect("settlement lookup")
            .expect("settlement exists");
        if settlement.status.is_terminal() {
            return settlement;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("settlement {id} never reached a terminal state");
}

fn request_for(settlement: &Settlement) -> SettlementRequested {
    SettlementRequested {
        id: settlement.id,
        from: settlement.from_address.clone(),
        to: settlement.to_address.clone(),
        amount: settlement.amount,
        asset: settlement.asset.clone(),
    }
}

#[tokio::test]
async fn confirmed_settlement_moves_the_funds() {
    let h = harness();
    h.fund(ALICE, "USDC", dec!(500)).await;

    let settlement = Settlement::new(ALICE, BOB, dec!(100), "USDC");
    h.store.insert_settlement(&settlement).await.unwrap();

    let mut confirmed_rx = h.bus.subscribe_settlement_confirmed();
    SettlementProcessor::with_delay(h.store.clone(), h.bus.clone(), 1..=5).spawn();
    h.bus.publish_settlement_requested(request_for(&settlement));

    let stored = wait_for_terminal(h.store.as_ref(), settlement.id).await;
    assert_eq!(stored.status, SettlementStatus::Confirmed);
    assert!(stored.confirmed_at.is_some());
    assert!(stored.failure_reason.is_none());

    assert_eq!(h.available(ALICE, "USDC").await, dec!(400));
    assert_eq!(h.available(BOB, "USDC").await, dec!(100));

    let event = confirmed_rx.recv().await.unwrap();
    assert_eq!(event.id, settlement.id);
}

#[tokio::test]
async fn insufficient_balance_fails_and_leaves_balances_unchanged() {
    let h = harness();
    h.fund(ALICE, "USDC", dec!(50)).await;

    let settlement = Settlement::new(ALICE, BOB, dec!(100), "USDC");
    h.store.insert_settlement(&settlement).await.unwrap();

    let mut failed_rx = h.bus.subscribe_settlement_failed();
    SettlementProcessor::with_delay(h.store.clone(), h.bus.clone(), 1..=5).spawn();
    h.bus.publish_settlement_requested(request_for(&settlement));

    let stored = wait_for_terminal(h.store.as_ref(), settlement.id).await;
    assert_eq!(stored.status, SettlementStatus::Failed);
    assert!(stored.confirmed_at.is_none());
    let reason = stored.failure_reason.expect("failed settlements carry a reason");
    assert!(reason.contains("required 100"));
    assert!(reason.contains("available 50"));

    assert_eq!(h.available(ALICE, "USDC").await, dec!(50));
    assert_eq!(h.available(BOB, "USDC").await, Decimal::ZERO);

    let event = failed_rx.recv().await.unwrap();
    assert_eq!(event.id, settlement.id);
    assert!(event.reason.contains("Insufficient balance"));
}

#[tokio::test]
async fn settlement_stays_pending_until_processed() {
    let h = harness();
    h.fund(ALICE, "USDC", dec!(500)).await;

    let settlement = Settlement::new(ALICE, BOB, dec!(100), "USDC");
    h.store.insert_settlement(&settlement).await.unwrap();

    // No processor running: nothing moves.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let stored = h.store.settlement(settlement.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SettlementStatus::Pending);
    assert_eq!(h.available(ALICE, "USDC").await, dec!(500));
}

#[tokio::test]
async fn redelivered_request_does_not_double_debit() {
    let h = harness();
    h.fund(ALICE, "USDC", dec!(500)).await;

    let settlement = Settlement::new(ALICE, BOB, dec!(100), "USDC");
    h.store.insert_settlement(&settlement).await.unwrap();

    SettlementProcessor::with_delay(h.store.clone(), h.bus.clone(), 1..=5).spawn();
    let request = request_for(&settlement);
    h.bus.publish_settlement_requested(request.clone());
    h.bus.publish_settlement_requested(request);

    wait_for_terminal(h.store.as_ref(), settlement.id).await;
    // Give the duplicate time to be (not) processed.
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(h.available(ALICE, "USDC").await, dec!(400));
    assert_eq!(h.available(BOB, "USDC").await, dec!(100));
}

#[tokio::test]
async fn settlements_preserve_the_pair_sum() {
    let h = harness();
    h.fund(ALICE, "USDC", dec!(300)).await;
    h.fund(BOB, "USDC", dec!(120)).await;

    SettlementProcessor::with_delay(h.store.clone(), h.bus.clone(), 1..=3).spawn();

    for amount in [dec!(10), dec!(250), dec!(500), dec!(35)] {
        let settlement = Settlement::new(ALICE, BOB, amount, "USDC");
        h.store.insert_settlement(&settlement).await.unwrap();
        h.bus.publish_settlement_requested(request_for(&settlement));
        wait_for_terminal(h.store.as_ref(), settlement.id).await;
    }

    let sum = h.available(ALICE, "USDC").await + h.available(BOB, "USDC").await;
    assert_eq!(sum, dec!(420));
}
