//! Settlement Processor
//!
//! Worker task consuming `settlement_requests` from the event bus. Each
//! request waits out a simulated confirmation delay, then atomically moves
//! the funds and transitions the settlement to `confirmed` or `failed`.
//! Requests are handled one at a time, and a settlement already in a
//! terminal state is skipped, so redelivered events cannot double-debit.

use chrono::Utc;
use rand::Rng;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::events::{EventBus, SettlementConfirmed, SettlementFailed, SettlementRequested};
use crate::models::SettlementStatus;
use crate::store::{Store, StoreError};

/// Simulated confirmation delay bounds, in milliseconds.
const DEFAULT_DELAY_MS: RangeInclusive<u64> = 1000..=3000;

const PROCESSING_ERROR_REASON: &str = "Processing error occurred";

pub struct SettlementProcessor {
    store: Arc<dyn Store>,
    bus: Arc<EventBus>,
    delay_ms: RangeInclusive<u64>,
}

impl SettlementProcessor {
    pub fn new(store: Arc<dyn Store>, bus: Arc<EventBus>) -> Self {
        Self::with_delay(store, bus, DEFAULT_DELAY_MS)
    }

    /// Override the confirmation delay; the test suites shrink it.
    pub fn with_delay(
        store: Arc<dyn Store>,
        bus: Arc<EventBus>,
        delay_ms: RangeInclusive<u64>,
    ) -> Self {
        Self {
            store,
            bus,
            delay_ms,
        }
    }

    /// Spawn the worker loop. The loop only ends when the bus is dropped;
    /// per-request failures are contained and never tear it down.
    pub fn spawn(self) -> JoinHandle<()> {
        let mut rx = self.bus.subscribe_settlement_requests();
        tokio::spawn(async move {
            tracing::info!("Settlement processor started");
            loop {
                match rx.recv().await {
                    Ok(request) => self.process(request).await,
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!("Settlement processor lagged {} requests", n);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::warn!("Settlement processor stopped");
        })
    }

    async fn process(&self, request: SettlementRequested) {
        // Redelivery guard: a settlement already out of pending is done.
        match self.store.settlement(request.id).await {
            Ok(Some(settlement)) if settlement.status.is_terminal() => {
                tracing::debug!(
                    settlement_id = %request.id,
                    status = %settlement.status,
                    "skipping settlement already in terminal state"
                );
                return;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(settlement_id = %request.id, "settlement lookup failed: {}", e);
                self.fail(request.id, PROCESSING_ERROR_REASON).await;
                return;
            }
        }

        let delay = rand::thread_rng().gen_range(self.delay_ms.clone());
        tokio::time::sleep(Duration::from_millis(delay)).await;

        match self
            .store
            .transfer(&request.from, &request.to, &request.asset, request.amount)
            .await
        {
            Ok(()) => self.confirm(request).await,
            Err(StoreError::InsufficientBalance {
                required,
                available,
                ..
            }) => {
                let reason =
                    format!("Insufficient balance: required {required}, available {available}");
                tracing::warn!(settlement_id = %request.id, "{}", reason);
                self.fail(request.id, &reason).await;
            }
            Err(e) => {
                tracing::error!(settlement_id = %request.id, "settlement transfer failed: {}", e);
                self.fail(request.id, PROCESSING_ERROR_REASON).await;
            }
        }
    }

    async fn confirm(&self, request: SettlementRequested) {
        match self
            .store
            .settle_terminal(
                request.id,
                SettlementStatus::Confirmed,
                Some(Utc::now()),
                None,
            )
            .await
        {
            Ok(true) => {
                tracing::info!(
                    settlement_id = %request.id,
                    from = %request.from,
                    to = %request.to,
                    amount = %request.amount,
                    asset = %request.asset,
                    "settlement confirmed"
                );
                crate::metrics::record_settlement("confirmed");
                self.bus
                    .publish_settlement_confirmed(SettlementConfirmed { id: request.id });
            }
            Ok(false) => {
                tracing::warn!(
                    settlement_id = %request.id,
                    "transfer applied but settlement was no longer pending"
                );
            }
            Err(e) => {
                tracing::error!(
                    settlement_id = %request.id,
                    "failed to mark settlement confirmed: {}",
                    e
                );
            }
        }
    }

    async fn fail(&self, id: uuid::Uuid, reason: &str) {
        match self
            .store
            .settle_terminal(id, SettlementStatus::Failed, None, Some(reason))
            .await
        {
            Ok(true) => {
                crate::metrics::record_settlement("failed");
                self.bus.publish_settlement_failed(SettlementFailed {
                    id,
                    reason: reason.to_string(),
                });
            }
            Ok(false) => {
                tracing::debug!(settlement_id = %id, "settlement already terminal, not failing");
            }
            Err(e) => {
                tracing::error!(settlement_id = %id, "failed to mark settlement failed: {}", e);
            }
        }
    }
}
