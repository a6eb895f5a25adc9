//! Demo Balance Seeding
//!
//! On an empty balance table, four fixed test addresses are funded so the
//! API is usable out of the box.

use rust_decimal::Decimal;

use super::{Store, StoreError};

pub const SEED_ADDRESSES: &[&str] = &[
    "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
    "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb",
    "0xcccccccccccccccccccccccccccccccccccccccc",
    "0xdddddddddddddddddddddddddddddddddddddddd",
];

const SEED_BALANCES: &[(&str, i64)] = &[
    ("USDC", 10_000),
    ("USDT", 10_000),
    ("DAI", 10_000),
    ("ETH", 10),
    ("BTC", 1),
];

/// Seed the fixed test addresses when the balance table is empty. Returns
/// whether seeding happened.
pub async fn seed_demo_balances(store: &dyn Store) -> Result<bool, StoreError> {
    if store.has_balances().await? {
        return Ok(false);
    }

    for address in SEED_ADDRESSES {
        for (asset, amount) in SEED_BALANCES {
            store
                .put_balance(address, asset, Decimal::from(*amount), Decimal::ZERO)
                .await?;
        }
    }

    tracing::info!(
        "Seeded {} test addresses with demo balances",
        SEED_ADDRESSES.len()
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_seed_only_on_empty_table() {
        let store = MemoryStore::new();
        assert!(seed_demo_balances(&store).await.unwrap());

        let b = store.balance(SEED_ADDRESSES[0], "USDC").await.unwrap();
        assert_eq!(b.available, dec!(10000));

        // Mutate, then re-seed: nothing changes.
        store
            .put_balance(SEED_ADDRESSES[0], "USDC", dec!(1), Decimal::ZERO)
            .await
            .unwrap();
        assert!(!seed_demo_balances(&store).await.unwrap());
        let b = store.balance(SEED_ADDRESSES[0], "USDC").await.unwrap();
        assert_eq!(b.available, dec!(1));
    }
}
