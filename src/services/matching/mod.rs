//! Order Matching Engine Module
//!
//! Price-time priority matching over the store-backed order book.
//!
//! # Architecture
//!
//! ```text
//! API Handler
//!   ↓
//! MatchingEngine (per-asset serialization)
//!   ├→ Store (candidates, escrow, atomic fills)
//!   └→ EventBus (trade events)
//! ```
//!
//! Orders are admitted with escrow-style balance reservation, matched
//! against live resting limit orders (best price first, oldest first within
//! a level), and every matching step is committed through one atomic store
//! operation. Two orders on the same asset never interleave their match
//! loops; distinct assets match in parallel.

mod engine;
mod types;

pub use engine::MatchingEngine;
pub use types::{MatchResult, MatchingError, NewOrder};
