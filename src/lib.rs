//! # Exchange Core
//!
//! The matching core of a centralized trading exchange: a price-time
//! priority limit order book per symbol, an order lifecycle manager in
//! front of it, and a settlement ledger that moves participant balances as
//! trades execute. Together they form a continuous double auction with
//! instant internal settlement.
//!
//! ## Components
//!
//! - **[`ledger::Ledger`]** — the authoritative balance store. Atomic
//!   deposit/withdraw/lock/unlock plus four-leg trade settlement with
//!   per-row linearizability and fixed-order lock acquisition.
//! - **[`book::OrderBook`]** — one book per symbol: two sorted sides of
//!   FIFO price levels, maker-price matching, self-match prevention, and
//!   an order-id index for fast cancellation.
//! - **[`engine::Engine`]** — the order lifecycle manager. Validates
//!   against reference data and risk limits, reserves balances, routes to
//!   the book or the advanced-order registry, settles resulting trades,
//!   releases residual locks, and drives stop/trailing/iceberg/OCO
//!   semantics.
//! - **[`registry::AdvancedOrderRegistry`]** — conditional orders held off
//!   the book until their trigger fires, and iceberg hidden pools.
//! - **[`refdata::ReferenceData`]** — immutable symbol and asset catalog
//!   loaded at startup.
//! - **[`journal::EventJournal`]** — the write-only, ordered event log;
//!   sufficient (with journaled deposits) to rebuild all engine state via
//!   [`engine::replay`].
//!
//! ## Numerics
//!
//! Every price and quantity is an integer count of raw fixed-point units
//! scaled by the owning asset; no floating point enters any balance or
//! matching path, and settlement conserves each asset's total supply
//! exactly.
//!
//! ## Concurrency model
//!
//! Each symbol is owned by exactly one worker and all operations on it are
//! serialized; distinct symbols execute in parallel. The ledger is the
//! only shared mutable state, synchronized per (participant, asset) row.
//! Matching itself runs without locks once a worker holds its symbol.
//!
//! ## Example
//!
//! ```
//! use exchange_core::prelude::*;
//! use std::sync::Arc;
//!
//! let config = EngineConfig::from_json(
//!     r#"{
//!         "assets": [
//!             {"id": "USD", "scale": 2},
//!             {"id": "DEC", "scale": 8}
//!         ],
//!         "symbols": [{
//!             "symbol": "DEC/USD",
//!             "base": "DEC", "quote": "USD",
//!             "tick_size": 1, "lot_size": 1,
//!             "min_quantity": 1, "max_quantity": 1000000000000
//!         }]
//!     }"#,
//! )
//! .unwrap();
//! let engine = Engine::new(&config, Arc::new(MemoryJournal::new())).unwrap();
//!
//! let alice = ParticipantId::from("alice");
//! let usd = AssetId::from("USD");
//! engine.deposit(&alice, &usd, 1_000_000).unwrap();
//!
//! let accepted = engine
//!     .submit(OrderRequest::limit("alice", "DEC/USD", Side::Buy, 10_000, 100_000_000))
//!     .unwrap();
//! assert!(accepted.trades.is_empty());
//! ```

pub mod book;
pub mod engine;
pub mod journal;
pub mod ledger;
pub mod prelude;
pub mod refdata;
pub mod registry;
pub mod types;
mod utils;

pub use book::{DepthSnapshot, LevelView, OrderBook};
pub use engine::{
    Accepted, Engine, EngineError, FatalError, ModifyRequest, RejectReason, TransientError,
};
pub use journal::{EngineEvent, EventJournal, EventKind, JsonEventSerializer, MemoryJournal};
pub use ledger::{Balance, Ledger, LedgerError};
pub use refdata::{EngineConfig, ReferenceData, SelfMatchPolicy, TriggerSource};
pub use registry::AdvancedOrderRegistry;
pub use types::{
    AssetId, ClientOrderId, Order, OrderId, OrderKind, OrderRequest, OrderStatus, ParticipantId,
    Side, Symbol, TimeInForce, Trade, Trail,
};
pub use utils::current_time_millis;
