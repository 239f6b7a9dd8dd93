//! Per-symbol worker state.
//!
//! One worker owns everything mutable about a symbol: its book, its
//! advanced-order registry, the order lifecycle records, per-order
//! reservations, and the sequence counters. The engine serializes all
//! operations on a symbol through the worker's mutex; distinct symbols
//! run in parallel and only ever share the ledger.

use crate::book::OrderBook;
use crate::refdata::SymbolInfo;
use crate::registry::AdvancedOrderRegistry;
use crate::types::{AssetId, Order, OrderId};
use std::collections::HashMap;

/// The unconsumed part of an order's balance reservation: quote for buys,
/// base for sells. Decremented as settlements consume locked balance and
/// released in full when the order terminates.
#[derive(Debug, Clone)]
pub(crate) struct Reservation {
    /// The locked asset.
    pub asset: AssetId,
    /// Locked quantity not yet consumed by settlement.
    pub remaining: u128,
}

#[derive(Debug)]
pub(crate) struct SymbolWorker {
    pub info: SymbolInfo,
    pub book: OrderBook,
    pub registry: AdvancedOrderRegistry,
    pub orders: HashMap<OrderId, Order>,
    pub reservations: HashMap<OrderId, Reservation>,
    next_sequence: u64,
    next_event_sequence: u64,
}

impl SymbolWorker {
    pub fn new(info: SymbolInfo) -> Self {
        let book = OrderBook::new(info.symbol.clone(), info.smp_policy);
        Self {
            info,
            book,
            registry: AdvancedOrderRegistry::new(),
            orders: HashMap::new(),
            reservations: HashMap::new(),
            next_sequence: 0,
            next_event_sequence: 0,
        }
    }

    /// Next arrival sequence; strictly increasing within the symbol and
    /// the canonical tiebreaker for time priority.
    pub fn next_sequence(&mut self) -> u64 {
        self.next_sequence += 1;
        self.next_sequence
    }

    /// Next journal event sequence for this symbol.
    pub fn next_event_sequence(&mut self) -> u64 {
        self.next_event_sequence += 1;
        self.next_event_sequence
    }

    /// Decrements an order's reservation as settlement consumes it.
    pub fn consume_reservation(&mut self, order: OrderId, amount: u128) {
        if let Some(reservation) = self.reservations.get_mut(&order) {
            reservation.remaining = reservation.remaining.saturating_sub(amount);
        }
    }
}
