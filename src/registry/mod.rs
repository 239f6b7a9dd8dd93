//! The advanced-order registry: orders monitored off the book.
//!
//! Stop, stop-limit, take-profit and trailing-stop orders wait here until
//! their price condition fires, at which point the lifecycle manager
//! re-submits them as ordinary orders. Iceberg parents keep their hidden
//! pool here while a visible slice works on the book. OCO links are kept by
//! the lifecycle manager itself, since either leg may live on the book or
//! in this registry.

use crate::types::{OrderId, OrderKind, ParticipantId, Side, Trail};
use std::collections::HashMap;
use tracing::debug;

/// A conditional order waiting for its trigger.
#[derive(Debug, Clone)]
pub struct PendingTrigger {
    /// The registered order.
    pub order: OrderId,
    /// Its owner.
    pub participant: ParticipantId,
    /// Side of the order that will be submitted on fire.
    pub side: Side,
    /// Quantity to submit on fire.
    pub quantity: u128,
    /// `Stop`, `StopLimit`, `TakeProfit` or `TrailingStop`.
    pub kind: OrderKind,
    /// Current effective trigger price. Fixed for stops and take-profits;
    /// recomputed from the water mark for trailing stops.
    pub stop_price: u128,
    /// Limit price applied on fire (stop-limit orders).
    pub limit_price: Option<u128>,
    /// Trailing distance, for trailing stops.
    pub trail: Option<Trail>,
    /// High-water mark (sell) or low-water mark (buy) since registration.
    pub water_mark: u128,
    /// Price cap used for the buy-side balance reservation at registration,
    /// re-applied as a protection limit when the fired order matches.
    pub protection_price: Option<u128>,
}

impl PendingTrigger {
    /// Advances the water mark and recomputes the effective stop for
    /// trailing orders. No-op for fixed triggers.
    pub fn update_trail(&mut self, price: u128) {
        let Some(trail) = self.trail else { return };
        match self.side {
            Side::Sell => {
                if price > self.water_mark {
                    self.water_mark = price;
                    let stop = match trail {
                        Trail::Amount(amount) => price.saturating_sub(amount),
                        Trail::Bps(bps) => price.saturating_mul(10_000 - (bps as u128).min(10_000))
                            / 10_000,
                    };
                    if stop > self.stop_price {
                        self.stop_price = stop;
                        debug!("trailing stop {} raised to {}", self.order, stop);
                    }
                }
            }
            Side::Buy => {
                if price < self.water_mark {
                    self.water_mark = price;
                    let stop = match trail {
                        Trail::Amount(amount) => price.saturating_add(amount),
                        Trail::Bps(bps) => {
                            price.saturating_mul(10_000 + bps as u128).div_ceil(10_000)
                        }
                    };
                    if stop < self.stop_price {
                        self.stop_price = stop;
                        debug!("trailing stop {} lowered to {}", self.order, stop);
                    }
                }
            }
        }
    }

    /// Whether the trigger condition holds at `price`.
    pub fn should_fire(&self, price: u128) -> bool {
        match (self.kind, self.side) {
            // stops fire when the market moves against the holder
            (OrderKind::Stop | OrderKind::StopLimit | OrderKind::TrailingStop, Side::Sell) => {
                price <= self.stop_price
            }
            (OrderKind::Stop | OrderKind::StopLimit | OrderKind::TrailingStop, Side::Buy) => {
                price >= self.stop_price
            }
            // take-profits fire when it moves in the holder's favor
            (OrderKind::TakeProfit, Side::Sell) => price >= self.stop_price,
            (OrderKind::TakeProfit, Side::Buy) => price <= self.stop_price,
            _ => false,
        }
    }
}

/// An iceberg parent: the hidden pool behind the visible slice.
#[derive(Debug, Clone)]
pub struct IcebergState {
    /// The parent order id.
    pub order: OrderId,
    /// Its owner.
    pub participant: ParticipantId,
    /// Side of every slice.
    pub side: Side,
    /// Limit price of every slice.
    pub price: u128,
    /// Displayed quantity per slice.
    pub display: u128,
    /// Quantity not yet sliced onto the book.
    pub hidden: u128,
    /// The currently working slice, if one is on the book.
    pub active_slice: Option<OrderId>,
}

impl IcebergState {
    /// Size of the next slice to emit: the displayed quantity, or whatever
    /// is left of the hidden pool.
    pub fn next_slice_quantity(&self) -> u128 {
        self.hidden.min(self.display)
    }
}

/// All advanced orders for one symbol, keyed by order id. Owned by the
/// symbol worker alongside the book.
#[derive(Debug, Default)]
pub struct AdvancedOrderRegistry {
    triggers: HashMap<OrderId, PendingTrigger>,
    icebergs: HashMap<OrderId, IcebergState>,
}

impl AdvancedOrderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a conditional order.
    pub fn register_trigger(&mut self, trigger: PendingTrigger) {
        debug!(
            "registered {} {} @ stop {}",
            trigger.kind, trigger.order, trigger.stop_price
        );
        self.triggers.insert(trigger.order, trigger);
    }

    /// Registers an iceberg parent.
    pub fn register_iceberg(&mut self, iceberg: IcebergState) {
        self.icebergs.insert(iceberg.order, iceberg);
    }

    /// Looks up a pending trigger.
    pub fn trigger(&self, order: OrderId) -> Option<&PendingTrigger> {
        self.triggers.get(&order)
    }

    /// Looks up an iceberg parent.
    pub fn iceberg(&self, order: OrderId) -> Option<&IcebergState> {
        self.icebergs.get(&order)
    }

    /// Mutable access to an iceberg parent.
    pub fn iceberg_mut(&mut self, order: OrderId) -> Option<&mut IcebergState> {
        self.icebergs.get_mut(&order)
    }

    /// Removes an iceberg parent, returning its final state.
    pub fn remove_iceberg(&mut self, order: OrderId) -> Option<IcebergState> {
        self.icebergs.remove(&order)
    }

    /// Removes a pending trigger, returning it.
    pub fn remove_trigger(&mut self, order: OrderId) -> Option<PendingTrigger> {
        self.triggers.remove(&order)
    }

    /// Whether the registry holds the order in either role.
    pub fn contains(&self, order: OrderId) -> bool {
        self.triggers.contains_key(&order) || self.icebergs.contains_key(&order)
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.triggers.len() + self.icebergs.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty() && self.icebergs.is_empty()
    }

    /// Feeds a price observation to every trigger: trails advance first,
    /// then fired triggers are removed and returned in order-id order (the
    /// registration order, since ids are monotonic).
    pub fn on_price(&mut self, price: u128) -> Vec<PendingTrigger> {
        let mut fired: Vec<OrderId> = Vec::new();
        for trigger in self.triggers.values_mut() {
            trigger.update_trail(price);
            if trigger.should_fire(price) {
                fired.push(trigger.order);
            }
        }
        fired.sort();
        fired
            .into_iter()
            .filter_map(|id| self.triggers.remove(&id))
            .collect()
    }
}
