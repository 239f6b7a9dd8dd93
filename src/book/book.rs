//! The order book proper: two sorted sides, the price-time matching walk,
//! cancellation and modification.

use super::level::{PriceLevel, RestingOrder};
use super::view::{DepthSnapshot, LevelView};
use crate::refdata::SelfMatchPolicy;
use crate::types::{OrderId, ParticipantId, Side, Symbol};
use std::collections::{BTreeMap, HashMap};
use tracing::trace;

/// The matching-relevant slice of an incoming order. The lifecycle manager
/// keeps the full record; the book only needs identity, side, size and an
/// optional price limit (`None` for market orders).
#[derive(Debug, Clone)]
pub struct IncomingOrder {
    /// Order id.
    pub id: OrderId,
    /// Submitting participant, checked against resting owners for SMP.
    pub participant: ParticipantId,
    /// Buy or sell.
    pub side: Side,
    /// Quantity to match, in base raw units.
    pub quantity: u128,
    /// Price limit; `None` makes the order crossable at any price.
    pub limit_price: Option<u128>,
    /// Arrival sequence assigned at ingress.
    pub sequence: u64,
}

/// One execution against a resting order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fill {
    /// The resting order consumed.
    pub maker_order: OrderId,
    /// Its owner.
    pub maker_participant: ParticipantId,
    /// The trade price: always the resting order's price.
    pub price: u128,
    /// Executed quantity.
    pub quantity: u128,
    /// The resting order's remaining quantity after this fill.
    pub maker_remaining: u128,
}

/// What self-match prevention did during one matching walk.
#[derive(Debug, Clone, Default)]
pub struct SmpReport {
    /// Resting orders removed from the book without trading.
    pub resting_cancelled: Vec<RestingOrder>,
    /// Resting orders decremented in place: (order id, quantity removed).
    pub resting_reduced: Vec<(OrderId, u128)>,
    /// Incoming quantity killed without trading.
    pub incoming_cancelled: u128,
}

impl SmpReport {
    /// Whether any self-match action was taken.
    pub fn is_empty(&self) -> bool {
        self.resting_cancelled.is_empty()
            && self.resting_reduced.is_empty()
            && self.incoming_cancelled == 0
    }
}

/// The result of [`OrderBook::add`]: fills in execution order, the unfilled
/// remainder, SMP actions, and whether the remainder was inserted.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    /// The incoming order.
    pub taker_order: OrderId,
    /// Executions in strict price-time order of the resting orders consumed.
    pub fills: Vec<Fill>,
    /// Quantity left unfilled when matching stopped.
    pub remaining: u128,
    /// Self-match prevention actions, if any.
    pub smp: SmpReport,
    /// Whether the remainder now rests on the book.
    pub rested: bool,
}

impl MatchOutcome {
    /// Total quantity executed.
    pub fn executed_quantity(&self) -> u128 {
        self.fills.iter().map(|fill| fill.quantity).sum()
    }

    /// Whether the incoming order was fully filled.
    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }
}

/// A price-time priority book for one symbol.
///
/// Bids and asks are `BTreeMap`s keyed by price; asks iterate forward
/// (lowest first) and bids in reverse (highest first). An id index maps
/// every resting order to its (side, price) for O(log P) cancellation.
#[derive(Debug)]
pub struct OrderBook {
    symbol: Symbol,
    bids: BTreeMap<u128, PriceLevel>,
    asks: BTreeMap<u128, PriceLevel>,
    locations: HashMap<OrderId, (Side, u128)>,
    smp_policy: SelfMatchPolicy,
    last_trade_price: Option<u128>,
}

impl OrderBook {
    /// Creates an empty book for `symbol` with the given SMP policy.
    pub fn new(symbol: Symbol, smp_policy: SelfMatchPolicy) -> Self {
        Self {
            symbol,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            locations: HashMap::new(),
            smp_policy,
            last_trade_price: None,
        }
    }

    /// The symbol this book trades.
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Best (highest) bid price.
    pub fn best_bid(&self) -> Option<u128> {
        self.bids.keys().next_back().copied()
    }

    /// Best (lowest) ask price.
    pub fn best_ask(&self) -> Option<u128> {
        self.asks.keys().next().copied()
    }

    /// The last price at which this book traded.
    pub fn last_trade_price(&self) -> Option<u128> {
        self.last_trade_price
    }

    /// Number of resting orders across both sides.
    pub fn order_count(&self) -> usize {
        self.locations.len()
    }

    /// Whether the given order currently rests on the book.
    pub fn contains(&self, id: OrderId) -> bool {
        self.locations.contains_key(&id)
    }

    /// Whether a new order at `price` on `side` would cross the opposite
    /// best. Used for the post-only check.
    pub fn would_cross(&self, side: Side, price: u128) -> bool {
        match side {
            Side::Buy => self.best_ask().is_some_and(|ask| price >= ask),
            Side::Sell => self.best_bid().is_some_and(|bid| price <= bid),
        }
    }

    /// How much of `quantity` could execute right now at prices permitted
    /// by `limit` (`None` = any price). Used for the FOK feasibility check;
    /// does not mutate the book.
    ///
    /// Resting orders owned by `exclude` are not counted: self-match
    /// prevention cancels or decrements them during the walk, so their
    /// quantity never fills the incoming order under any policy.
    pub fn crossable_quantity(
        &self,
        side: Side,
        quantity: u128,
        limit: Option<u128>,
        exclude: Option<&ParticipantId>,
    ) -> u128 {
        let mut matched = 0u128;
        for (price, level) in self.opposite_levels(side) {
            if matched >= quantity {
                break;
            }
            if let Some(limit) = limit {
                let crossable = match side {
                    Side::Buy => price <= limit,
                    Side::Sell => price >= limit,
                };
                if !crossable {
                    break;
                }
            }
            let available = match exclude {
                Some(participant) => level
                    .iter()
                    .filter(|order| order.participant != *participant)
                    .map(|order| order.quantity)
                    .sum(),
                None => level.total_quantity(),
            };
            matched = matched.saturating_add(available).min(quantity);
        }
        matched
    }

    /// Whether matching `quantity` at prices permitted by `limit` would
    /// reach one of `participant`'s own resting orders before filling.
    /// Drives the up-front rejection under the cancel-incoming policy.
    pub fn would_self_match(
        &self,
        side: Side,
        quantity: u128,
        limit: Option<u128>,
        participant: &ParticipantId,
    ) -> bool {
        let mut remaining = quantity;
        for (price, level) in self.opposite_levels(side) {
            if remaining == 0 {
                return false;
            }
            if let Some(limit) = limit {
                let crossable = match side {
                    Side::Buy => price <= limit,
                    Side::Sell => price >= limit,
                };
                if !crossable {
                    return false;
                }
            }
            for order in level.iter() {
                if remaining == 0 {
                    return false;
                }
                if order.participant == *participant {
                    return true;
                }
                remaining = remaining.saturating_sub(order.quantity);
            }
        }
        false
    }

    /// The price of the deepest opposite level a sweep of `quantity` would
    /// touch, regardless of limit. Used as the market-order reservation
    /// bound when the symbol has never traded. `None` on an empty side.
    pub fn sweep_bound(&self, side: Side, quantity: u128) -> Option<u128> {
        let mut remaining = quantity;
        let mut worst = None;
        for (price, level) in self.opposite_levels(side) {
            worst = Some(price);
            remaining = remaining.saturating_sub(level.total_quantity());
            if remaining == 0 {
                break;
            }
        }
        worst
    }

    /// The book is crossed when the best bid reaches the best ask. After a
    /// completed [`Self::add`] this must never hold.
    pub fn is_crossed(&self) -> bool {
        matches!((self.best_bid(), self.best_ask()), (Some(bid), Some(ask)) if bid >= ask)
    }

    fn opposite_levels(&self, side: Side) -> Box<dyn Iterator<Item = (u128, &PriceLevel)> + '_> {
        match side {
            Side::Buy => Box::new(self.asks.iter().map(|(p, l)| (*p, l))),
            Side::Sell => Box::new(self.bids.iter().rev().map(|(p, l)| (*p, l))),
        }
    }

    fn best_opposite(&self, side: Side) -> Option<u128> {
        match side {
            Side::Buy => self.best_ask(),
            Side::Sell => self.best_bid(),
        }
    }

    /// Matches the incoming order against the opposite side until crossable
    /// liquidity or the order is exhausted, then inserts any remainder when
    /// `rest_remainder` is set (and no SMP action killed the order).
    ///
    /// Fills are returned in execution order; the trade price is always the
    /// resting order's price.
    pub fn add(&mut self, incoming: IncomingOrder, rest_remainder: bool) -> MatchOutcome {
        let mut fills = Vec::new();
        let mut smp = SmpReport::default();
        let mut remaining = incoming.quantity;
        let mut stopped = false;

        trace!(
            "add {} {} {} x {} @ {:?}",
            self.symbol, incoming.id, incoming.side, incoming.quantity, incoming.limit_price
        );

        while remaining > 0 && !stopped {
            let Some(best) = self.best_opposite(incoming.side) else {
                break;
            };
            if let Some(limit) = incoming.limit_price {
                let crossable = match incoming.side {
                    Side::Buy => best <= limit,
                    Side::Sell => best >= limit,
                };
                if !crossable {
                    break;
                }
            }

            let opposite = match incoming.side {
                Side::Buy => &mut self.asks,
                Side::Sell => &mut self.bids,
            };
            let level = opposite.get_mut(&best).expect("best level exists");

            while remaining > 0 {
                let Some(head) = level.front() else {
                    break;
                };
                let head_id = head.id;
                let head_quantity = head.quantity;
                let self_match = head.participant == incoming.participant;

                if self_match {
                    match self.smp_policy {
                        SelfMatchPolicy::CancelIncoming => {
                            smp.incoming_cancelled += remaining;
                            stopped = true;
                            break;
                        }
                        SelfMatchPolicy::CancelResting => {
                            let cancelled = level.pop_front().expect("head exists");
                            self.locations.remove(&cancelled.id);
                            smp.resting_cancelled.push(cancelled);
                            continue;
                        }
                        SelfMatchPolicy::DecrementAndCancel => {
                            if head_quantity <= remaining {
                                // resting is the smaller order: cancel it,
                                // decrement the incoming
                                let cancelled = level.pop_front().expect("head exists");
                                self.locations.remove(&cancelled.id);
                                smp.resting_cancelled.push(cancelled);
                                smp.incoming_cancelled += head_quantity;
                                remaining -= head_quantity;
                                continue;
                            }
                            // incoming is the smaller order: cancel it,
                            // decrement the resting
                            level.reduce(head_id, head_quantity - remaining);
                            smp.resting_reduced.push((head_id, remaining));
                            smp.incoming_cancelled += remaining;
                            remaining = 0;
                            stopped = true;
                            break;
                        }
                    }
                }

                let fill_quantity = remaining.min(head_quantity);
                let after = level.fill_front(fill_quantity).expect("head exists");
                remaining -= fill_quantity;
                if after.quantity == 0 {
                    self.locations.remove(&head_id);
                }
                fills.push(Fill {
                    maker_order: head_id,
                    maker_participant: after.participant,
                    price: best,
                    quantity: fill_quantity,
                    maker_remaining: after.quantity,
                });
                self.last_trade_price = Some(best);
            }

            if level.is_empty() {
                let opposite = match incoming.side {
                    Side::Buy => &mut self.asks,
                    Side::Sell => &mut self.bids,
                };
                opposite.remove(&best);
            }
        }

        let mut rested = false;
        if remaining > 0 && !stopped && rest_remainder {
            let price = incoming
                .limit_price
                .expect("resting an order requires a limit price");
            let own = match incoming.side {
                Side::Buy => &mut self.bids,
                Side::Sell => &mut self.asks,
            };
            own.entry(price)
                .or_insert_with(|| PriceLevel::new(price))
                .push_back(RestingOrder {
                    id: incoming.id,
                    participant: incoming.participant.clone(),
                    price,
                    quantity: remaining,
                    sequence: incoming.sequence,
                });
            self.locations.insert(incoming.id, (incoming.side, price));
            rested = true;
        }

        debug_assert!(!self.is_crossed(), "book crossed after add");

        MatchOutcome {
            taker_order: incoming.id,
            fills,
            remaining,
            smp,
            rested,
        }
    }

    /// Removes a resting order. Returns `None` when the id is unknown.
    pub fn cancel(&mut self, id: OrderId) -> Option<RestingOrder> {
        let (side, price) = self.locations.remove(&id)?;
        let levels = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        let level = levels.get_mut(&price)?;
        let removed = level.remove(id);
        if level.is_empty() {
            levels.remove(&price);
        }
        trace!("cancel {} {}", self.symbol, id);
        removed
    }

    /// Reduces a resting order's quantity in place, preserving its queue
    /// position. Returns the freed quantity, or `None` when the id is
    /// unknown or `new_quantity` is not a strict reduction to a positive
    /// value.
    pub fn reduce_quantity(&mut self, id: OrderId, new_quantity: u128) -> Option<u128> {
        let (side, price) = *self.locations.get(&id)?;
        let levels = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        levels.get_mut(&price)?.reduce(id, new_quantity)
    }

    /// Looks up a resting order by id.
    pub fn get(&self, id: OrderId) -> Option<&RestingOrder> {
        let (side, price) = *self.locations.get(&id)?;
        let levels = match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        };
        levels.get(&price)?.iter().find(|o| o.id == id)
    }

    /// The top `n` levels of each side, best first.
    pub fn depth(&self, n: usize) -> DepthSnapshot {
        let view = |(price, level): (&u128, &PriceLevel)| LevelView {
            price: *price,
            quantity: level.total_quantity(),
            orders: level.order_count(),
        };
        DepthSnapshot {
            bids: self.bids.iter().rev().take(n).map(view).collect(),
            asks: self.asks.iter().take(n).map(view).collect(),
            last_trade_price: self.last_trade_price,
        }
    }

    /// All resting order ids, for sweeps.
    pub fn resting_ids(&self) -> Vec<OrderId> {
        self.locations.keys().copied().collect()
    }
}
