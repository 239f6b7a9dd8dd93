//! Executed trade records.

use super::ids::{OrderId, ParticipantId, Symbol};
use super::order::Side;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An executed trade. Immutable once created.
///
/// The price is always the resting (maker) order's price; an aggressive
/// taker receives price improvement rather than paying through its limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Unique trade id.
    pub id: Uuid,
    /// Trading symbol.
    pub symbol: Symbol,
    /// Per-symbol sequence number at execution.
    pub sequence: u64,
    /// The incoming (aggressor) order.
    pub taker_order: OrderId,
    /// The resting order consumed.
    pub maker_order: OrderId,
    /// Participant behind the taker order.
    pub taker: ParticipantId,
    /// Participant behind the maker order.
    pub maker: ParticipantId,
    /// Side of the taker order.
    pub taker_side: Side,
    /// Execution price in quote raw units (the maker's resting price).
    pub price: u128,
    /// Executed quantity in base raw units.
    pub quantity: u128,
    /// Quote notional moved by settlement for this trade.
    pub notional: u128,
    /// Execution timestamp in milliseconds.
    pub timestamp: u64,
}

impl Trade {
    /// The participant that bought the base asset.
    pub fn buyer(&self) -> &ParticipantId {
        match self.taker_side {
            Side::Buy => &self.taker,
            Side::Sell => &self.maker,
        }
    }

    /// The participant that sold the base asset.
    pub fn seller(&self) -> &ParticipantId {
        match self.taker_side {
            Side::Buy => &self.maker,
            Side::Sell => &self.taker,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_trade(taker_side: Side) -> Trade {
        Trade {
            id: Uuid::nil(),
            symbol: Symbol::from("DEC/USD"),
            sequence: 1,
            taker_order: OrderId(2),
            maker_order: OrderId(1),
            taker: ParticipantId::from("taker"),
            maker: ParticipantId::from("maker"),
            taker_side,
            price: 10_000,
            quantity: 500_000_000,
            notional: 50_000,
            timestamp: 0,
        }
    }

    #[test]
    fn test_buyer_seller_for_taker_buy() {
        let t = make_trade(Side::Buy);
        assert_eq!(t.buyer().as_str(), "taker");
        assert_eq!(t.seller().as_str(), "maker");
    }

    #[test]
    fn test_buyer_seller_for_taker_sell() {
        let t = make_trade(Side::Sell);
        assert_eq!(t.buyer().as_str(), "maker");
        assert_eq!(t.seller().as_str(), "taker");
    }
}
