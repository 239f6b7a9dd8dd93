//! Read-only views over the book, recomputed on demand.

use serde::Serialize;

/// One aggregated price level in a depth view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelView {
    /// The level's price.
    pub price: u128,
    /// Aggregate resting quantity at the price.
    pub quantity: u128,
    /// Number of resting orders at the price.
    pub orders: usize,
}

/// A point-in-time depth snapshot: the top `n` levels of each side, best
/// first, plus the last trade price.
#[derive(Debug, Clone, Serialize)]
pub struct DepthSnapshot {
    /// Bid levels, highest price first.
    pub bids: Vec<LevelView>,
    /// Ask levels, lowest price first.
    pub asks: Vec<LevelView>,
    /// The last price at which the symbol traded, if any.
    pub last_trade_price: Option<u128>,
}
