//! Order records and the enums that classify them.

use super::ids::{ClientOrderId, OrderId, ParticipantId, Symbol};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The side of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Buy side (bids).
    Buy,
    /// Sell side (asks).
    Sell,
}

impl Side {
    /// Returns the opposite side.
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => f.write_str("buy"),
            Side::Sell => f.write_str("sell"),
        }
    }
}

/// Order type. Conditional kinds (`Stop`, `StopLimit`, `TrailingStop`,
/// `TakeProfit`) are held off the book until their trigger fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    /// Execute immediately against available liquidity.
    Market,
    /// Execute up to the limit price, rest any remainder.
    Limit,
    /// Converts to a market order when the trigger price is reached.
    Stop,
    /// Converts to a limit order when the trigger price is reached.
    StopLimit,
    /// Stop whose trigger follows the market by a fixed or percentage trail.
    TrailingStop,
    /// Converts to a market order when the target price is reached.
    TakeProfit,
    /// Shows only `display_quantity` on the book, replenishing from a
    /// hidden pool as slices fill.
    Iceberg,
    /// Must rest as maker; rejected if any part would cross.
    PostOnly,
}

impl OrderKind {
    /// Returns `true` for kinds that wait in the advanced-order registry
    /// rather than going straight to the book.
    pub fn is_triggered(self) -> bool {
        matches!(
            self,
            OrderKind::Stop | OrderKind::StopLimit | OrderKind::TrailingStop | OrderKind::TakeProfit
        )
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderKind::Market => "market",
            OrderKind::Limit => "limit",
            OrderKind::Stop => "stop",
            OrderKind::StopLimit => "stop_limit",
            OrderKind::TrailingStop => "trailing_stop",
            OrderKind::TakeProfit => "take_profit",
            OrderKind::Iceberg => "iceberg",
            OrderKind::PostOnly => "post_only",
        };
        f.write_str(s)
    }
}

/// How long an order remains active before it executes or expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    /// Good till cancelled.
    Gtc,
    /// Immediate or cancel: any unfilled remainder is cancelled.
    Ioc,
    /// Fill or kill: rejected unless the full quantity is fillable.
    Fok,
    /// Valid until the session close sweep.
    Day,
    /// Good till date: valid until the given millisecond timestamp.
    Gtd(u64),
}

impl Default for TimeInForce {
    fn default() -> Self {
        TimeInForce::Gtc
    }
}

impl TimeInForce {
    /// Returns `true` if the order may never rest on the book.
    pub fn is_immediate(self) -> bool {
        matches!(self, TimeInForce::Ioc | TimeInForce::Fok)
    }

    /// Checks expiry against the current time and the session close, if any.
    pub fn is_expired(self, now_ms: u64, session_close_ms: Option<u64>) -> bool {
        match self {
            TimeInForce::Gtd(expiry) => now_ms >= expiry,
            TimeInForce::Day => session_close_ms.is_some_and(|close| now_ms >= close),
            _ => false,
        }
    }
}

/// Trailing distance for a trailing-stop order: a fixed price offset or a
/// percentage expressed in basis points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trail {
    /// Fixed offset in raw quote price units.
    Amount(u128),
    /// Percentage of the water mark, in basis points (100 bps = 1%).
    Bps(u32),
}

/// The lifecycle state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Accepted, not yet filled.
    New,
    /// Waiting in the advanced-order registry for its trigger.
    PendingTrigger,
    /// Some quantity filled, remainder still working.
    PartiallyFilled,
    /// Fully filled. Terminal.
    Filled,
    /// Cancelled by the user or the engine. Terminal.
    Cancelled,
    /// Rejected at ingress. Terminal.
    Rejected,
    /// Expired by time in force. Terminal.
    Expired,
}

impl OrderStatus {
    /// Returns `true` while the order can still transition.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            OrderStatus::New | OrderStatus::PendingTrigger | OrderStatus::PartiallyFilled
        )
    }

    /// Returns `true` for terminal states.
    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }
}

/// An order submission as received from the gateway collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Submitting participant.
    pub participant: ParticipantId,
    /// Trading symbol.
    pub symbol: Symbol,
    /// Buy or sell.
    pub side: Side,
    /// Order type.
    pub kind: OrderKind,
    /// Total quantity in base-asset raw units.
    pub quantity: u128,
    /// Limit price in quote raw units, where applicable.
    #[serde(default)]
    pub limit_price: Option<u128>,
    /// Stop / trigger price, where applicable.
    #[serde(default)]
    pub stop_price: Option<u128>,
    /// Trailing distance for trailing stops.
    #[serde(default)]
    pub trail: Option<Trail>,
    /// Displayed slice size for iceberg orders.
    #[serde(default)]
    pub display_quantity: Option<u128>,
    /// Time in force; defaults to GTC.
    #[serde(default)]
    pub time_in_force: TimeInForce,
    /// Optional client-assigned id, dedup-checked among active orders.
    #[serde(default)]
    pub client_order_id: Option<ClientOrderId>,
    /// Optional OCO sibling: an active order cancelled when this one trades,
    /// and vice versa.
    #[serde(default)]
    pub oco_sibling: Option<OrderId>,
}

impl OrderRequest {
    /// Convenience constructor for a GTC limit order.
    pub fn limit(
        participant: impl Into<ParticipantId>,
        symbol: impl Into<Symbol>,
        side: Side,
        price: u128,
        quantity: u128,
    ) -> Self {
        Self {
            participant: participant.into(),
            symbol: symbol.into(),
            side,
            kind: OrderKind::Limit,
            quantity,
            limit_price: Some(price),
            stop_price: None,
            trail: None,
            display_quantity: None,
            time_in_force: TimeInForce::Gtc,
            client_order_id: None,
            oco_sibling: None,
        }
    }

    /// Convenience constructor for a market order.
    pub fn market(
        participant: impl Into<ParticipantId>,
        symbol: impl Into<Symbol>,
        side: Side,
        quantity: u128,
    ) -> Self {
        Self {
            participant: participant.into(),
            symbol: symbol.into(),
            side,
            kind: OrderKind::Market,
            quantity,
            limit_price: None,
            stop_price: None,
            trail: None,
            display_quantity: None,
            time_in_force: TimeInForce::Ioc,
            client_order_id: None,
            oco_sibling: None,
        }
    }

    /// Sets the time in force.
    pub fn with_tif(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }

    /// Sets the client order id.
    pub fn with_client_id(mut self, id: impl Into<ClientOrderId>) -> Self {
        self.client_order_id = Some(id.into());
        self
    }
}

/// The full lifecycle record of an accepted order, owned by its symbol
/// worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Engine-assigned id.
    pub id: OrderId,
    /// Client-assigned id, if any.
    pub client_order_id: Option<ClientOrderId>,
    /// Owning participant.
    pub participant: ParticipantId,
    /// Trading symbol.
    pub symbol: Symbol,
    /// Buy or sell.
    pub side: Side,
    /// Order type.
    pub kind: OrderKind,
    /// Time in force.
    pub time_in_force: TimeInForce,
    /// Limit price, where applicable.
    pub limit_price: Option<u128>,
    /// Stop / trigger price, where applicable.
    pub stop_price: Option<u128>,
    /// Trailing distance, where applicable.
    pub trail: Option<Trail>,
    /// Total quantity in base raw units.
    pub quantity: u128,
    /// Displayed slice size for icebergs.
    pub display_quantity: Option<u128>,
    /// Quantity filled so far.
    pub filled: u128,
    /// Current status.
    pub status: OrderStatus,
    /// Arrival sequence, strictly increasing within the symbol.
    pub sequence: u64,
    /// Parent order for iceberg slices.
    pub parent: Option<OrderId>,
    /// Linked OCO sibling, if any.
    pub oco_sibling: Option<OrderId>,
    /// Submission timestamp in milliseconds.
    pub created_at: u64,
}

impl Order {
    /// Quantity not yet filled.
    pub fn remaining(&self) -> u128 {
        self.quantity - self.filled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }

    #[test]
    fn test_triggered_kinds() {
        assert!(OrderKind::Stop.is_triggered());
        assert!(OrderKind::TrailingStop.is_triggered());
        assert!(OrderKind::TakeProfit.is_triggered());
        assert!(!OrderKind::Limit.is_triggered());
        assert!(!OrderKind::Iceberg.is_triggered());
    }

    #[test]
    fn test_tif_immediate() {
        assert!(TimeInForce::Ioc.is_immediate());
        assert!(TimeInForce::Fok.is_immediate());
        assert!(!TimeInForce::Gtc.is_immediate());
    }

    #[test]
    fn test_tif_expiry() {
        assert!(TimeInForce::Gtd(100).is_expired(100, None));
        assert!(!TimeInForce::Gtd(100).is_expired(99, None));
        assert!(TimeInForce::Day.is_expired(50, Some(40)));
        assert!(!TimeInForce::Day.is_expired(50, None));
        assert!(!TimeInForce::Gtc.is_expired(u64::MAX, Some(0)));
    }

    #[test]
    fn test_status_transitions() {
        assert!(OrderStatus::New.is_active());
        assert!(OrderStatus::PendingTrigger.is_active());
        assert!(OrderStatus::PartiallyFilled.is_active());
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(OrderStatus::Expired.is_terminal());
    }

    #[test]
    fn test_request_builders() {
        let req = OrderRequest::limit("alice", "DEC/USD", Side::Buy, 10_000, 500)
            .with_tif(TimeInForce::Day)
            .with_client_id("c-1");
        assert_eq!(req.kind, OrderKind::Limit);
        assert_eq!(req.limit_price, Some(10_000));
        assert_eq!(req.time_in_force, TimeInForce::Day);
        assert_eq!(req.client_order_id, Some(ClientOrderId::new("c-1")));

        let m = OrderRequest::market("bob", "DEC/USD", Side::Sell, 10);
        assert_eq!(m.kind, OrderKind::Market);
        assert_eq!(m.time_in_force, TimeInForce::Ioc);
    }
}
