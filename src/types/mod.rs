//! Core domain types: identifiers, order and trade records, fixed-point math.

mod fixed;
mod ids;
mod order;
mod trade;

pub use fixed::{Scale, checked_notional, pow10};
pub use ids::{AssetId, ClientOrderId, OrderId, ParticipantId, Symbol};
pub use order::{Order, OrderKind, OrderRequest, OrderStatus, Side, TimeInForce, Trail};
pub use trade::Trade;
