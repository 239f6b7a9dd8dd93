//! Journal record types.

use crate::engine::RejectReason;
use crate::types::{OrderId, OrderRequest, ParticipantId, Symbol, Trade};
use serde::{Deserialize, Serialize};

/// One journaled state transition.
///
/// `sequence` is strictly increasing per symbol and matches the order in
/// which transitions occurred on that symbol's worker. Cross-symbol
/// ordering is whatever the sink observes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineEvent {
    /// Per-symbol event sequence.
    pub sequence: u64,
    /// The symbol the event belongs to.
    pub symbol: Symbol,
    /// The order the transition applies to. Ids are assigned only to
    /// accepted submissions; a rejection of a request that never became
    /// an order carries `OrderId(0)`.
    pub order: OrderId,
    /// The order's owner.
    pub participant: ParticipantId,
    /// Wall-clock timestamp in milliseconds.
    pub timestamp: u64,
    /// The transition and its payload.
    pub kind: EventKind,
}

/// The transition kinds, one per order state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The order passed ingress. Carries the full request so the journal
    /// alone suffices to rebuild engine state.
    Accepted {
        /// The submission as received.
        request: OrderRequest,
    },
    /// The order was refused at ingress; no state outside the lifecycle
    /// manager changed.
    Rejected {
        /// Why.
        reason: RejectReason,
    },
    /// A trade executed. Emitted once per match, on the taker's event
    /// stream; the record carries both sides.
    Trade {
        /// The execution.
        trade: Trade,
    },
    /// The order was partially filled and keeps working.
    PartialFill {
        /// Quantity filled so far.
        filled: u128,
        /// Quantity still working.
        remaining: u128,
    },
    /// The order is fully filled.
    Filled,
    /// The order was cancelled. `by_user` distinguishes an explicit cancel
    /// request from engine-driven cancellation (IOC remainder, self-match,
    /// OCO sibling); only user cancels are re-applied during replay.
    Cancelled {
        /// Whether a participant requested the cancel.
        by_user: bool,
    },
    /// The order's quantity was reduced in place, preserving time
    /// priority. Journaled so replay reproduces the book exactly; price
    /// changes are journaled as a cancel plus a fresh acceptance instead.
    Reduced {
        /// The new total quantity.
        new_quantity: u128,
    },
    /// The order expired by time in force.
    Expired,
    /// A conditional order's trigger fired; the re-submission follows.
    Triggered {
        /// The price that satisfied the trigger condition.
        trigger_price: u128,
    },
}

impl EventKind {
    /// Short tag for logs and metrics.
    pub fn tag(&self) -> &'static str {
        match self {
            EventKind::Accepted { .. } => "ACCEPTED",
            EventKind::Rejected { .. } => "REJECTED",
            EventKind::Trade { .. } => "TRADE",
            EventKind::PartialFill { .. } => "PARTIAL_FILL",
            EventKind::Filled => "FILLED",
            EventKind::Cancelled { .. } => "CANCELLED",
            EventKind::Reduced { .. } => "REDUCED",
            EventKind::Expired => "EXPIRED",
            EventKind::Triggered { .. } => "TRIGGERED",
        }
    }
}
