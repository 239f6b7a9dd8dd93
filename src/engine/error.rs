//! The three error taxonomies of the engine.
//!
//! Client-caused rejections, transient retry hints, and fatal invariant
//! violations are distinct types and never collapse into one another. No
//! error crosses a component boundary unclassified.

use crate::types::Symbol;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Client-caused rejection reasons. Recoverable by the submitter; the
/// engine emits one `REJECTED` event and changes no state outside the
/// lifecycle manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum RejectReason {
    /// The symbol is not in the reference-data catalog.
    UnknownSymbol,
    /// A price is not a multiple of the symbol's tick size.
    BadTick,
    /// The quantity is not a multiple of the symbol's lot size.
    BadLot,
    /// The quantity is below the minimum or above the maximum.
    QtyOutOfRange,
    /// The limit price falls outside the band around the last trade.
    PriceOutOfBand,
    /// A post-only order would have crossed the spread.
    PostOnlyWouldCross,
    /// A fill-or-kill order could not be filled in full.
    FokUnfillable,
    /// Self-match prevention cancelled the incoming order before any fill.
    SelfMatchRejected,
    /// The balance reservation failed.
    InsufficientAvailable,
    /// The client order id is already in use by an active order.
    DuplicateClientId,
    /// No such order.
    UnknownOrder,
    /// The order belongs to a different participant.
    Unauthorized,
    /// The participant exceeded its order rate or daily count.
    RateLimited,
    /// The modification is not allowed (e.g. a quantity increase).
    InvalidModify,
    /// The order's notional exceeds the participant's per-order cap.
    NotionalCapExceeded,
    /// The fill would breach the participant's position cap.
    PositionCapExceeded,
    /// A required field is missing or inconsistent for the order kind.
    MalformedRequest,
    /// The engine is halted; no submissions are accepted.
    EngineHalted,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            RejectReason::UnknownSymbol => "UNKNOWN_SYMBOL",
            RejectReason::BadTick => "BAD_TICK",
            RejectReason::BadLot => "BAD_LOT",
            RejectReason::QtyOutOfRange => "QTY_OUT_OF_RANGE",
            RejectReason::PriceOutOfBand => "PRICE_OUT_OF_BAND",
            RejectReason::PostOnlyWouldCross => "POST_ONLY_WOULD_CROSS",
            RejectReason::FokUnfillable => "FOK_UNFILLABLE",
            RejectReason::SelfMatchRejected => "SELF_MATCH_REJECTED",
            RejectReason::InsufficientAvailable => "INSUFFICIENT_AVAILABLE",
            RejectReason::DuplicateClientId => "DUPLICATE_CLIENT_ID",
            RejectReason::UnknownOrder => "UNKNOWN_ORDER",
            RejectReason::Unauthorized => "UNAUTHORIZED",
            RejectReason::RateLimited => "RATE_LIMITED",
            RejectReason::InvalidModify => "INVALID_MODIFY",
            RejectReason::NotionalCapExceeded => "NOTIONAL_CAP_EXCEEDED",
            RejectReason::PositionCapExceeded => "POSITION_CAP_EXCEEDED",
            RejectReason::MalformedRequest => "MALFORMED_REQUEST",
            RejectReason::EngineHalted => "ENGINE_HALTED",
        };
        f.write_str(tag)
    }
}

/// Transient conditions surfaced to the gateway as typed retry hints. No
/// journal event is emitted; no accepted order is ever dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransientError {
    /// The journal sink signalled backpressure at ingress.
    JournalBackpressure,
}

impl fmt::Display for TransientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransientError::JournalBackpressure => write!(f, "journal backpressure, retry"),
        }
    }
}

/// Fatal invariant violations. The engine halts, refuses all further
/// submissions, and waits for operator intervention.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FatalError {
    /// A settlement failed although both sides locked before matching.
    SettleFailedAfterLock {
        /// The underlying ledger failure.
        detail: String,
    },
    /// The book violated its own invariants (e.g. crossed after matching).
    BookInconsistency {
        /// The symbol whose book is inconsistent.
        symbol: Symbol,
    },
    /// The periodic audit found a per-asset conservation mismatch.
    LedgerConservationViolation {
        /// Description of the mismatch.
        detail: String,
    },
    /// The journal sink failed mid-flight and events may be lost.
    JournalFailed {
        /// The underlying sink failure.
        detail: String,
    },
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalError::SettleFailedAfterLock { detail } => {
                write!(f, "settlement failed after lock: {detail}")
            }
            FatalError::BookInconsistency { symbol } => {
                write!(f, "book inconsistency on {symbol}")
            }
            FatalError::LedgerConservationViolation { detail } => {
                write!(f, "ledger conservation violation: {detail}")
            }
            FatalError::JournalFailed { detail } => {
                write!(f, "journal sink failed: {detail}")
            }
        }
    }
}

/// The error type of every engine entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EngineError {
    /// Client-caused rejection; a `REJECTED` event was emitted where an
    /// order context exists.
    Rejected(RejectReason),
    /// Retry later; nothing changed and nothing was journaled.
    Transient(TransientError),
    /// A fatal invariant violation occurred during this call and the
    /// engine is now halted.
    Fatal(FatalError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Rejected(reason) => write!(f, "rejected: {reason}"),
            EngineError::Transient(transient) => write!(f, "transient: {transient}"),
            EngineError::Fatal(fatal) => write!(f, "fatal: {fatal}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<RejectReason> for EngineError {
    fn from(reason: RejectReason) -> Self {
        EngineError::Rejected(reason)
    }
}
