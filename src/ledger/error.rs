//! Ledger error types.

use crate::types::{AssetId, ParticipantId};
use std::fmt;

/// Errors that can occur within the [`crate::ledger::Ledger`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LedgerError {
    /// The operation requires more available balance than the row holds.
    InsufficientAvailable {
        /// The participant whose row was checked.
        participant: ParticipantId,
        /// The asset.
        asset: AssetId,
        /// Quantity requested.
        requested: u128,
        /// Quantity actually available.
        available: u128,
    },

    /// The operation requires more locked balance than the row holds.
    InsufficientLocked {
        /// The participant whose row was checked.
        participant: ParticipantId,
        /// The asset.
        asset: AssetId,
        /// Quantity requested.
        requested: u128,
        /// Quantity actually locked.
        locked: u128,
    },

    /// The quantity argument was zero; all ledger operations move a
    /// strictly positive quantity.
    ZeroQuantity,

    /// A credit would overflow the balance field.
    BalanceOverflow {
        /// The participant whose row would overflow.
        participant: ParticipantId,
        /// The asset.
        asset: AssetId,
    },

    /// A row mutex was poisoned by a panicking thread.
    Poisoned,
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::InsufficientAvailable {
                participant,
                asset,
                requested,
                available,
            } => write!(
                f,
                "insufficient available balance: {participant}/{asset} has {available}, needs {requested}"
            ),
            LedgerError::InsufficientLocked {
                participant,
                asset,
                requested,
                locked,
            } => write!(
                f,
                "insufficient locked balance: {participant}/{asset} has {locked}, needs {requested}"
            ),
            LedgerError::ZeroQuantity => write!(f, "ledger operations require a positive quantity"),
            LedgerError::BalanceOverflow { participant, asset } => {
                write!(f, "balance overflow on {participant}/{asset}")
            }
            LedgerError::Poisoned => write!(f, "ledger row mutex poisoned"),
        }
    }
}

impl std::error::Error for LedgerError {}
