//! Balance rows and the atomic operations over them.

use super::error::LedgerError;
use crate::types::{AssetId, ParticipantId};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::trace;

/// Key of one balance row.
pub type AccountKey = (ParticipantId, AssetId);

/// One (participant, asset) balance row. Both fields are non-negative by
/// construction; `available + locked` changes only via deposit/withdraw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Balance {
    /// Quantity free to spend or reserve.
    pub available: u128,
    /// Quantity reserved for working orders.
    pub locked: u128,
}

impl Balance {
    /// `available + locked`.
    pub fn total(&self) -> u128 {
        self.available + self.locked
    }
}

/// The balance store. Rows live in a concurrent map; each row carries its
/// own mutex, so operations on the same (participant, asset) pair are
/// totally ordered while disjoint rows proceed in parallel.
///
/// Multi-row operations (`settle`) acquire their rows in ascending
/// [`AccountKey`] order, which prevents deadlock between concurrent
/// settlements that share participants.
#[derive(Debug, Default)]
pub struct Ledger {
    rows: DashMap<AccountKey, Arc<Mutex<Balance>>>,
}

impl Ledger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self { rows: DashMap::new() }
    }

    fn row(&self, participant: &ParticipantId, asset: &AssetId) -> Arc<Mutex<Balance>> {
        if let Some(row) = self.rows.get(&(participant.clone(), asset.clone())) {
            return row.clone();
        }
        self.rows
            .entry((participant.clone(), asset.clone()))
            .or_default()
            .clone()
    }

    fn guard(row: &Mutex<Balance>) -> Result<MutexGuard<'_, Balance>, LedgerError> {
        row.lock().map_err(|_| LedgerError::Poisoned)
    }

    /// Credits `quantity` to the participant's available balance.
    pub fn deposit(
        &self,
        participant: &ParticipantId,
        asset: &AssetId,
        quantity: u128,
    ) -> Result<(), LedgerError> {
        if quantity == 0 {
            return Err(LedgerError::ZeroQuantity);
        }
        let row = self.row(participant, asset);
        let mut balance = Self::guard(&row)?;
        balance.available =
            balance
                .available
                .checked_add(quantity)
                .ok_or_else(|| LedgerError::BalanceOverflow {
                    participant: participant.clone(),
                    asset: asset.clone(),
                })?;
        trace!("deposit {} {} -> {}", participant, quantity, asset);
        Ok(())
    }

    /// Debits `quantity` from the participant's available balance.
    pub fn withdraw(
        &self,
        participant: &ParticipantId,
        asset: &AssetId,
        quantity: u128,
    ) -> Result<(), LedgerError> {
        if quantity == 0 {
            return Err(LedgerError::ZeroQuantity);
        }
        let row = self.row(participant, asset);
        let mut balance = Self::guard(&row)?;
        if balance.available < quantity {
            return Err(LedgerError::InsufficientAvailable {
                participant: participant.clone(),
                asset: asset.clone(),
                requested: quantity,
                available: balance.available,
            });
        }
        balance.available -= quantity;
        trace!("withdraw {} {} <- {}", participant, quantity, asset);
        Ok(())
    }

    /// Moves `quantity` from available to locked.
    pub fn lock(
        &self,
        participant: &ParticipantId,
        asset: &AssetId,
        quantity: u128,
    ) -> Result<(), LedgerError> {
        if quantity == 0 {
            return Err(LedgerError::ZeroQuantity);
        }
        let row = self.row(participant, asset);
        let mut balance = Self::guard(&row)?;
        if balance.available < quantity {
            return Err(LedgerError::InsufficientAvailable {
                participant: participant.clone(),
                asset: asset.clone(),
                requested: quantity,
                available: balance.available,
            });
        }
        balance.available -= quantity;
        balance.locked += quantity;
        Ok(())
    }

    /// Moves `quantity` from locked back to available.
    pub fn unlock(
        &self,
        participant: &ParticipantId,
        asset: &AssetId,
        quantity: u128,
    ) -> Result<(), LedgerError> {
        if quantity == 0 {
            return Err(LedgerError::ZeroQuantity);
        }
        let row = self.row(participant, asset);
        let mut balance = Self::guard(&row)?;
        if balance.locked < quantity {
            return Err(LedgerError::InsufficientLocked {
                participant: participant.clone(),
                asset: asset.clone(),
                requested: quantity,
                locked: balance.locked,
            });
        }
        balance.locked -= quantity;
        balance.available += quantity;
        Ok(())
    }

    /// Settles one trade atomically:
    ///
    /// - seller's locked base decreases by `base_qty`,
    /// - buyer's available base increases by `base_qty`,
    /// - buyer's locked quote decreases by `quote_qty`,
    /// - seller's available quote increases by `quote_qty`.
    ///
    /// Either all four deltas apply or none. Both debit legs are verified
    /// before any credit is written, under all row locks, acquired in
    /// ascending key order.
    pub fn settle(
        &self,
        buyer: &ParticipantId,
        seller: &ParticipantId,
        base: &AssetId,
        quote: &AssetId,
        base_qty: u128,
        quote_qty: u128,
    ) -> Result<(), LedgerError> {
        if base_qty == 0 {
            return Err(LedgerError::ZeroQuantity);
        }

        let mut keys: Vec<AccountKey> = vec![
            (seller.clone(), base.clone()),
            (buyer.clone(), base.clone()),
            (buyer.clone(), quote.clone()),
            (seller.clone(), quote.clone()),
        ];
        keys.sort();
        keys.dedup();

        let rows: Vec<(AccountKey, Arc<Mutex<Balance>>)> = keys
            .iter()
            .map(|key| (key.clone(), self.row(&key.0, &key.1)))
            .collect();
        let mut guards: Vec<MutexGuard<'_, Balance>> = Vec::with_capacity(rows.len());
        for (_, row) in &rows {
            guards.push(row.lock().map_err(|_| LedgerError::Poisoned)?);
        }

        let index = |participant: &ParticipantId, asset: &AssetId| {
            keys.binary_search_by(|key| {
                key.0.cmp(participant).then_with(|| key.1.cmp(asset))
            })
            .expect("settle key present")
        };

        // Verify both debit legs before touching anything.
        let seller_base = &guards[index(seller, base)];
        if seller_base.locked < base_qty {
            return Err(LedgerError::InsufficientLocked {
                participant: seller.clone(),
                asset: base.clone(),
                requested: base_qty,
                locked: seller_base.locked,
            });
        }
        let buyer_quote = &guards[index(buyer, quote)];
        if quote_qty > 0 && buyer_quote.locked < quote_qty {
            return Err(LedgerError::InsufficientLocked {
                participant: buyer.clone(),
                asset: quote.clone(),
                requested: quote_qty,
                locked: buyer_quote.locked,
            });
        }

        guards[index(seller, base)].locked -= base_qty;
        guards[index(buyer, base)].available += base_qty;
        if quote_qty > 0 {
            guards[index(buyer, quote)].locked -= quote_qty;
            guards[index(seller, quote)].available += quote_qty;
        }

        trace!(
            "settle {} <-> {}: {} {} for {} {}",
            buyer, seller, base_qty, base, quote_qty, quote
        );
        Ok(())
    }

    /// Reads a row. Unknown rows read as zero.
    pub fn get(&self, participant: &ParticipantId, asset: &AssetId) -> Balance {
        self.rows
            .get(&(participant.clone(), asset.clone()))
            .and_then(|row| row.lock().ok().map(|b| *b))
            .unwrap_or_default()
    }

    /// Sums `available + locked` per asset across all participants. Used by
    /// the periodic conservation audit.
    pub fn asset_totals(&self) -> BTreeMap<AssetId, u128> {
        let mut totals = BTreeMap::new();
        for entry in self.rows.iter() {
            let (_, asset) = entry.key();
            if let Ok(balance) = entry.value().lock() {
                *totals.entry(asset.clone()).or_insert(0) += balance.total();
            }
        }
        totals
    }

    /// A deterministic snapshot of every non-empty row, for audits and
    /// replay comparison.
    pub fn snapshot(&self) -> BTreeMap<AccountKey, Balance> {
        self.rows
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .lock()
                    .ok()
                    .map(|balance| (entry.key().clone(), *balance))
            })
            .filter(|(_, balance)| balance.total() > 0)
            .collect()
    }
}
