//! Rebuilding engine state from the event journal.
//!
//! The journal plus the deposit/withdrawal history is sufficient to
//! reconstruct books, orders, balances and the advanced registry: replay
//! re-submits every accepted request and re-applies user cancels,
//! reductions and expiries in journal order, letting matching, settlement
//! and triggers re-derive everything else deterministically.

use super::engine::{Engine, ModifyRequest};
use crate::journal::{EngineEvent, EventJournal, EventKind};
use crate::refdata::{EngineConfig, RefdataError};
use crate::types::{AssetId, ParticipantId};
use std::sync::Arc;
use tracing::info;

/// One external balance movement, in the order the bridge applied it.
#[derive(Debug, Clone)]
pub enum BridgeOp {
    /// A deposit of `2` raw units of asset `1` to participant `0`.
    Deposit(ParticipantId, AssetId, u128),
    /// A withdrawal.
    Withdraw(ParticipantId, AssetId, u128),
}

/// Replays a journal into a fresh engine built from `config`.
///
/// `bridge_ops` are the deposits and withdrawals the bridge journaled,
/// applied before the order events. Funds only need to exist before the
/// submissions that reserve them, so applying all bridge operations first
/// is sufficient; for a history whose withdrawals depend on intervening
/// trades, replay in segments.
///
/// Derived events (trades, fills, engine-driven cancels, triggers) are
/// skipped: re-running the submissions reproduces them.
pub fn rebuild(
    config: &EngineConfig,
    bridge_ops: &[BridgeOp],
    events: &[EngineEvent],
    journal: Arc<dyn EventJournal>,
) -> Result<Engine, RefdataError> {
    let engine = Engine::new(config, journal)?;
    for op in bridge_ops {
        match op {
            BridgeOp::Deposit(participant, asset, quantity) => {
                let _ = engine.deposit(participant, asset, *quantity);
            }
            BridgeOp::Withdraw(participant, asset, quantity) => {
                let _ = engine.withdraw(participant, asset, *quantity);
            }
        }
    }

    let mut applied = 0usize;
    for event in events {
        match &event.kind {
            EventKind::Accepted { request } => {
                let _ = engine.submit(request.clone());
                applied += 1;
            }
            EventKind::Cancelled { by_user: true } => {
                let _ = engine.cancel(&event.participant, event.order);
                applied += 1;
            }
            EventKind::Reduced { new_quantity } => {
                let _ = engine.modify(
                    &event.participant,
                    event.order,
                    ModifyRequest { quantity: Some(*new_quantity), limit_price: None },
                );
                applied += 1;
            }
            EventKind::Expired => {
                let _ = engine.expire_order(event.order);
                applied += 1;
            }
            // everything else re-derives from the submissions above;
            // rejected submissions consumed no order id and left no state
            _ => {}
        }
    }
    info!("replay applied {applied} journaled commands");
    Ok(engine)
}
