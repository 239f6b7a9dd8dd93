//! The order lifecycle manager.
//!
//! Single synchronous entry points (`submit`, `cancel`, `modify`, `query`)
//! drive the full pipeline: reference-data and risk validation, balance
//! reservation, dispatch to the symbol's book or advanced-order registry,
//! trade settlement, residual unlock, trigger reactions and event emission.
//! Each symbol's state is serialized through its worker mutex; the ledger
//! is the only state shared between workers.

use super::error::{EngineError, FatalError, RejectReason, TransientError};
use super::risk::RiskTracker;
use super::worker::{Reservation, SymbolWorker};
use crate::book::{DepthSnapshot, Fill, IncomingOrder, MatchOutcome};
use crate::journal::{EngineEvent, EventJournal, EventKind};
use crate::ledger::{Balance, Ledger};
use crate::refdata::{EngineConfig, RefdataError, ReferenceData, SelfMatchPolicy, TriggerSource};
use crate::registry::{IcebergState, PendingTrigger};
use crate::types::{
    AssetId, ClientOrderId, Order, OrderId, OrderKind, OrderRequest, OrderStatus, ParticipantId,
    Side, Symbol, TimeInForce, Trade, Trail, checked_notional,
};
use crate::utils::{TradeIdGenerator, current_time_millis};
use crossbeam::atomic::AtomicCell;
use dashmap::DashMap;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

/// A successful submission: the assigned order id, the order's status when
/// the call returned, and every trade produced while it executed
/// (including trades from triggers it set off).
#[derive(Debug, Clone)]
pub struct Accepted {
    /// The engine-assigned order id.
    pub order_id: OrderId,
    /// The order's status at return.
    pub status: OrderStatus,
    /// Trades in execution order.
    pub trades: Vec<Trade>,
}

/// A modification request: quantity decrease, limit price change, or both.
/// Any other change must be expressed as cancel-then-submit.
#[derive(Debug, Clone, Default)]
pub struct ModifyRequest {
    /// New total quantity; must be below the current total and above the
    /// filled quantity.
    pub quantity: Option<u128>,
    /// New limit price; applied as cancel-then-add and loses time priority.
    pub limit_price: Option<u128>,
}

struct ReservationPlan {
    asset: AssetId,
    amount: u128,
    protection: Option<u128>,
}

struct BookSubmission {
    incoming: IncomingOrder,
    rest: bool,
}

/// The engine facade owning all symbol workers.
pub struct Engine {
    refdata: ReferenceData,
    ledger: Arc<Ledger>,
    journal: Arc<dyn EventJournal>,
    workers: DashMap<Symbol, Arc<Mutex<SymbolWorker>>>,
    routes: DashMap<OrderId, Symbol>,
    client_ids: DashMap<(ParticipantId, ClientOrderId), OrderId>,
    risk: RiskTracker,
    tickers: DashMap<Symbol, Arc<AtomicCell<u128>>>,
    trade_ids: TradeIdGenerator,
    next_order_id: AtomicU64,
    session_close: AtomicU64,
    halted: AtomicBool,
    halt_reason: Mutex<Option<FatalError>>,
    audit_baseline: Mutex<BTreeMap<AssetId, u128>>,
}

impl Engine {
    /// Builds an engine from static configuration and a journal sink.
    /// Symbols and assets are fixed for the engine's lifetime.
    pub fn new(
        config: &EngineConfig,
        journal: Arc<dyn EventJournal>,
    ) -> Result<Self, RefdataError> {
        let refdata = ReferenceData::from_config(config)?;
        let workers = DashMap::new();
        let tickers = DashMap::new();
        for info in refdata.symbols() {
            workers.insert(
                info.symbol.clone(),
                Arc::new(Mutex::new(SymbolWorker::new(info.clone()))),
            );
            tickers.insert(info.symbol.clone(), Arc::new(AtomicCell::new(0u128)));
        }
        info!("engine configured with {} symbols", workers.len());

        Ok(Self {
            refdata,
            ledger: Arc::new(Ledger::new()),
            journal,
            workers,
            routes: DashMap::new(),
            client_ids: DashMap::new(),
            risk: RiskTracker::new(
                config.default_limits.clone(),
                config.participant_limits.clone(),
            ),
            tickers,
            trade_ids: TradeIdGenerator::new(Uuid::new_v5(
                &Uuid::NAMESPACE_DNS,
                b"exchange-core.trades",
            )),
            next_order_id: AtomicU64::new(1),
            session_close: AtomicU64::new(config.session.close_at_ms.unwrap_or(0)),
            halted: AtomicBool::new(false),
            halt_reason: Mutex::new(None),
            audit_baseline: Mutex::new(BTreeMap::new()),
        })
    }

    /// The reference-data catalog.
    pub fn refdata(&self) -> &ReferenceData {
        &self.refdata
    }

    /// The balance store.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Reads a participant's balance row.
    pub fn balance(&self, participant: &ParticipantId, asset: &AssetId) -> Balance {
        self.ledger.get(participant, asset)
    }

    /// Whether the engine is halted.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// The fatal error that halted the engine, if any.
    pub fn halt_reason(&self) -> Option<FatalError> {
        self.halt_reason.lock().ok().and_then(|r| r.clone())
    }

    /// Operator action: clears the halt state after investigation.
    pub fn resume(&self) {
        if let Ok(mut reason) = self.halt_reason.lock() {
            *reason = None;
        }
        self.halted.store(false, Ordering::SeqCst);
        info!("engine resumed by operator");
    }

    /// Sets or clears the session close used by the DAY-order sweep.
    pub fn set_session_close(&self, close_at_ms: Option<u64>) {
        self.session_close.store(close_at_ms.unwrap_or(0), Ordering::SeqCst);
    }

    fn session_close(&self) -> Option<u64> {
        match self.session_close.load(Ordering::SeqCst) {
            0 => None,
            close => Some(close),
        }
    }

    // ─── bridge surface ─────────────────────────────────────────────────

    /// Credits a deposit from the bridge collaborator. The bridge owns
    /// idempotence and durability; the engine records the amount in its
    /// conservation baseline.
    pub fn deposit(
        &self,
        participant: &ParticipantId,
        asset: &AssetId,
        quantity: u128,
    ) -> Result<(), EngineError> {
        self.ensure_running()?;
        self.ledger
            .deposit(participant, asset, quantity)
            .map_err(|_| EngineError::Rejected(RejectReason::MalformedRequest))?;
        if let Ok(mut baseline) = self.audit_baseline.lock() {
            *baseline.entry(asset.clone()).or_insert(0) += quantity;
        }
        Ok(())
    }

    /// Debits a withdrawal for the bridge collaborator.
    pub fn withdraw(
        &self,
        participant: &ParticipantId,
        asset: &AssetId,
        quantity: u128,
    ) -> Result<(), EngineError> {
        self.ensure_running()?;
        self.ledger.withdraw(participant, asset, quantity).map_err(|e| match e {
            crate::ledger::LedgerError::InsufficientAvailable { .. } => {
                EngineError::Rejected(RejectReason::InsufficientAvailable)
            }
            _ => EngineError::Rejected(RejectReason::MalformedRequest),
        })?;
        if let Ok(mut baseline) = self.audit_baseline.lock() {
            if let Some(total) = baseline.get_mut(asset) {
                *total = total.saturating_sub(quantity);
            }
        }
        Ok(())
    }

    /// Verifies per-asset conservation against the deposit/withdraw
    /// baseline. A mismatch halts the engine.
    pub fn audit(&self) -> Result<(), EngineError> {
        let baseline = match self.audit_baseline.lock() {
            Ok(b) => b.clone(),
            Err(_) => return Ok(()),
        };
        let totals = self.ledger.asset_totals();
        for (asset, expected) in &baseline {
            let actual = totals.get(asset).copied().unwrap_or(0);
            if actual != *expected {
                return Err(self.fatal(FatalError::LedgerConservationViolation {
                    detail: format!("{asset}: ledger holds {actual}, expected {expected}"),
                }));
            }
        }
        for (asset, actual) in &totals {
            if !baseline.contains_key(asset) && *actual != 0 {
                return Err(self.fatal(FatalError::LedgerConservationViolation {
                    detail: format!("{asset}: ledger holds {actual}, expected 0"),
                }));
            }
        }
        Ok(())
    }

    // ─── market data ────────────────────────────────────────────────────

    /// Depth view of one symbol's book.
    pub fn depth(&self, symbol: &Symbol, levels: usize) -> Option<DepthSnapshot> {
        let worker = self.workers.get(symbol)?.clone();
        let guard = worker.lock().ok()?;
        Some(guard.book.depth(levels))
    }

    /// The symbol's last trade price, readable without taking the worker
    /// lock.
    pub fn last_trade_price(&self, symbol: &Symbol) -> Option<u128> {
        let ticker = self.tickers.get(symbol)?;
        match ticker.load() {
            0 => None,
            price => Some(price),
        }
    }

    // ─── order entry ────────────────────────────────────────────────────

    /// Submits an order. Synchronous: one submission in, one outcome out.
    pub fn submit(&self, request: OrderRequest) -> Result<Accepted, EngineError> {
        self.ensure_running()?;
        self.journal
            .poll_ready()
            .map_err(|_| EngineError::Transient(TransientError::JournalBackpressure))?;

        let Some(worker_arc) = self.workers.get(&request.symbol).map(|w| w.clone()) else {
            // no worker exists, so the rejection is journaled without a
            // symbol sequence
            let _ = self.journal.append(&EngineEvent {
                sequence: 0,
                symbol: request.symbol.clone(),
                order: OrderId(0),
                participant: request.participant.clone(),
                timestamp: current_time_millis(),
                kind: EventKind::Rejected { reason: RejectReason::UnknownSymbol },
            });
            return Err(RejectReason::UnknownSymbol.into());
        };
        let mut worker = worker_arc
            .lock()
            .map_err(|_| self.fatal(FatalError::BookInconsistency { symbol: request.symbol.clone() }))?;
        self.submit_locked(&mut worker, request)
    }

    /// Cancels an active order on behalf of its owner.
    pub fn cancel(&self, participant: &ParticipantId, order_id: OrderId) -> Result<(), EngineError> {
        self.ensure_running()?;
        let Some(symbol) = self.routes.get(&order_id).map(|s| s.clone()) else {
            return Err(RejectReason::UnknownOrder.into());
        };
        let worker_arc = self.worker(&symbol)?;
        let mut worker = worker_arc
            .lock()
            .map_err(|_| self.fatal(FatalError::BookInconsistency { symbol: symbol.clone() }))?;

        let Some(order) = worker.orders.get(&order_id) else {
            return Err(RejectReason::UnknownOrder.into());
        };
        if order.status.is_terminal() || order.parent.is_some() {
            return Err(RejectReason::UnknownOrder.into());
        }
        if &order.participant != participant {
            self.emit(&mut worker, order_id, participant, EventKind::Rejected {
                reason: RejectReason::Unauthorized,
            })?;
            return Err(RejectReason::Unauthorized.into());
        }
        self.terminate_order(&mut worker, order_id, OrderStatus::Cancelled, true)?;
        Ok(())
    }

    /// Modifies an order: quantity decrease in place (keeps time
    /// priority), or limit price change as cancel-then-add (loses it and
    /// returns a fresh order id).
    pub fn modify(
        &self,
        participant: &ParticipantId,
        order_id: OrderId,
        changes: ModifyRequest,
    ) -> Result<Accepted, EngineError> {
        self.ensure_running()?;
        let Some(symbol) = self.routes.get(&order_id).map(|s| s.clone()) else {
            return Err(RejectReason::UnknownOrder.into());
        };
        let worker_arc = self.worker(&symbol)?;
        let mut worker = worker_arc
            .lock()
            .map_err(|_| self.fatal(FatalError::BookInconsistency { symbol: symbol.clone() }))?;

        let Some(order) = worker.orders.get(&order_id).cloned() else {
            return Err(RejectReason::UnknownOrder.into());
        };
        if order.status.is_terminal() {
            return Err(RejectReason::UnknownOrder.into());
        }
        if &order.participant != participant {
            self.emit(&mut worker, order_id, participant, EventKind::Rejected {
                reason: RejectReason::Unauthorized,
            })?;
            return Err(RejectReason::Unauthorized.into());
        }
        // only plain resting orders are modifiable in place
        if !matches!(order.kind, OrderKind::Limit | OrderKind::PostOnly)
            || !worker.book.contains(order_id)
        {
            let err = self.reject(&mut worker, order_id, participant, RejectReason::InvalidModify);
            return Err(err);
        }

        match (changes.limit_price, changes.quantity) {
            (None, Some(new_quantity)) => {
                if new_quantity >= order.quantity || new_quantity <= order.filled {
                    let err =
                        self.reject(&mut worker, order_id, participant, RejectReason::InvalidModify);
                    return Err(err);
                }
                let new_remaining = new_quantity - order.filled;
                let Some(freed) = worker.book.reduce_quantity(order_id, new_remaining) else {
                    let err =
                        self.reject(&mut worker, order_id, participant, RejectReason::InvalidModify);
                    return Err(err);
                };
                self.release_partial(&mut worker, order_id, freed)?;
                if let Some(record) = worker.orders.get_mut(&order_id) {
                    record.quantity = new_quantity;
                }
                self.emit(&mut worker, order_id, participant, EventKind::Reduced { new_quantity })?;
                let status = worker.orders.get(&order_id).map(|o| o.status).unwrap_or(OrderStatus::New);
                Ok(Accepted { order_id, status, trades: Vec::new() })
            }
            (Some(new_price), new_quantity) => {
                let replacement_total = new_quantity.unwrap_or(order.quantity);
                if replacement_total > order.quantity || replacement_total <= order.filled {
                    let err =
                        self.reject(&mut worker, order_id, participant, RejectReason::InvalidModify);
                    return Err(err);
                }
                self.terminate_order(&mut worker, order_id, OrderStatus::Cancelled, true)?;
                let replacement = OrderRequest {
                    participant: order.participant.clone(),
                    symbol: order.symbol.clone(),
                    side: order.side,
                    kind: order.kind,
                    quantity: replacement_total - order.filled,
                    limit_price: Some(new_price),
                    stop_price: None,
                    trail: None,
                    display_quantity: None,
                    time_in_force: order.time_in_force,
                    client_order_id: order.client_order_id.clone(),
                    oco_sibling: None,
                };
                self.submit_locked(&mut worker, replacement)
            }
            (None, None) => {
                let err = self.reject(&mut worker, order_id, participant, RejectReason::InvalidModify);
                Err(err)
            }
        }
    }

    /// Looks up an order's lifecycle record. Terminal orders stay
    /// queryable for the life of the engine.
    pub fn query(&self, participant: &ParticipantId, order_id: OrderId) -> Result<Order, EngineError> {
        let Some(symbol) = self.routes.get(&order_id).map(|s| s.clone()) else {
            return Err(RejectReason::UnknownOrder.into());
        };
        let worker_arc = self.worker(&symbol)?;
        let worker = worker_arc
            .lock()
            .map_err(|_| self.fatal(FatalError::BookInconsistency { symbol: symbol.clone() }))?;
        let Some(order) = worker.orders.get(&order_id) else {
            return Err(RejectReason::UnknownOrder.into());
        };
        if &order.participant != participant {
            return Err(RejectReason::Unauthorized.into());
        }
        Ok(order.clone())
    }

    /// End-of-session sweep: expires DAY orders past the session close and
    /// GTD orders past their deadline. Returns the number expired.
    pub fn expire_due(&self, now_ms: u64) -> usize {
        let session_close = self.session_close();
        let mut expired = 0;
        for entry in self.workers.iter() {
            let worker_arc = entry.value().clone();
            let Ok(mut worker) = worker_arc.lock() else { continue };
            let due: Vec<OrderId> = worker
                .orders
                .values()
                .filter(|o| {
                    o.status.is_active()
                        && o.parent.is_none()
                        && o.time_in_force.is_expired(now_ms, session_close)
                })
                .map(|o| o.id)
                .collect();
            for order_id in due {
                if self
                    .terminate_order(&mut worker, order_id, OrderStatus::Expired, false)
                    .is_ok()
                {
                    expired += 1;
                }
            }
        }
        if expired > 0 {
            info!("expiry sweep cancelled {expired} orders");
        }
        expired
    }

    /// Expires one order by id, as the sweep would. Used by journal
    /// replay, where expiry cannot be re-derived from the clock.
    pub(crate) fn expire_order(&self, order_id: OrderId) -> Result<(), EngineError> {
        let Some(symbol) = self.routes.get(&order_id).map(|s| s.clone()) else {
            return Err(RejectReason::UnknownOrder.into());
        };
        let worker_arc = self.worker(&symbol)?;
        let mut worker = worker_arc
            .lock()
            .map_err(|_| self.fatal(FatalError::BookInconsistency { symbol: symbol.clone() }))?;
        self.terminate_order(&mut worker, order_id, OrderStatus::Expired, false)
    }

    // ─── internals ──────────────────────────────────────────────────────

    fn ensure_running(&self) -> Result<(), EngineError> {
        if self.is_halted() {
            return Err(RejectReason::EngineHalted.into());
        }
        Ok(())
    }

    fn worker(&self, symbol: &Symbol) -> Result<Arc<Mutex<SymbolWorker>>, EngineError> {
        self.workers
            .get(symbol)
            .map(|w| w.clone())
            .ok_or_else(|| RejectReason::UnknownSymbol.into())
    }

    fn fatal(&self, fatal: FatalError) -> EngineError {
        error!("engine halted: {fatal}");
        if let Ok(mut reason) = self.halt_reason.lock() {
            reason.get_or_insert(fatal.clone());
        }
        self.halted.store(true, Ordering::SeqCst);
        EngineError::Fatal(fatal)
    }

    fn emit(
        &self,
        worker: &mut SymbolWorker,
        order: OrderId,
        participant: &ParticipantId,
        kind: EventKind,
    ) -> Result<(), EngineError> {
        let event = EngineEvent {
            sequence: worker.next_event_sequence(),
            symbol: worker.info.symbol.clone(),
            order,
            participant: participant.clone(),
            timestamp: current_time_millis(),
            kind,
        };
        self.journal
            .append(&event)
            .map_err(|e| self.fatal(FatalError::JournalFailed { detail: e.to_string() }))
    }

    fn reject(
        &self,
        worker: &mut SymbolWorker,
        order: OrderId,
        participant: &ParticipantId,
        reason: RejectReason,
    ) -> EngineError {
        warn!("order {order} rejected: {reason}");
        match self.emit(worker, order, participant, EventKind::Rejected { reason }) {
            Ok(()) => EngineError::Rejected(reason),
            Err(fatal) => fatal,
        }
    }

    fn submit_locked(
        &self,
        worker: &mut SymbolWorker,
        request: OrderRequest,
    ) -> Result<Accepted, EngineError> {
        let now = current_time_millis();

        if let Err(reason) = self.validate(worker, &request, now) {
            return Err(self.reject(worker, OrderId(0), &request.participant, reason));
        }

        // dispatch-stage conditions that must reject without any state
        // change: post-only crossing, FOK infeasibility, and (under the
        // cancel-incoming policy) a guaranteed self-match
        if let Err(reason) = self.precheck_dispatch(worker, &request) {
            return Err(self.reject(worker, OrderId(0), &request.participant, reason));
        }

        if let Some(sibling) = request.oco_sibling {
            let linkable = worker.orders.get(&sibling).is_some_and(|o| {
                o.participant == request.participant && o.status.is_active() && o.parent.is_none()
            });
            if !linkable {
                return Err(self.reject(
                    worker,
                    OrderId(0),
                    &request.participant,
                    RejectReason::MalformedRequest,
                ));
            }
        }

        // balance reservation
        let plan = match self.compute_reservation(worker, &request) {
            Ok(plan) => plan,
            Err(reason) => {
                return Err(self.reject(worker, OrderId(0), &request.participant, reason));
            }
        };
        let protection = plan.as_ref().and_then(|p| p.protection);
        if let Some(plan) = &plan {
            if plan.amount > 0
                && self
                    .ledger
                    .lock(&request.participant, &plan.asset, plan.amount)
                    .is_err()
            {
                return Err(self.reject(
                    worker,
                    OrderId(0),
                    &request.participant,
                    RejectReason::InsufficientAvailable,
                ));
            }
        }

        // the order exists from here on; ids are allocated only for
        // accepted submissions so replay reproduces them exactly
        let order_id = OrderId(self.next_order_id.fetch_add(1, Ordering::SeqCst));
        let sequence = worker.next_sequence();
        let status = if request.kind.is_triggered() {
            OrderStatus::PendingTrigger
        } else {
            OrderStatus::New
        };
        worker.orders.insert(order_id, Order {
            id: order_id,
            client_order_id: request.client_order_id.clone(),
            participant: request.participant.clone(),
            symbol: request.symbol.clone(),
            side: request.side,
            kind: request.kind,
            time_in_force: request.time_in_force,
            limit_price: request.limit_price,
            stop_price: request.stop_price,
            trail: request.trail,
            quantity: request.quantity,
            display_quantity: request.display_quantity,
            filled: 0,
            status,
            sequence,
            parent: None,
            oco_sibling: request.oco_sibling,
            created_at: now,
        });
        if let Some(plan) = plan {
            if plan.amount > 0 {
                worker
                    .reservations
                    .insert(order_id, Reservation { asset: plan.asset, remaining: plan.amount });
            }
        }
        self.routes.insert(order_id, request.symbol.clone());
        if let Some(client_id) = &request.client_order_id {
            self.client_ids
                .insert((request.participant.clone(), client_id.clone()), order_id);
        }
        if let Some(sibling) = request.oco_sibling {
            if let Some(record) = worker.orders.get_mut(&sibling) {
                record.oco_sibling = Some(order_id);
            }
        }

        self.emit(worker, order_id, &request.participant, EventKind::Accepted {
            request: request.clone(),
        })?;

        // dispatch
        let trades = if request.kind.is_triggered() {
            self.register_trigger(worker, order_id, &request, protection);
            Vec::new()
        } else if request.kind == OrderKind::Iceberg {
            let display = request.display_quantity.unwrap_or(request.quantity);
            let first_slice = display.min(request.quantity);
            worker.registry.register_iceberg(IcebergState {
                order: order_id,
                participant: request.participant.clone(),
                side: request.side,
                price: request.limit_price.unwrap_or(0),
                display,
                hidden: request.quantity - first_slice,
                active_slice: None,
            });
            match self.spawn_slice(worker, order_id)? {
                Some(submission) => self.execute(worker, submission)?,
                None => Vec::new(),
            }
        } else {
            let rest = match request.kind {
                OrderKind::Market => false,
                OrderKind::PostOnly => true,
                _ => !request.time_in_force.is_immediate(),
            };
            let limit = match request.kind {
                OrderKind::Market => protection,
                _ => request.limit_price,
            };
            let submission = BookSubmission {
                incoming: IncomingOrder {
                    id: order_id,
                    participant: request.participant.clone(),
                    side: request.side,
                    quantity: request.quantity,
                    limit_price: limit,
                    sequence,
                },
                rest,
            };
            self.execute(worker, submission)?
        };

        let status = worker
            .orders
            .get(&order_id)
            .map(|o| o.status)
            .unwrap_or(OrderStatus::New);
        if status == OrderStatus::Rejected {
            return Err(RejectReason::SelfMatchRejected.into());
        }
        Ok(Accepted { order_id, status, trades })
    }

    fn validate(
        &self,
        worker: &SymbolWorker,
        request: &OrderRequest,
        now: u64,
    ) -> Result<(), RejectReason> {
        let info = &worker.info;
        if request.quantity == 0 {
            return Err(RejectReason::QtyOutOfRange);
        }

        let required_fields = match request.kind {
            OrderKind::Limit | OrderKind::PostOnly => request.limit_price.is_some(),
            OrderKind::Iceberg => {
                request.limit_price.is_some()
                    && request
                        .display_quantity
                        .is_some_and(|d| d > 0 && d <= request.quantity)
            }
            OrderKind::StopLimit => request.limit_price.is_some() && request.stop_price.is_some(),
            OrderKind::Stop | OrderKind::TakeProfit => request.stop_price.is_some(),
            OrderKind::TrailingStop => match request.trail {
                Some(Trail::Amount(amount)) => amount > 0,
                Some(Trail::Bps(bps)) => bps > 0,
                None => false,
            },
            OrderKind::Market => true,
        };
        if !required_fields {
            return Err(RejectReason::MalformedRequest);
        }

        for price in [request.limit_price, request.stop_price].into_iter().flatten() {
            if !info.is_tick_aligned(price) {
                return Err(RejectReason::BadTick);
            }
        }
        if !info.is_lot_aligned(request.quantity) {
            return Err(RejectReason::BadLot);
        }
        if let Some(display) = request.display_quantity {
            if !info.is_lot_aligned(display) {
                return Err(RejectReason::BadLot);
            }
        }
        if !info.quantity_in_range(request.quantity) {
            return Err(RejectReason::QtyOutOfRange);
        }
        if let (Some(limit), Some(last)) = (request.limit_price, worker.book.last_trade_price()) {
            if let Some((low, high)) = info.band_limits(last) {
                if limit < low || limit > high {
                    return Err(RejectReason::PriceOutOfBand);
                }
            }
        }

        self.risk.check_rate(&request.participant, now)?;

        if let Some(client_id) = &request.client_order_id {
            if self
                .client_ids
                .contains_key(&(request.participant.clone(), client_id.clone()))
            {
                return Err(RejectReason::DuplicateClientId);
            }
        }

        if let Some(price) = request.limit_price.or(request.stop_price) {
            let notional = checked_notional(price, request.quantity, info.base_scale)
                .ok_or(RejectReason::MalformedRequest)?;
            self.risk.check_notional(&request.participant, notional)?;
        }
        self.risk
            .check_position(&request.participant, &request.symbol, request.side, request.quantity)?;
        Ok(())
    }

    fn precheck_dispatch(
        &self,
        worker: &SymbolWorker,
        request: &OrderRequest,
    ) -> Result<(), RejectReason> {
        match request.kind {
            OrderKind::PostOnly => {
                let price = request.limit_price.unwrap_or(0);
                if worker.book.would_cross(request.side, price) {
                    return Err(RejectReason::PostOnlyWouldCross);
                }
            }
            OrderKind::Limit | OrderKind::Market
                if request.time_in_force == TimeInForce::Fok =>
            {
                // same-participant liquidity never fills the taker, under
                // any SMP policy
                let crossable = worker.book.crossable_quantity(
                    request.side,
                    request.quantity,
                    request.limit_price,
                    Some(&request.participant),
                );
                if crossable < request.quantity {
                    return Err(RejectReason::FokUnfillable);
                }
                // under decrement-and-cancel the walk stops and decrements
                // the taker at the first same-participant order, so a full
                // fill requires never reaching one; cancel-resting sweeps
                // them aside and cancel-incoming is handled below
                if worker.info.smp_policy == SelfMatchPolicy::DecrementAndCancel
                    && worker.book.would_self_match(
                        request.side,
                        request.quantity,
                        request.limit_price,
                        &request.participant,
                    )
                {
                    return Err(RejectReason::FokUnfillable);
                }
            }
            _ => {}
        }
        // under cancel-incoming, a submission that would meet its own
        // resting order before filling is rejected outright
        if worker.info.smp_policy == SelfMatchPolicy::CancelIncoming
            && !request.kind.is_triggered()
            && worker.book.would_self_match(
                request.side,
                request.quantity,
                request.limit_price,
                &request.participant,
            )
        {
            return Err(RejectReason::SelfMatchRejected);
        }
        Ok(())
    }

    fn compute_reservation(
        &self,
        worker: &SymbolWorker,
        request: &OrderRequest,
    ) -> Result<Option<ReservationPlan>, RejectReason> {
        let info = &worker.info;
        if request.side == Side::Sell {
            return Ok(Some(ReservationPlan {
                asset: info.base.clone(),
                amount: request.quantity,
                protection: None,
            }));
        }

        let last = worker.book.last_trade_price();
        let bound = match request.kind {
            OrderKind::Limit | OrderKind::PostOnly | OrderKind::Iceberg | OrderKind::StopLimit => {
                request.limit_price
            }
            OrderKind::Market => last
                .map(|l| info.band_ceiling(l))
                .or_else(|| worker.book.sweep_bound(Side::Buy, request.quantity)),
            OrderKind::Stop | OrderKind::TakeProfit => {
                request.stop_price.map(|s| info.band_ceiling(s))
            }
            OrderKind::TrailingStop => {
                let Some(last) = last else {
                    return Err(RejectReason::MalformedRequest);
                };
                let initial_stop = match request.trail {
                    Some(Trail::Amount(amount)) => last.saturating_add(amount),
                    Some(Trail::Bps(bps)) => {
                        last.saturating_mul(10_000 + bps as u128).div_ceil(10_000)
                    }
                    None => return Err(RejectReason::MalformedRequest),
                };
                Some(info.band_ceiling(initial_stop))
            }
        };

        match bound {
            // a market buy against an empty, never-traded book cannot
            // match anything, so there is nothing to reserve
            None if request.kind == OrderKind::Market => Ok(None),
            None => Err(RejectReason::MalformedRequest),
            Some(price) => {
                let amount = checked_notional(price, request.quantity, info.base_scale)
                    .ok_or(RejectReason::MalformedRequest)?;
                let protection = matches!(
                    request.kind,
                    OrderKind::Market
                        | OrderKind::Stop
                        | OrderKind::TakeProfit
                        | OrderKind::TrailingStop
                )
                .then_some(price);
                Ok(Some(ReservationPlan { asset: info.quote.clone(), amount, protection }))
            }
        }
    }

    fn register_trigger(
        &self,
        worker: &mut SymbolWorker,
        order_id: OrderId,
        request: &OrderRequest,
        protection: Option<u128>,
    ) {
        let last = worker.book.last_trade_price();
        let (stop_price, water_mark) = match request.kind {
            OrderKind::TrailingStop => {
                // water mark seeds from the last trade; the reservation
                // path guarantees one exists for buys, and sells fall back
                // to the current price or zero
                let reference = last.unwrap_or(0);
                let stop = match (request.trail, request.side) {
                    (Some(Trail::Amount(amount)), Side::Sell) => reference.saturating_sub(amount),
                    (Some(Trail::Amount(amount)), Side::Buy) => reference.saturating_add(amount),
                    (Some(Trail::Bps(bps)), Side::Sell) => {
                        reference.saturating_mul(10_000 - (bps as u128).min(10_000)) / 10_000
                    }
                    (Some(Trail::Bps(bps)), Side::Buy) => {
                        reference.saturating_mul(10_000 + bps as u128).div_ceil(10_000)
                    }
                    (None, _) => 0,
                };
                (stop, reference)
            }
            _ => {
                let stop = request.stop_price.unwrap_or(0);
                (stop, stop)
            }
        };
        worker.registry.register_trigger(PendingTrigger {
            order: order_id,
            participant: request.participant.clone(),
            side: request.side,
            quantity: request.quantity,
            kind: request.kind,
            stop_price,
            limit_price: request.limit_price,
            trail: request.trail,
            water_mark,
            protection_price: protection,
        });
    }

    fn spawn_slice(
        &self,
        worker: &mut SymbolWorker,
        parent_id: OrderId,
    ) -> Result<Option<BookSubmission>, EngineError> {
        let Some(iceberg) = worker.registry.iceberg_mut(parent_id) else {
            return Ok(None);
        };
        let slice_quantity = iceberg.next_slice_quantity();
        if slice_quantity == 0 {
            return Ok(None);
        }
        iceberg.hidden -= slice_quantity;
        let participant = iceberg.participant.clone();
        let side = iceberg.side;
        let price = iceberg.price;

        let slice_id = OrderId(self.next_order_id.fetch_add(1, Ordering::SeqCst));
        let sequence = worker.next_sequence();
        if let Some(iceberg) = worker.registry.iceberg_mut(parent_id) {
            iceberg.active_slice = Some(slice_id);
        }
        let (symbol, tif) = {
            let parent = worker.orders.get(&parent_id);
            (
                worker.info.symbol.clone(),
                parent.map(|p| p.time_in_force).unwrap_or_default(),
            )
        };
        worker.orders.insert(slice_id, Order {
            id: slice_id,
            client_order_id: None,
            participant: participant.clone(),
            symbol,
            side,
            kind: OrderKind::Limit,
            time_in_force: tif,
            limit_price: Some(price),
            stop_price: None,
            trail: None,
            quantity: slice_quantity,
            display_quantity: None,
            filled: 0,
            status: OrderStatus::New,
            sequence,
            parent: Some(parent_id),
            oco_sibling: None,
            created_at: current_time_millis(),
        });

        Ok(Some(BookSubmission {
            incoming: IncomingOrder {
                id: slice_id,
                participant,
                side,
                quantity: slice_quantity,
                limit_price: Some(price),
                sequence,
            },
            rest: true,
        }))
    }

    /// Runs one submission plus everything it sets off: iceberg slice
    /// replenishment and fired triggers, processed breadth-first until the
    /// symbol quiesces.
    fn execute(
        &self,
        worker: &mut SymbolWorker,
        first: BookSubmission,
    ) -> Result<Vec<Trade>, EngineError> {
        let mut queue = VecDeque::new();
        queue.push_back(first);
        let mut trades = Vec::new();

        while let Some(submission) = queue.pop_front() {
            let book_order = submission.incoming.id;
            let outcome = worker.book.add(submission.incoming, submission.rest);

            if worker.book.is_crossed() {
                return Err(self.fatal(FatalError::BookInconsistency {
                    symbol: worker.info.symbol.clone(),
                }));
            }

            let mut oco_hits = Vec::new();
            self.apply_smp(worker, &outcome)?;
            for fill in &outcome.fills {
                let trade =
                    self.settle_fill(worker, book_order, fill, &mut queue, &mut oco_hits)?;
                trades.push(trade);
            }
            self.finish_taker(worker, book_order, &outcome)?;

            for sibling in oco_hits {
                self.terminate_order(worker, sibling, OrderStatus::Cancelled, false)?;
            }

            if !outcome.fills.is_empty() {
                if let (Some(ticker), Some(last)) = (
                    self.tickers.get(&worker.info.symbol).map(|t| t.clone()),
                    worker.book.last_trade_price(),
                ) {
                    ticker.store(last);
                }
            }

            let evaluation_price = match worker.info.trigger_source {
                TriggerSource::LastTrade if !outcome.fills.is_empty() => {
                    worker.book.last_trade_price()
                }
                TriggerSource::LastTrade => None,
                TriggerSource::Mark => match (worker.book.best_bid(), worker.book.best_ask()) {
                    (Some(bid), Some(ask)) => Some((bid + ask) / 2),
                    _ => worker.book.last_trade_price(),
                },
            };
            if let Some(price) = evaluation_price {
                for fired in worker.registry.on_price(price) {
                    self.fire_trigger(worker, fired, price, &mut queue)?;
                }
            }
        }

        Ok(trades)
    }

    fn apply_smp(&self, worker: &mut SymbolWorker, outcome: &MatchOutcome) -> Result<(), EngineError> {
        for resting in &outcome.smp.resting_cancelled {
            let owner = worker
                .orders
                .get(&resting.id)
                .and_then(|o| o.parent)
                .unwrap_or(resting.id);
            if let Some(record) = worker.orders.get_mut(&resting.id) {
                record.status = OrderStatus::Cancelled;
            }
            if owner == resting.id {
                let participant = resting.participant.clone();
                self.release_order(worker, resting.id)?;
                self.emit(worker, resting.id, &participant, EventKind::Cancelled {
                    by_user: false,
                })?;
            } else {
                // a slice was removed by SMP: fold the whole iceberg
                self.terminate_order(worker, owner, OrderStatus::Cancelled, false)?;
            }
        }
        for (order_id, reduced_by) in &outcome.smp.resting_reduced {
            let owner = worker
                .orders
                .get(order_id)
                .and_then(|o| o.parent)
                .unwrap_or(*order_id);
            if let Some(record) = worker.orders.get_mut(&owner) {
                record.quantity = record.quantity.saturating_sub(*reduced_by);
            }
            if owner != *order_id {
                if let Some(record) = worker.orders.get_mut(order_id) {
                    record.quantity = record.quantity.saturating_sub(*reduced_by);
                }
            }
            self.release_partial(worker, owner, *reduced_by)?;
        }
        Ok(())
    }

    fn settle_fill(
        &self,
        worker: &mut SymbolWorker,
        taker_id: OrderId,
        fill: &Fill,
        queue: &mut VecDeque<BookSubmission>,
        oco_hits: &mut Vec<OrderId>,
    ) -> Result<Trade, EngineError> {
        let symbol = worker.info.symbol.clone();
        let base = worker.info.base.clone();
        let quote = worker.info.quote.clone();
        let base_scale = worker.info.base_scale;

        let (taker_participant, taker_side) = match worker.orders.get(&taker_id) {
            Some(order) => (order.participant.clone(), order.side),
            None => {
                return Err(self.fatal(FatalError::BookInconsistency { symbol }));
            }
        };
        let notional = match checked_notional(fill.price, fill.quantity, base_scale) {
            Some(notional) => notional,
            None => {
                return Err(self.fatal(FatalError::SettleFailedAfterLock {
                    detail: "notional overflow".to_string(),
                }));
            }
        };

        let trade = Trade {
            id: self.trade_ids.next(),
            symbol: symbol.clone(),
            sequence: worker.next_sequence(),
            taker_order: taker_id,
            maker_order: fill.maker_order,
            taker: taker_participant.clone(),
            maker: fill.maker_participant.clone(),
            taker_side,
            price: fill.price,
            quantity: fill.quantity,
            notional,
            timestamp: current_time_millis(),
        };

        // both sides locked before matching, so a settlement failure is a
        // fatal invariant violation, not an error to recover from
        if let Err(e) = self.ledger.settle(
            trade.buyer(),
            trade.seller(),
            &base,
            &quote,
            fill.quantity,
            notional,
        ) {
            return Err(self.fatal(FatalError::SettleFailedAfterLock { detail: e.to_string() }));
        }

        let taker_owner = worker
            .orders
            .get(&taker_id)
            .and_then(|o| o.parent)
            .unwrap_or(taker_id);
        let maker_owner = worker
            .orders
            .get(&fill.maker_order)
            .and_then(|o| o.parent)
            .unwrap_or(fill.maker_order);
        let (taker_consumed, maker_consumed) = match taker_side {
            Side::Buy => (notional, fill.quantity),
            Side::Sell => (fill.quantity, notional),
        };
        worker.consume_reservation(taker_owner, taker_consumed);
        worker.consume_reservation(maker_owner, maker_consumed);

        self.risk.record_fill(trade.buyer(), &symbol, Side::Buy, fill.quantity);
        self.risk.record_fill(trade.seller(), &symbol, Side::Sell, fill.quantity);

        self.emit(worker, taker_id, &taker_participant, EventKind::Trade {
            trade: trade.clone(),
        })?;

        self.credit_fill(worker, taker_id, fill.quantity, queue, oco_hits)?;
        self.credit_fill(worker, fill.maker_order, fill.quantity, queue, oco_hits)?;

        Ok(trade)
    }

    /// Applies one fill to a book-level order record, resolving iceberg
    /// slices to their parent for participant-facing bookkeeping.
    fn credit_fill(
        &self,
        worker: &mut SymbolWorker,
        book_id: OrderId,
        quantity: u128,
        queue: &mut VecDeque<BookSubmission>,
        oco_hits: &mut Vec<OrderId>,
    ) -> Result<(), EngineError> {
        let (owner_id, slice_done) = {
            let Some(record) = worker.orders.get_mut(&book_id) else {
                return Err(self.fatal(FatalError::BookInconsistency {
                    symbol: worker.info.symbol.clone(),
                }));
            };
            record.filled += quantity;
            let slice_done = record.parent.is_some() && record.remaining() == 0;
            if slice_done {
                record.status = OrderStatus::Filled;
            }
            (record.parent.unwrap_or(book_id), slice_done)
        };

        let (participant, filled, remaining, sibling) = {
            let Some(owner) = worker.orders.get_mut(&owner_id) else {
                return Err(self.fatal(FatalError::BookInconsistency {
                    symbol: worker.info.symbol.clone(),
                }));
            };
            if owner_id != book_id {
                owner.filled += quantity;
            }
            (
                owner.participant.clone(),
                owner.filled,
                owner.remaining(),
                owner.oco_sibling,
            )
        };

        if remaining == 0 {
            if let Some(owner) = worker.orders.get_mut(&owner_id) {
                owner.status = OrderStatus::Filled;
            }
            worker.registry.remove_iceberg(owner_id);
            self.release_order(worker, owner_id)?;
            self.emit(worker, owner_id, &participant, EventKind::Filled)?;
        } else {
            if let Some(owner) = worker.orders.get_mut(&owner_id) {
                owner.status = OrderStatus::PartiallyFilled;
            }
            self.emit(worker, owner_id, &participant, EventKind::PartialFill {
                filled,
                remaining,
            })?;
            if slice_done {
                // the visible slice is gone; replenish from the hidden pool
                if let Some(iceberg) = worker.registry.iceberg_mut(owner_id) {
                    iceberg.active_slice = None;
                }
                if let Some(submission) = self.spawn_slice(worker, owner_id)? {
                    queue.push_back(submission);
                }
            }
        }

        if let Some(sibling) = sibling {
            oco_hits.push(sibling);
        }
        Ok(())
    }

    fn finish_taker(
        &self,
        worker: &mut SymbolWorker,
        taker_id: OrderId,
        outcome: &MatchOutcome,
    ) -> Result<(), EngineError> {
        let Some(order) = worker.orders.get(&taker_id).cloned() else {
            return Err(self.fatal(FatalError::BookInconsistency {
                symbol: worker.info.symbol.clone(),
            }));
        };

        // a rested remainder keeps working; fully filled takers were
        // closed out in credit_fill. Quantity killed by SMP still needs a
        // terminal transition below even when nothing remains.
        if outcome.rested {
            return Ok(());
        }
        if outcome.remaining == 0 && outcome.smp.incoming_cancelled == 0 {
            return Ok(());
        }

        // unfilled remainder that may not rest: market/IOC remainder or an
        // SMP-cancelled incoming
        let full_smp_reject = outcome.fills.is_empty()
            && outcome.smp.incoming_cancelled == order.quantity
            && worker.info.smp_policy == SelfMatchPolicy::CancelIncoming;
        let owner_id = order.parent.unwrap_or(taker_id);
        let participant = order.participant.clone();

        if full_smp_reject {
            if let Some(record) = worker.orders.get_mut(&owner_id) {
                record.status = OrderStatus::Rejected;
            }
            if owner_id != taker_id {
                if let Some(record) = worker.orders.get_mut(&taker_id) {
                    record.status = OrderStatus::Rejected;
                }
                worker.registry.remove_iceberg(owner_id);
            }
            self.release_order(worker, owner_id)?;
            self.emit(worker, owner_id, &participant, EventKind::Rejected {
                reason: RejectReason::SelfMatchRejected,
            })?;
            return Ok(());
        }

        if let Some(record) = worker.orders.get_mut(&owner_id) {
            record.status = OrderStatus::Cancelled;
        }
        if owner_id != taker_id {
            if let Some(record) = worker.orders.get_mut(&taker_id) {
                record.status = OrderStatus::Cancelled;
            }
            worker.registry.remove_iceberg(owner_id);
        }
        self.release_order(worker, owner_id)?;
        self.emit(worker, owner_id, &participant, EventKind::Cancelled { by_user: false })?;
        Ok(())
    }

    fn fire_trigger(
        &self,
        worker: &mut SymbolWorker,
        trigger: PendingTrigger,
        price: u128,
        queue: &mut VecDeque<BookSubmission>,
    ) -> Result<(), EngineError> {
        let Some(order) = worker.orders.get_mut(&trigger.order) else {
            return Ok(());
        };
        if !order.status.is_active() {
            return Ok(());
        }
        order.status = OrderStatus::New;
        let tif = order.time_in_force;

        self.emit(worker, trigger.order, &trigger.participant, EventKind::Triggered {
            trigger_price: price,
        })?;
        info!(
            "trigger fired: {} {} at {}",
            trigger.kind, trigger.order, price
        );

        let sequence = worker.next_sequence();
        let (limit, rest) = match trigger.kind {
            OrderKind::StopLimit => (trigger.limit_price, !tif.is_immediate()),
            _ => {
                let protection = match trigger.side {
                    Side::Buy => trigger.protection_price,
                    Side::Sell => None,
                };
                (protection, false)
            }
        };
        queue.push_back(BookSubmission {
            incoming: IncomingOrder {
                id: trigger.order,
                participant: trigger.participant.clone(),
                side: trigger.side,
                quantity: trigger.quantity,
                limit_price: limit,
                sequence,
            },
            rest,
        });
        Ok(())
    }

    /// Cancels or expires an order, removing any book or registry
    /// presence, releasing the residual reservation, and emitting the
    /// terminal event.
    fn terminate_order(
        &self,
        worker: &mut SymbolWorker,
        order_id: OrderId,
        status: OrderStatus,
        by_user: bool,
    ) -> Result<(), EngineError> {
        let Some(order) = worker.orders.get(&order_id).cloned() else {
            return Ok(());
        };
        if order.status.is_terminal() {
            return Ok(());
        }

        worker.book.cancel(order_id);
        worker.registry.remove_trigger(order_id);
        if let Some(iceberg) = worker.registry.remove_iceberg(order_id) {
            if let Some(slice_id) = iceberg.active_slice {
                worker.book.cancel(slice_id);
                if let Some(slice) = worker.orders.get_mut(&slice_id) {
                    slice.status = status;
                }
            }
        }
        if let Some(record) = worker.orders.get_mut(&order_id) {
            record.status = status;
            if let Some(sibling) = record.oco_sibling.take() {
                // unlink; the sibling stays working unless this
                // termination came from its execution
                if let Some(sibling_record) = worker.orders.get_mut(&sibling) {
                    sibling_record.oco_sibling = None;
                }
            }
        }
        self.release_order(worker, order_id)?;
        let kind = match status {
            OrderStatus::Expired => EventKind::Expired,
            _ => EventKind::Cancelled { by_user },
        };
        self.emit(worker, order_id, &order.participant, kind)?;
        Ok(())
    }

    /// Releases an order's residual reservation and frees its client id.
    fn release_order(&self, worker: &mut SymbolWorker, order_id: OrderId) -> Result<(), EngineError> {
        let Some(order) = worker.orders.get(&order_id) else {
            return Ok(());
        };
        let participant = order.participant.clone();
        let client_id = order.client_order_id.clone();

        if let Some(reservation) = worker.reservations.remove(&order_id) {
            if reservation.remaining > 0 {
                if let Err(e) =
                    self.ledger
                        .unlock(&participant, &reservation.asset, reservation.remaining)
                {
                    return Err(self.fatal(FatalError::LedgerConservationViolation {
                        detail: format!("residual unlock failed: {e}"),
                    }));
                }
            }
        }
        if let Some(client_id) = client_id {
            self.client_ids.remove(&(participant, client_id));
        }
        Ok(())
    }

    /// Unlocks part of an order's reservation after a quantity reduction.
    fn release_partial(
        &self,
        worker: &mut SymbolWorker,
        order_id: OrderId,
        freed_quantity: u128,
    ) -> Result<(), EngineError> {
        let Some(order) = worker.orders.get(&order_id) else {
            return Ok(());
        };
        let participant = order.participant.clone();
        let unlock_amount = match order.side {
            Side::Sell => freed_quantity,
            Side::Buy => {
                let price = order.limit_price.unwrap_or(0);
                checked_notional(price, freed_quantity, worker.info.base_scale).unwrap_or(0)
            }
        };
        if unlock_amount == 0 {
            return Ok(());
        }
        let asset = match worker.reservations.get(&order_id) {
            Some(reservation) => reservation.asset.clone(),
            None => return Ok(()),
        };
        worker.consume_reservation(order_id, unlock_amount);
        if let Err(e) = self.ledger.unlock(&participant, &asset, unlock_amount) {
            return Err(self.fatal(FatalError::LedgerConservationViolation {
                detail: format!("partial unlock failed: {e}"),
            }));
        }
        Ok(())
    }
}
