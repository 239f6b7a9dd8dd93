//! Shared helpers for the integration tests: a two-asset venue (USD at
//! scale 2, DEC at scale 8) with a 10% price band and default SMP policy.

#![allow(dead_code)]

use exchange_core::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

/// 1 DEC in raw units (scale 8).
pub const DEC_UNIT: u128 = 100_000_000;
/// 1 USD in raw units (scale 2).
pub const USD_UNIT: u128 = 100;

/// Whole DEC to raw units.
pub fn dec(units: u128) -> u128 {
    units * DEC_UNIT
}

/// Whole USD to raw units.
pub fn usd(units: u128) -> u128 {
    units * USD_UNIT
}

pub fn p(id: &str) -> ParticipantId {
    ParticipantId::from(id)
}

pub fn sym() -> Symbol {
    Symbol::from("DEC/USD")
}

pub fn usd_asset() -> AssetId {
    AssetId::from("USD")
}

pub fn dec_asset() -> AssetId {
    AssetId::from("DEC")
}

/// The venue configuration shared by the scenario tests.
pub fn venue_config() -> EngineConfig {
    EngineConfig {
        assets: vec![
            AssetConfig { id: usd_asset(), scale: 2 },
            AssetConfig { id: dec_asset(), scale: 8 },
        ],
        symbols: vec![SymbolConfig {
            symbol: sym(),
            base: dec_asset(),
            quote: usd_asset(),
            tick_size: 1,
            lot_size: 1,
            min_quantity: 1,
            max_quantity: dec(1_000_000),
            band_bps: 1_000,
            smp_policy: SelfMatchPolicy::CancelIncoming,
            trigger_source: TriggerSource::LastTrade,
        }],
        session: SessionConfig::default(),
        default_limits: RiskLimits::default(),
        participant_limits: HashMap::new(),
    }
}

/// A fresh engine over [`venue_config`], with its journal for inspection.
pub fn venue() -> (Engine, Arc<MemoryJournal>) {
    let journal = Arc::new(MemoryJournal::new());
    let engine = Engine::new(&venue_config(), journal.clone()).expect("valid config");
    (engine, journal)
}

/// Deposits whole USD.
pub fn fund_usd(engine: &Engine, who: &str, whole: u128) {
    engine.deposit(&p(who), &usd_asset(), usd(whole)).expect("deposit");
}

/// Deposits whole DEC.
pub fn fund_dec(engine: &Engine, who: &str, whole: u128) {
    engine.deposit(&p(who), &dec_asset(), dec(whole)).expect("deposit");
}

/// Establishes a last trade at `price` between two throwaway participants,
/// so band checks and triggers have a reference.
pub fn seed_last_trade(engine: &Engine, price: u128) {
    fund_dec(engine, "seed-seller", 1);
    fund_usd(engine, "seed-buyer", 1_000_000);
    engine
        .submit(OrderRequest::limit("seed-seller", "DEC/USD", Side::Sell, price, dec(1)))
        .expect("seed sell");
    let accepted = engine
        .submit(OrderRequest::limit("seed-buyer", "DEC/USD", Side::Buy, price, dec(1)))
        .expect("seed buy");
    // the seed cross comes first; triggers it sets off may trade after it
    assert_eq!(accepted.trades.first().map(|t| t.price), Some(price));
}
