//! The resolved, immutable reference-data catalog.

use super::config::{EngineConfig, SelfMatchPolicy, SymbolConfig, TriggerSource};
use crate::types::{AssetId, Scale, Symbol};
use std::collections::HashMap;
use std::fmt;

/// Errors raised while resolving an [`EngineConfig`] into a catalog.
#[derive(Debug)]
#[non_exhaustive]
pub enum RefdataError {
    /// A symbol references an asset that is not declared.
    UnknownAsset {
        /// The symbol carrying the reference.
        symbol: Symbol,
        /// The undeclared asset.
        asset: AssetId,
    },
    /// The same symbol is declared twice.
    DuplicateSymbol(Symbol),
    /// The same asset is declared twice.
    DuplicateAsset(AssetId),
    /// A numeric parameter is out of range (zero tick/lot, min > max).
    BadParameter {
        /// The symbol carrying the parameter.
        symbol: Symbol,
        /// Description of the problem.
        message: String,
    },
}

impl fmt::Display for RefdataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefdataError::UnknownAsset { symbol, asset } => {
                write!(f, "symbol {symbol} references undeclared asset {asset}")
            }
            RefdataError::DuplicateSymbol(symbol) => {
                write!(f, "symbol {symbol} declared more than once")
            }
            RefdataError::DuplicateAsset(asset) => {
                write!(f, "asset {asset} declared more than once")
            }
            RefdataError::BadParameter { symbol, message } => {
                write!(f, "bad parameter for {symbol}: {message}")
            }
        }
    }
}

impl std::error::Error for RefdataError {}

/// Resolved trading parameters for one symbol, with asset scales attached.
#[derive(Debug, Clone)]
pub struct SymbolInfo {
    /// Symbol identifier.
    pub symbol: Symbol,
    /// Base asset.
    pub base: AssetId,
    /// Quote asset.
    pub quote: AssetId,
    /// Base asset scale.
    pub base_scale: Scale,
    /// Quote asset scale.
    pub quote_scale: Scale,
    /// Smallest price increment.
    pub tick_size: u128,
    /// Smallest quantity increment.
    pub lot_size: u128,
    /// Minimum order quantity.
    pub min_quantity: u128,
    /// Maximum order quantity.
    pub max_quantity: u128,
    /// Price band in basis points; zero disables.
    pub band_bps: u32,
    /// Self-match-prevention policy.
    pub smp_policy: SelfMatchPolicy,
    /// Trigger evaluation source.
    pub trigger_source: TriggerSource,
}

impl SymbolInfo {
    /// Whether `price` is an exact multiple of the tick size.
    pub fn is_tick_aligned(&self, price: u128) -> bool {
        price > 0 && price % self.tick_size == 0
    }

    /// Whether `quantity` is an exact multiple of the lot size.
    pub fn is_lot_aligned(&self, quantity: u128) -> bool {
        quantity % self.lot_size == 0
    }

    /// Whether `quantity` lies within the configured min/max range.
    pub fn quantity_in_range(&self, quantity: u128) -> bool {
        quantity >= self.min_quantity && quantity <= self.max_quantity
    }

    /// The permitted price window around `last_trade`, or `None` when the
    /// band is disabled.
    pub fn band_limits(&self, last_trade: u128) -> Option<(u128, u128)> {
        if self.band_bps == 0 {
            return None;
        }
        let bps = self.band_bps as u128;
        let lo = last_trade.saturating_mul(10_000 - bps.min(10_000)) / 10_000;
        let hi = last_trade.saturating_mul(10_000 + bps) / 10_000;
        Some((lo, hi))
    }

    /// Conservative upper price bound for market-buy reservations: the band
    /// ceiling over `last_trade`, rounded up to the next tick.
    pub fn band_ceiling(&self, last_trade: u128) -> u128 {
        let raw = if self.band_bps == 0 {
            last_trade
        } else {
            last_trade.saturating_mul(10_000 + self.band_bps as u128).div_ceil(10_000)
        };
        raw.div_ceil(self.tick_size) * self.tick_size
    }
}

/// Immutable catalog of assets and symbols, built once at startup.
#[derive(Debug, Clone)]
pub struct ReferenceData {
    assets: HashMap<AssetId, Scale>,
    symbols: HashMap<Symbol, SymbolInfo>,
}

impl ReferenceData {
    /// Resolves a configuration into a catalog, validating asset references
    /// and numeric parameters.
    pub fn from_config(config: &EngineConfig) -> Result<Self, RefdataError> {
        let mut assets = HashMap::new();
        for asset in &config.assets {
            if assets.insert(asset.id.clone(), asset.scale).is_some() {
                return Err(RefdataError::DuplicateAsset(asset.id.clone()));
            }
        }

        let mut symbols = HashMap::new();
        for cfg in &config.symbols {
            let info = Self::resolve_symbol(cfg, &assets)?;
            if symbols.insert(cfg.symbol.clone(), info).is_some() {
                return Err(RefdataError::DuplicateSymbol(cfg.symbol.clone()));
            }
        }

        Ok(Self { assets, symbols })
    }

    fn resolve_symbol(
        cfg: &SymbolConfig,
        assets: &HashMap<AssetId, Scale>,
    ) -> Result<SymbolInfo, RefdataError> {
        let base_scale = *assets.get(&cfg.base).ok_or_else(|| RefdataError::UnknownAsset {
            symbol: cfg.symbol.clone(),
            asset: cfg.base.clone(),
        })?;
        let quote_scale = *assets.get(&cfg.quote).ok_or_else(|| RefdataError::UnknownAsset {
            symbol: cfg.symbol.clone(),
            asset: cfg.quote.clone(),
        })?;

        if cfg.tick_size == 0 || cfg.lot_size == 0 {
            return Err(RefdataError::BadParameter {
                symbol: cfg.symbol.clone(),
                message: "tick_size and lot_size must be positive".to_string(),
            });
        }
        if cfg.min_quantity > cfg.max_quantity {
            return Err(RefdataError::BadParameter {
                symbol: cfg.symbol.clone(),
                message: format!(
                    "min_quantity {} exceeds max_quantity {}",
                    cfg.min_quantity, cfg.max_quantity
                ),
            });
        }

        Ok(SymbolInfo {
            symbol: cfg.symbol.clone(),
            base: cfg.base.clone(),
            quote: cfg.quote.clone(),
            base_scale,
            quote_scale,
            tick_size: cfg.tick_size,
            lot_size: cfg.lot_size,
            min_quantity: cfg.min_quantity,
            max_quantity: cfg.max_quantity,
            band_bps: cfg.band_bps,
            smp_policy: cfg.smp_policy,
            trigger_source: cfg.trigger_source,
        })
    }

    /// O(1) symbol lookup.
    pub fn symbol(&self, symbol: &Symbol) -> Option<&SymbolInfo> {
        self.symbols.get(symbol)
    }

    /// The scale of an asset, if declared.
    pub fn asset_scale(&self, asset: &AssetId) -> Option<Scale> {
        self.assets.get(asset).copied()
    }

    /// Iterates over all declared assets.
    pub fn assets(&self) -> impl Iterator<Item = (&AssetId, Scale)> {
        self.assets.iter().map(|(id, scale)| (id, *scale))
    }

    /// Iterates over all declared symbols.
    pub fn symbols(&self) -> impl Iterator<Item = &SymbolInfo> {
        self.symbols.values()
    }
}
