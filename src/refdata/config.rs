//! Engine configuration structs, deserializable from JSON at startup.

use crate::types::{AssetId, Scale, Symbol};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Declares an asset and its fixed-point scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetConfig {
    /// Asset identifier.
    pub id: AssetId,
    /// Decimal digits carried by quantities of this asset.
    pub scale: Scale,
}

/// What to do when an incoming order would trade against a resting order
/// from the same participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelfMatchPolicy {
    /// Reject the incoming order; the resting order stays. Default.
    #[default]
    CancelIncoming,
    /// Cancel the resting order and keep matching the incoming one.
    CancelResting,
    /// Cancel the smaller of the two and decrement the larger.
    DecrementAndCancel,
}

impl fmt::Display for SelfMatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SelfMatchPolicy::CancelIncoming => "cancel-incoming",
            SelfMatchPolicy::CancelResting => "cancel-resting",
            SelfMatchPolicy::DecrementAndCancel => "decrement-and-cancel",
        };
        f.write_str(s)
    }
}

/// Which price feeds the trigger evaluation for conditional orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    /// Evaluate triggers against the last trade price. Default.
    #[default]
    LastTrade,
    /// Also re-evaluate on top-of-book changes, using the mid price
    /// (falling back to last trade when one side is empty).
    Mark,
}

/// Trading parameters for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolConfig {
    /// Symbol identifier, e.g. `"DEC/USD"`.
    pub symbol: Symbol,
    /// Base asset (the thing traded).
    pub base: AssetId,
    /// Quote asset (the thing paid).
    pub quote: AssetId,
    /// Smallest price increment, in quote raw units.
    pub tick_size: u128,
    /// Smallest quantity increment, in base raw units.
    pub lot_size: u128,
    /// Minimum order quantity, in base raw units.
    pub min_quantity: u128,
    /// Maximum order quantity, in base raw units.
    pub max_quantity: u128,
    /// Price band around the last trade, in basis points. Zero disables the
    /// band check.
    #[serde(default)]
    pub band_bps: u32,
    /// Self-match-prevention policy for this symbol.
    #[serde(default)]
    pub smp_policy: SelfMatchPolicy,
    /// Trigger evaluation source for this symbol.
    #[serde(default)]
    pub trigger_source: TriggerSource,
}

/// Session timing for DAY order expiry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session close in milliseconds since the epoch; `None` means no close
    /// is scheduled and DAY orders behave like GTC until one is set.
    #[serde(default)]
    pub close_at_ms: Option<u64>,
}

/// Per-participant ingress limits. A participant without an override uses
/// the engine-wide defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Maximum submissions per second.
    pub max_orders_per_second: u32,
    /// Maximum submissions per UTC day.
    pub max_orders_per_day: u32,
    /// Per-order notional cap in quote raw units, if any.
    #[serde(default)]
    pub max_order_notional: Option<u128>,
    /// Per-symbol absolute net position cap in base raw units, if any.
    #[serde(default)]
    pub max_position: Option<u128>,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_orders_per_second: 100,
            max_orders_per_day: 100_000,
            max_order_notional: None,
            max_position: None,
        }
    }
}

/// Full static configuration loaded at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Known assets and their scales.
    pub assets: Vec<AssetConfig>,
    /// Tradable symbols.
    pub symbols: Vec<SymbolConfig>,
    /// Session timing.
    #[serde(default)]
    pub session: SessionConfig,
    /// Engine-wide default risk limits.
    #[serde(default)]
    pub default_limits: RiskLimits,
    /// Per-participant overrides, keyed by participant id.
    #[serde(default)]
    pub participant_limits: HashMap<String, RiskLimits>,
}

impl EngineConfig {
    /// Parses a configuration document from JSON.
    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_json() {
        let cfg = EngineConfig::from_json(
            r#"{
                "assets": [
                    {"id": "USD", "scale": 2},
                    {"id": "DEC", "scale": 8}
                ],
                "symbols": [{
                    "symbol": "DEC/USD",
                    "base": "DEC",
                    "quote": "USD",
                    "tick_size": 1,
                    "lot_size": 1,
                    "min_quantity": 1,
                    "max_quantity": 100000000000,
                    "band_bps": 1000,
                    "smp_policy": "cancel_incoming"
                }]
            }"#,
        )
        .expect("valid config");
        assert_eq!(cfg.assets.len(), 2);
        assert_eq!(cfg.symbols[0].smp_policy, SelfMatchPolicy::CancelIncoming);
        assert_eq!(cfg.symbols[0].trigger_source, TriggerSource::LastTrade);
        assert_eq!(cfg.default_limits.max_orders_per_second, 100);
    }

    #[test]
    fn test_smp_policy_display() {
        assert_eq!(SelfMatchPolicy::CancelIncoming.to_string(), "cancel-incoming");
        assert_eq!(
            SelfMatchPolicy::DecrementAndCancel.to_string(),
            "decrement-and-cancel"
        );
    }
}
