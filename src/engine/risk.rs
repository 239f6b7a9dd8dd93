//! Per-participant ingress limits: order rate, daily count, notional and
//! position caps.

use super::error::RejectReason;
use crate::refdata::RiskLimits;
use crate::types::{ParticipantId, Side, Symbol};
use dashmap::DashMap;
use std::collections::HashMap;

#[derive(Debug, Default, Clone, Copy)]
struct RateWindow {
    second_bucket: u64,
    in_second: u32,
    day_bucket: u64,
    in_day: u32,
}

/// Tracks rate windows and net positions and enforces the configured
/// limits at ingress. Shared across symbol workers.
#[derive(Debug)]
pub struct RiskTracker {
    default_limits: RiskLimits,
    overrides: HashMap<String, RiskLimits>,
    rates: DashMap<ParticipantId, RateWindow>,
    positions: DashMap<(ParticipantId, Symbol), i128>,
}

impl RiskTracker {
    /// Creates a tracker with the given defaults and per-participant
    /// overrides.
    pub fn new(default_limits: RiskLimits, overrides: HashMap<String, RiskLimits>) -> Self {
        Self {
            default_limits,
            overrides,
            rates: DashMap::new(),
            positions: DashMap::new(),
        }
    }

    fn limits_for(&self, participant: &ParticipantId) -> &RiskLimits {
        self.overrides.get(participant.as_str()).unwrap_or(&self.default_limits)
    }

    /// Counts one submission against the participant's per-second and
    /// per-day windows, rejecting when either is exhausted.
    pub fn check_rate(&self, participant: &ParticipantId, now_ms: u64) -> Result<(), RejectReason> {
        let limits = self.limits_for(participant);
        let second = now_ms / 1_000;
        let day = now_ms / 86_400_000;

        let mut window = self.rates.entry(participant.clone()).or_default();
        if window.second_bucket != second {
            window.second_bucket = second;
            window.in_second = 0;
        }
        if window.day_bucket != day {
            window.day_bucket = day;
            window.in_day = 0;
        }
        if window.in_second >= limits.max_orders_per_second
            || window.in_day >= limits.max_orders_per_day
        {
            return Err(RejectReason::RateLimited);
        }
        window.in_second += 1;
        window.in_day += 1;
        Ok(())
    }

    /// Checks the per-order notional cap.
    pub fn check_notional(
        &self,
        participant: &ParticipantId,
        notional: u128,
    ) -> Result<(), RejectReason> {
        match self.limits_for(participant).max_order_notional {
            Some(cap) if notional > cap => Err(RejectReason::NotionalCapExceeded),
            _ => Ok(()),
        }
    }

    /// Checks whether filling `quantity` on `side` could breach the
    /// participant's absolute net position cap for `symbol`.
    pub fn check_position(
        &self,
        participant: &ParticipantId,
        symbol: &Symbol,
        side: Side,
        quantity: u128,
    ) -> Result<(), RejectReason> {
        let Some(cap) = self.limits_for(participant).max_position else {
            return Ok(());
        };
        let current = self
            .positions
            .get(&(participant.clone(), symbol.clone()))
            .map(|p| *p)
            .unwrap_or(0);
        let delta = match side {
            Side::Buy => quantity as i128,
            Side::Sell => -(quantity as i128),
        };
        if (current + delta).unsigned_abs() > cap {
            return Err(RejectReason::PositionCapExceeded);
        }
        Ok(())
    }

    /// Records an executed fill against the participant's net position.
    pub fn record_fill(
        &self,
        participant: &ParticipantId,
        symbol: &Symbol,
        side: Side,
        quantity: u128,
    ) {
        let delta = match side {
            Side::Buy => quantity as i128,
            Side::Sell => -(quantity as i128),
        };
        *self
            .positions
            .entry((participant.clone(), symbol.clone()))
            .or_insert(0) += delta;
    }

    /// The participant's current net position in `symbol`.
    pub fn position(&self, participant: &ParticipantId, symbol: &Symbol) -> i128 {
        self.positions
            .get(&(participant.clone(), symbol.clone()))
            .map(|p| *p)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(per_second: u32, per_day: u32) -> RiskTracker {
        RiskTracker::new(
            RiskLimits {
                max_orders_per_second: per_second,
                max_orders_per_day: per_day,
                max_order_notional: Some(1_000_000),
                max_position: Some(100),
            },
            HashMap::new(),
        )
    }

    #[test]
    fn test_per_second_window() {
        let tracker = tracker(2, 100);
        let p = ParticipantId::from("a");
        assert!(tracker.check_rate(&p, 1_000).is_ok());
        assert!(tracker.check_rate(&p, 1_500).is_ok());
        assert_eq!(tracker.check_rate(&p, 1_999), Err(RejectReason::RateLimited));
        // next second resets
        assert!(tracker.check_rate(&p, 2_000).is_ok());
    }

    #[test]
    fn test_per_day_window() {
        let tracker = tracker(100, 3);
        let p = ParticipantId::from("a");
        for i in 0..3u64 {
            assert!(tracker.check_rate(&p, i * 1_000).is_ok());
        }
        assert_eq!(
            tracker.check_rate(&p, 50_000),
            Err(RejectReason::RateLimited)
        );
        // next day resets
        assert!(tracker.check_rate(&p, 86_400_000).is_ok());
    }

    #[test]
    fn test_notional_cap() {
        let tracker = tracker(10, 10);
        let p = ParticipantId::from("a");
        assert!(tracker.check_notional(&p, 1_000_000).is_ok());
        assert_eq!(
            tracker.check_notional(&p, 1_000_001),
            Err(RejectReason::NotionalCapExceeded)
        );
    }

    #[test]
    fn test_position_cap_both_sides() {
        let tracker = tracker(10, 10);
        let p = ParticipantId::from("a");
        let s = Symbol::from("DEC/USD");

        tracker.record_fill(&p, &s, Side::Buy, 80);
        assert_eq!(tracker.position(&p, &s), 80);
        assert!(tracker.check_position(&p, &s, Side::Buy, 20).is_ok());
        assert_eq!(
            tracker.check_position(&p, &s, Side::Buy, 21),
            Err(RejectReason::PositionCapExceeded)
        );
        // selling reduces the long position, so a large sell is capped on
        // the short side instead
        assert!(tracker.check_position(&p, &s, Side::Sell, 180).is_ok());
        assert_eq!(
            tracker.check_position(&p, &s, Side::Sell, 181),
            Err(RejectReason::PositionCapExceeded)
        );
    }
}
