//! Calendar-aware dispatch policy with decoupled decision signals.

use super::{DispatchPolicy, PolicyThresholds, resolve_signals};
use crate::sim::types::{DecisionSignals, DecisionSource, DispatchDecision, Observation};

/// Weekend days are less aggressive: occupants are home and load is flatter.
const WEEKEND_AGGRESSIVENESS: f64 = 0.8;

/// Extra aggressiveness reached at the end of a 30-day month.
const MONTH_END_BOOST: f64 = 0.25;

/// Rules that derive three independent signals (load shift, battery, grid
/// usage) from price position, net demand, SOC, and calendar features, then
/// threshold each against the neutral band.
#[derive(Debug, Clone)]
pub struct CalendarAwarePolicy {
    thresholds: PolicyThresholds,
}

impl CalendarAwarePolicy {
    pub fn new(thresholds: PolicyThresholds) -> Self {
        Self { thresholds }
    }

    /// Computes the decoupled signals for an observation.
    pub fn signals(&self, obs: &Observation) -> DecisionSignals {
        let cal = &obs.calendar;
        let price = self.thresholds.price_position(obs.price);
        let soc_span = (obs.max_soc - obs.min_soc).max(f64::EPSILON);
        let soc = (2.0 * (obs.battery_soc - obs.min_soc) / soc_span - 1.0).clamp(-1.0, 1.0);
        let reference_kw = obs.max_charge_kw.max(obs.max_discharge_kw).max(1.0);
        let net = (obs.net_demand_kw() / reference_kw).tanh();

        let weekend = if cal.is_weekend { WEEKEND_AGGRESSIVENESS } else { 1.0 };
        let aggressiveness = weekend * (1.0 + MONTH_END_BOOST * cal.month_progress);

        let battery = (aggressiveness * (-0.6 * price - 0.4 * net - 0.2 * soc)).clamp(-1.0, 1.0);
        let grid_usage = (0.5 * net - 0.5 * price).clamp(-1.0, 1.0);
        let load_shift = (-price * weekend * (1.0 - 0.5 * cal.month_progress)).clamp(-1.0, 1.0);

        DecisionSignals {
            load_shift,
            battery,
            grid_usage,
        }
    }
}

impl DispatchPolicy for CalendarAwarePolicy {
    fn decide(&self, obs: &Observation) -> DispatchDecision {
        let signals = self.signals(obs);
        resolve_signals(obs, signals, &self.thresholds, DecisionSource::Calendar)
    }

    fn name(&self) -> &'static str {
        "calendar"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::policy::test_support::observation;
    use crate::sim::types::{CalendarFeatures, DispatchReason, LoadShift};

    fn policy() -> CalendarAwarePolicy {
        CalendarAwarePolicy::new(PolicyThresholds::default())
    }

    #[test]
    fn expensive_deficit_discharges() {
        let obs = observation(0.0, 2.0, 30.0, 0.8);
        let d = policy().decide(&obs);
        assert_eq!(d.reason, DispatchReason::DischargeBattery);
        assert!(d.battery_action_kw < 0.0);
        assert_eq!(d.source, DecisionSource::Calendar);
    }

    #[test]
    fn cheap_surplus_charges() {
        let obs = observation(5.0, 1.0, 1.0, 0.3);
        let d = policy().decide(&obs);
        assert!(d.battery_action_kw > 0.0);
        assert!(matches!(
            d.reason,
            DispatchReason::ChargeBattery | DispatchReason::ChargeAndExport
        ));
    }

    #[test]
    fn mid_price_small_deficit_sits_in_neutral_band() {
        let obs = observation(1.0, 1.2, 12.5, 0.5);
        let d = policy().decide(&obs);
        assert_eq!(d.reason, DispatchReason::ImportGrid);
        assert_eq!(d.battery_action_kw, 0.0);
    }

    #[test]
    fn load_shift_follows_price() {
        let p = policy();
        let expensive = p.decide(&observation(0.0, 2.0, 30.0, 0.8));
        let cheap = p.decide(&observation(5.0, 1.0, 1.0, 0.3));
        let mid = p.decide(&observation(1.0, 1.2, 12.5, 0.5));
        assert_eq!(expensive.load_shift, LoadShift::Defer);
        assert_eq!(cheap.load_shift, LoadShift::Advance);
        assert_eq!(mid.load_shift, LoadShift::Neutral);
    }

    #[test]
    fn signals_stay_in_unit_range() {
        let p = policy();
        for price in [0.0, 5.0, 12.0, 50.0] {
            for (solar, load) in [(0.0, 10.0), (10.0, 0.0), (1.0, 1.0)] {
                let s = p.signals(&observation(solar, load, price, 0.5));
                for v in [s.load_shift, s.battery, s.grid_usage] {
                    assert!((-1.0..=1.0).contains(&v));
                }
            }
        }
    }

    #[test]
    fn weekend_is_less_aggressive() {
        let p = policy();
        let mut weekday = observation(0.0, 2.0, 25.0, 0.6);
        weekday.calendar = CalendarFeatures::at(12.0, 0);
        let mut weekend = weekday.clone();
        weekend.calendar = CalendarFeatures::at(12.0, 5);

        let a = p.signals(&weekday).battery;
        let b = p.signals(&weekend).battery;
        assert!(b.abs() < a.abs() || a.abs() >= 1.0);
    }

    #[test]
    fn decisions_balance_power() {
        let p = policy();
        for solar in [0.0, 2.0, 6.0] {
            for load in [0.5, 2.0, 6.0] {
                for price in [1.0, 12.0, 30.0] {
                    let obs = observation(solar, load, price, 0.5);
                    let d = p.decide(&obs);
                    assert!(d.balance_residual_kw(&obs).abs() < 1e-9);
                }
            }
        }
    }
}
