//! Rule-based expert dispatch policy.

use super::{BALANCE_EPSILON_KW, DispatchPolicy, PolicyThresholds, islanded};
use crate::sim::types::{
    DecisionSource, DispatchDecision, DispatchReason, GridUsage, LoadShift, Observation,
};

/// Coupled demand/surplus rules.
///
/// - Deficit at a high price: discharge as much as the battery allows, import
///   the rest.
/// - Surplus at a low price: charge as much as the battery allows, export the
///   rest.
/// - Otherwise the grid absorbs the whole imbalance.
#[derive(Debug, Clone)]
pub struct RuleBasedPolicy {
    thresholds: PolicyThresholds,
}

impl RuleBasedPolicy {
    pub fn new(thresholds: PolicyThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &PolicyThresholds {
        &self.thresholds
    }

    fn deficit(&self, obs: &Observation, deficit: f64) -> DispatchDecision {
        let price_high = obs.price > self.thresholds.high_price_threshold;

        if price_high && obs.can_discharge() {
            let discharge = deficit.min(obs.max_discharge_kw);
            let import = deficit - discharge;
            decision(
                -discharge,
                import,
                DispatchReason::DischargeBattery,
                format!(
                    "price {:.2} above {:.2}: discharge {discharge:.3} kW, import {import:.3} kW",
                    obs.price, self.thresholds.high_price_threshold
                ),
            )
        } else if price_high {
            decision(
                0.0,
                deficit,
                DispatchReason::ImportGridForced,
                format!(
                    "price {:.2} is high but battery at {:.1}% cannot discharge",
                    obs.price,
                    obs.battery_soc * 100.0
                ),
            )
        } else {
            decision(
                0.0,
                deficit,
                DispatchReason::ImportGrid,
                format!("importing {deficit:.3} kW at {:.2}", obs.price),
            )
        }
    }

    fn surplus(&self, obs: &Observation, excess: f64) -> DispatchDecision {
        let price_low = obs.price < self.thresholds.low_price_threshold;

        if price_low && obs.can_charge() {
            let charge = excess.min(obs.max_charge_kw);
            let export = excess - charge;
            let reason = if export > BALANCE_EPSILON_KW {
                DispatchReason::ChargeAndExport
            } else {
                DispatchReason::ChargeBattery
            };
            decision(
                charge,
                -export,
                reason,
                format!(
                    "price {:.2} below {:.2}: charge {charge:.3} kW, export {export:.3} kW",
                    obs.price, self.thresholds.low_price_threshold
                ),
            )
        } else if obs.price >= self.thresholds.export_threshold {
            decision(
                0.0,
                -excess,
                DispatchReason::ExportGrid,
                format!("exporting {excess:.3} kW at {:.2}", obs.price),
            )
        } else {
            decision(
                0.0,
                -excess,
                DispatchReason::ExportGridForced,
                format!(
                    "exporting {excess:.3} kW at {:.2}, battery at {:.1}%",
                    obs.price,
                    obs.battery_soc * 100.0
                ),
            )
        }
    }
}

impl DispatchPolicy for RuleBasedPolicy {
    fn decide(&self, obs: &Observation) -> DispatchDecision {
        if !obs.grid_available {
            return islanded(obs, DecisionSource::Rules, None);
        }

        let net = obs.net_demand_kw();
        if net > BALANCE_EPSILON_KW {
            self.deficit(obs, net)
        } else if net < -BALANCE_EPSILON_KW {
            self.surplus(obs, -net)
        } else {
            decision(0.0, 0.0, DispatchReason::Hold, "balanced".to_string())
        }
    }

    fn name(&self) -> &'static str {
        "rules"
    }
}

fn decision(
    battery_action_kw: f64,
    grid_action_kw: f64,
    reason: DispatchReason,
    explanation: String,
) -> DispatchDecision {
    DispatchDecision {
        battery_action_kw,
        grid_action_kw,
        reason,
        explanation,
        source: DecisionSource::Rules,
        signals: None,
        load_shift: LoadShift::Neutral,
        grid_usage: GridUsage::Neutral,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::policy::test_support::observation;

    fn policy() -> RuleBasedPolicy {
        RuleBasedPolicy::new(PolicyThresholds::default())
    }

    #[test]
    fn deficit_at_high_price_discharges() {
        let obs = observation(0.0, 2.0, 25.0, 0.5);
        let d = policy().decide(&obs);
        assert!(d.battery_action_kw < 0.0);
        assert_eq!(d.reason, DispatchReason::DischargeBattery);
        assert_eq!(d.grid_action_kw, 0.0);
    }

    #[test]
    fn deficit_beyond_rate_limit_imports_remainder() {
        let obs = observation(0.0, 5.0, 25.0, 0.5);
        let d = policy().decide(&obs);
        assert_eq!(d.battery_action_kw, -3.0);
        assert_eq!(d.grid_action_kw, 2.0);
    }

    #[test]
    fn deficit_at_floor_is_forced_import() {
        let obs = observation(0.0, 2.0, 25.0, 0.1);
        let d = policy().decide(&obs);
        assert_eq!(d.battery_action_kw, 0.0);
        assert_eq!(d.grid_action_kw, 2.0);
        assert_eq!(d.reason, DispatchReason::ImportGridForced);
    }

    #[test]
    fn deficit_at_normal_price_imports() {
        let obs = observation(1.0, 2.0, 12.0, 0.5);
        let d = policy().decide(&obs);
        assert_eq!(d.reason, DispatchReason::ImportGrid);
        assert_eq!(d.grid_action_kw, 1.0);
    }

    #[test]
    fn surplus_at_low_price_charges_then_exports() {
        let obs = observation(8.0, 2.0, 3.0, 0.5);
        let d = policy().decide(&obs);
        assert_eq!(d.battery_action_kw, 3.0);
        assert_eq!(d.grid_action_kw, -3.0);
        assert_eq!(d.reason, DispatchReason::ChargeAndExport);
    }

    #[test]
    fn small_surplus_fully_charged() {
        let obs = observation(3.0, 2.0, 3.0, 0.5);
        let d = policy().decide(&obs);
        assert_eq!(d.battery_action_kw, 1.0);
        assert_eq!(d.grid_action_kw, 0.0);
        assert_eq!(d.reason, DispatchReason::ChargeBattery);
    }

    #[test]
    fn surplus_at_ceiling_is_forced_export() {
        let obs = observation(5.0, 2.0, 3.0, 0.95);
        let d = policy().decide(&obs);
        assert_eq!(d.battery_action_kw, 0.0);
        assert_eq!(d.grid_action_kw, -3.0);
        assert_eq!(d.reason, DispatchReason::ExportGridForced);
    }

    #[test]
    fn surplus_at_good_price_exports() {
        let obs = observation(5.0, 2.0, 15.0, 0.5);
        let d = policy().decide(&obs);
        assert_eq!(d.reason, DispatchReason::ExportGrid);
        assert_eq!(d.battery_action_kw, 0.0);
    }

    #[test]
    fn balanced_holds() {
        let obs = observation(2.0, 2.0, 15.0, 0.5);
        let d = policy().decide(&obs);
        assert_eq!(d.reason, DispatchReason::Hold);
    }

    #[test]
    fn every_decision_balances() {
        let p = policy();
        for solar in [0.0, 1.0, 2.5, 6.0] {
            for load in [0.0, 0.7, 2.0, 7.5] {
                for price in [0.0, 3.0, 12.0, 25.0] {
                    for soc in [0.1, 0.5, 0.95] {
                        let obs = observation(solar, load, price, soc);
                        let d = p.decide(&obs);
                        assert!(
                            d.balance_residual_kw(&obs).abs() < 1e-9,
                            "unbalanced at solar={solar} load={load} price={price} soc={soc}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn decision_is_deterministic() {
        let obs = observation(0.5, 3.0, 22.0, 0.4);
        let a = policy().decide(&obs);
        let b = policy().decide(&obs);
        assert_eq!(a.battery_action_kw, b.battery_action_kw);
        assert_eq!(a.reason, b.reason);
    }
}
