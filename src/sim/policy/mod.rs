//! Dispatch policies: the rule-based expert, its calendar-aware variant, and
//! the trained approximator with rule fallback.

pub mod approximator;
pub mod calendar;
pub mod rule;

use serde::Deserialize;

use crate::config::ConfigError;

use super::types::{
    DecisionSignals, DecisionSource, DispatchDecision, DispatchReason, GridUsage, LoadShift,
    Observation,
};

pub use approximator::{ApproximatorPolicy, FeatureScales, FuzzyModel};
pub use calendar::CalendarAwarePolicy;
pub use rule::RuleBasedPolicy;

/// Net demand magnitudes below this are treated as balanced (kW).
pub const BALANCE_EPSILON_KW: f64 = 1e-9;

/// Contract shared by every dispatch policy.
///
/// `decide` is pure: the same observation always yields the same decision
/// for a given configuration. Conformant decisions satisfy
/// `solar + grid - battery = load` whenever the grid is available.
pub trait DispatchPolicy {
    /// Chooses battery and grid power for one timestep.
    fn decide(&self, obs: &Observation) -> DispatchDecision;

    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;
}

/// Policy variant selected by configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    /// Coupled demand/surplus rules.
    #[default]
    Rules,
    /// Calendar-aware decoupled signals.
    Calendar,
    /// Trained fuzzy approximator with rule fallback.
    Approximator,
}

/// Threshold configuration shared by all policy variants.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyThresholds {
    /// Prices above this make discharging worthwhile.
    pub high_price_threshold: f64,
    /// Prices below this make charging from surplus worthwhile.
    pub low_price_threshold: f64,
    /// Prices at or above this make exporting attractive.
    pub export_threshold: f64,
    /// Half-width of the neutral band on the `[-1, 1]` signal scale.
    pub neutral_band: f64,
}

impl Default for PolicyThresholds {
    fn default() -> Self {
        Self {
            high_price_threshold: 20.0,
            low_price_threshold: 5.0,
            export_threshold: 10.0,
            neutral_band: 0.3,
        }
    }
}

impl PolicyThresholds {
    /// Validates all fields and returns a list of errors prefixed with `policy.`.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        for (field, value) in [
            ("policy.high_price_threshold", self.high_price_threshold),
            ("policy.low_price_threshold", self.low_price_threshold),
            ("policy.export_threshold", self.export_threshold),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                errors.push(ConfigError::new(field, "must be finite and >= 0"));
            }
        }
        if self.low_price_threshold > self.high_price_threshold {
            errors.push(ConfigError::new(
                "policy.low_price_threshold",
                "must be <= policy.high_price_threshold",
            ));
        }
        if !(self.neutral_band > 0.0 && self.neutral_band < 1.0) {
            errors.push(ConfigError::new("policy.neutral_band", "must be in (0.0, 1.0)"));
        }
        errors
    }

    /// Price position on `[-1, 1]`: -1 at the low threshold, +1 at the high one.
    pub fn price_position(&self, price: f64) -> f64 {
        let span = (self.high_price_threshold - self.low_price_threshold).max(f64::EPSILON);
        (2.0 * (price - self.low_price_threshold) / span - 1.0).clamp(-1.0, 1.0)
    }
}

/// Any of the configured policies, dispatched statically.
#[derive(Debug, Clone)]
pub enum Policy {
    Rules(RuleBasedPolicy),
    Calendar(CalendarAwarePolicy),
    Approximator(ApproximatorPolicy),
}

impl Policy {
    /// Builds the configured variant.
    ///
    /// `model` is only used by [`PolicyKind::Approximator`]; when absent the
    /// built-in rule base is loaded.
    pub fn from_kind(
        kind: PolicyKind,
        thresholds: PolicyThresholds,
        model: Option<FuzzyModel>,
        scales: FeatureScales,
    ) -> Self {
        match kind {
            PolicyKind::Rules => Self::Rules(RuleBasedPolicy::new(thresholds)),
            PolicyKind::Calendar => Self::Calendar(CalendarAwarePolicy::new(thresholds)),
            PolicyKind::Approximator => Self::Approximator(ApproximatorPolicy::new(
                model.unwrap_or_else(FuzzyModel::default_rule_base),
                thresholds,
                scales,
            )),
        }
    }
}

impl DispatchPolicy for Policy {
    fn decide(&self, obs: &Observation) -> DispatchDecision {
        match self {
            Self::Rules(p) => p.decide(obs),
            Self::Calendar(p) => p.decide(obs),
            Self::Approximator(p) => p.decide(obs),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Rules(p) => p.name(),
            Self::Calendar(p) => p.name(),
            Self::Approximator(p) => p.name(),
        }
    }
}

/// Decision when the grid is unavailable: the battery covers as much of the
/// deficit, or absorbs as much of the surplus, as it can.
pub(crate) fn islanded(
    obs: &Observation,
    source: DecisionSource,
    signals: Option<DecisionSignals>,
) -> DispatchDecision {
    let net = obs.net_demand_kw();
    let battery_action_kw = if net > 0.0 {
        -net.min(obs.max_discharge_kw)
    } else {
        (-net).min(obs.max_charge_kw)
    };
    DispatchDecision {
        battery_action_kw,
        grid_action_kw: 0.0,
        reason: DispatchReason::Islanded,
        explanation: format!(
            "grid unavailable, battery takes {battery_action_kw:.3} kW of {net:.3} kW net demand"
        ),
        source,
        signals,
        load_shift: LoadShift::Neutral,
        grid_usage: GridUsage::Neutral,
    }
}

/// Battery share of the imbalance when the grid-usage signal prefers the grid.
const GRID_PREFERRED_SHARE: f64 = 0.5;

/// Turns decoupled signals into a balanced battery/grid decision.
///
/// Each signal is thresholded against the neutral band on its own. The
/// battery signal picks the direction and its magnitude is the share of the
/// deficit or surplus the battery takes. Avoiding the grid hands the battery
/// the whole share; preferring it scales the share by
/// [`GRID_PREFERRED_SHARE`]. The load-shift category is recorded on the
/// decision for downstream flexible loads.
pub(crate) fn resolve_signals(
    obs: &Observation,
    signals: DecisionSignals,
    thresholds: &PolicyThresholds,
    source: DecisionSource,
) -> DispatchDecision {
    let band = thresholds.neutral_band;
    let load_shift = LoadShift::from_signal(signals.load_shift, band);
    let grid_usage = GridUsage::from_signal(signals.grid_usage, band);

    if !obs.grid_available {
        let mut decision = islanded(obs, source, Some(signals));
        decision.load_shift = load_shift;
        decision.grid_usage = grid_usage;
        return decision;
    }

    let battery_share = signals.battery.abs().min(1.0);
    let share = match grid_usage {
        GridUsage::Avoid => 1.0,
        GridUsage::Neutral => battery_share,
        GridUsage::Prefer => battery_share * GRID_PREFERRED_SHARE,
    };
    let net = obs.net_demand_kw();

    let (battery_action_kw, reason, explanation) = if net > BALANCE_EPSILON_KW {
        if signals.battery < -band && obs.can_discharge() {
            let discharge = (net * share).min(obs.max_discharge_kw);
            (
                -discharge,
                DispatchReason::DischargeBattery,
                format!(
                    "battery signal {:.2} below -{band:.2}, discharging {discharge:.3} of {net:.3} kW",
                    signals.battery
                ),
            )
        } else if signals.battery < -band {
            (
                0.0,
                DispatchReason::ImportGridForced,
                "discharge signalled but battery at floor".to_string(),
            )
        } else {
            (
                0.0,
                DispatchReason::ImportGrid,
                format!("battery signal {:.2} in neutral band", signals.battery),
            )
        }
    } else if net < -BALANCE_EPSILON_KW {
        let excess = -net;
        if signals.battery > band && obs.can_charge() {
            let charge = (excess * share).min(obs.max_charge_kw);
            let reason = if excess - charge > BALANCE_EPSILON_KW {
                DispatchReason::ChargeAndExport
            } else {
                DispatchReason::ChargeBattery
            };
            (
                charge,
                reason,
                format!(
                    "battery signal {:.2} above {band:.2}, charging {charge:.3} of {excess:.3} kW",
                    signals.battery
                ),
            )
        } else if signals.battery > band {
            (
                0.0,
                DispatchReason::ExportGridForced,
                "charge signalled but battery full".to_string(),
            )
        } else if obs.price >= thresholds.export_threshold {
            (
                0.0,
                DispatchReason::ExportGrid,
                format!("exporting at {:.2}", obs.price),
            )
        } else {
            (
                0.0,
                DispatchReason::ExportGridForced,
                format!("exporting below export threshold at {:.2}", obs.price),
            )
        }
    } else {
        (0.0, DispatchReason::Hold, "balanced".to_string())
    };

    let explanation = match load_shift {
        LoadShift::Neutral => explanation,
        shift => format!("{explanation}; load shift {}", shift.as_str()),
    };

    DispatchDecision {
        battery_action_kw,
        grid_action_kw: net + battery_action_kw,
        reason,
        explanation,
        source,
        signals: Some(signals),
        load_shift,
        grid_usage,
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::observation;
    use super::*;

    #[test]
    fn price_position_maps_thresholds() {
        let t = PolicyThresholds::default();
        assert_eq!(t.price_position(5.0), -1.0);
        assert_eq!(t.price_position(20.0), 1.0);
        assert_eq!(t.price_position(12.5), 0.0);
        assert_eq!(t.price_position(100.0), 1.0);
    }

    #[test]
    fn thresholds_validation() {
        let t = PolicyThresholds {
            neutral_band: 1.5,
            low_price_threshold: 30.0,
            ..PolicyThresholds::default()
        };
        let errors = t.validate();
        assert!(errors.iter().any(|e| e.field == "policy.neutral_band"));
        assert!(errors.iter().any(|e| e.field == "policy.low_price_threshold"));
    }

    #[test]
    fn islanded_deficit_uses_battery_only() {
        let mut obs = observation(0.0, 5.0, 0.0, 0.5);
        obs.grid_available = false;
        let d = islanded(&obs, DecisionSource::Rules, None);
        assert_eq!(d.battery_action_kw, -3.0);
        assert_eq!(d.grid_action_kw, 0.0);
        assert_eq!(d.reason, DispatchReason::Islanded);
    }

    #[test]
    fn resolved_signals_balance_power() {
        let t = PolicyThresholds::default();
        for (solar, load) in [(0.0, 2.0), (5.0, 2.0), (1.0, 1.0), (10.0, 0.5)] {
            for battery in [-1.0, -0.5, 0.0, 0.5, 1.0] {
                let obs = observation(solar, load, 12.0, 0.5);
                let signals = DecisionSignals {
                    load_shift: 0.0,
                    battery,
                    grid_usage: 0.0,
                };
                let d = resolve_signals(&obs, signals, &t, DecisionSource::Calendar);
                assert!(d.balance_residual_kw(&obs).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn grid_avoidance_gives_battery_full_share() {
        let t = PolicyThresholds::default();
        let obs = observation(0.0, 2.0, 25.0, 0.5);
        let signals = DecisionSignals {
            load_shift: 0.0,
            battery: -0.4,
            grid_usage: -0.8,
        };
        let d = resolve_signals(&obs, signals, &t, DecisionSource::Calendar);
        assert_eq!(d.battery_action_kw, -2.0);
        assert_eq!(d.grid_action_kw, 0.0);
    }

    #[test]
    fn each_signal_is_thresholded_independently() {
        let t = PolicyThresholds::default();
        let obs = observation(0.0, 2.0, 25.0, 0.5);
        let resolve = |load_shift, grid_usage| {
            let signals = DecisionSignals {
                load_shift,
                battery: -0.5,
                grid_usage,
            };
            resolve_signals(&obs, signals, &t, DecisionSource::Calendar)
        };

        let neutral = resolve(0.0, 0.0);
        assert_eq!(neutral.battery_action_kw, -1.0);
        assert_eq!(neutral.load_shift, LoadShift::Neutral);
        assert_eq!(neutral.grid_usage, GridUsage::Neutral);

        let defer = resolve(-1.0, 0.0);
        let advance = resolve(1.0, 0.0);
        assert_eq!(defer.load_shift, LoadShift::Defer);
        assert_eq!(advance.load_shift, LoadShift::Advance);
        assert!(defer.explanation.ends_with("load shift defer"));
        assert!(advance.explanation.ends_with("load shift advance"));

        let prefer = resolve(0.0, 1.0);
        assert_eq!(prefer.grid_usage, GridUsage::Prefer);
        assert_eq!(prefer.reason, DispatchReason::DischargeBattery);
        assert_eq!(prefer.battery_action_kw, -0.5);
        assert_eq!(prefer.grid_action_kw, 1.5);

        let avoid = resolve(0.0, -1.0);
        assert_eq!(avoid.grid_usage, GridUsage::Avoid);
        assert_eq!(avoid.battery_action_kw, -2.0);
    }

    #[test]
    fn islanded_decisions_keep_signal_categories() {
        let t = PolicyThresholds::default();
        let mut obs = observation(0.0, 2.0, 0.0, 0.5);
        obs.grid_available = false;
        let signals = DecisionSignals {
            load_shift: -0.9,
            battery: 0.0,
            grid_usage: 0.9,
        };
        let d = resolve_signals(&obs, signals, &t, DecisionSource::Calendar);
        assert_eq!(d.reason, DispatchReason::Islanded);
        assert_eq!(d.load_shift, LoadShift::Defer);
        assert_eq!(d.grid_usage, GridUsage::Prefer);
    }

    #[test]
    fn policy_enum_dispatches_by_kind() {
        let t = PolicyThresholds::default();
        let s = FeatureScales::default();
        let p = Policy::from_kind(PolicyKind::Calendar, t.clone(), None, s);
        assert_eq!(p.name(), "calendar");
        let p = Policy::from_kind(PolicyKind::Approximator, t, None, s);
        assert_eq!(p.name(), "approximator");
    }
}
