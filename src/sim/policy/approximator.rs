//! Trained fuzzy approximator policy with transparent rule-based fallback.
//!
//! The model is a zero-order Takagi-Sugeno system: each rule has a Gaussian
//! membership per input feature and a constant battery signal as consequent.
//! Rule bases are trained offline against the rule policy and loaded from TOML.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use super::rule::RuleBasedPolicy;
use super::{DispatchPolicy, PolicyThresholds, resolve_signals};
use crate::sim::error::SimError;
use crate::sim::types::{DecisionSignals, DecisionSource, DispatchDecision, Observation};

/// Number of input features, in order: hour of day, day of week, month
/// progress, SOC, price, net demand.
pub const N_FEATURES: usize = 6;

/// Feature names in input order.
pub const FEATURE_NAMES: [&str; N_FEATURES] = [
    "hour_of_day",
    "day_of_week",
    "month_progress",
    "soc",
    "price",
    "net_demand",
];

/// Total firing strength below which no rule is considered active.
const MIN_FIRING_STRENGTH: f64 = 1e-12;

/// Scales that map raw price and net demand onto `[0, 1]` features.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureScales {
    /// Price mapped to 1.0.
    pub price_scale: f64,
    /// Net demand of `-scale` maps to 0.0 and `+scale` to 1.0 (kW).
    pub net_demand_scale_kw: f64,
}

impl Default for FeatureScales {
    fn default() -> Self {
        Self {
            price_scale: 50.0,
            net_demand_scale_kw: 10.0,
        }
    }
}

impl FeatureScales {
    /// Builds the feature vector for an observation.
    ///
    /// Values are not clamped: anything outside `[0, 1]` is out of the
    /// domain the model was trained on.
    pub fn features(&self, obs: &Observation) -> [f64; N_FEATURES] {
        let cal = &obs.calendar;
        [
            cal.hour_of_day / 24.0,
            f64::from(cal.day_of_week) / 6.0,
            cal.month_progress,
            obs.battery_soc,
            obs.price / self.price_scale,
            0.5 * (obs.net_demand_kw() / self.net_demand_scale_kw + 1.0),
        ]
    }
}

/// One fuzzy rule.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FuzzyRule {
    /// Gaussian centers, one per feature.
    pub centers: [f64; N_FEATURES],
    /// Gaussian widths, one per feature (> 0).
    pub sigmas: [f64; N_FEATURES],
    /// Battery signal produced when the rule fires, in `[-1, 1]`.
    pub output: f64,
}

impl FuzzyRule {
    fn firing_strength(&self, features: &[f64; N_FEATURES]) -> f64 {
        features
            .iter()
            .zip(self.centers.iter().zip(&self.sigmas))
            .map(|(x, (c, s))| {
                let z = (x - c) / s;
                (-0.5 * z * z).exp()
            })
            .product()
    }
}

/// Why an approximator evaluation was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationFailure {
    #[error("feature {0} is not finite")]
    NonFiniteFeature(&'static str),
    #[error("feature {name} = {value:.3} outside the trained domain [0, 1]")]
    OutOfDomain { name: &'static str, value: f64 },
    #[error("no rule fired")]
    NoRuleFired,
    #[error("output {0} is not finite")]
    NonFiniteOutput(f64),
}

/// Zero-order Takagi-Sugeno rule base.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FuzzyModel {
    rules: Vec<FuzzyRule>,
}

impl FuzzyModel {
    /// Creates a model after checking every rule.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Model`] if there are no rules, or a rule has a
    /// non-finite center, a non-positive width, or an output outside `[-1, 1]`.
    pub fn new(rules: Vec<FuzzyRule>) -> Result<Self, SimError> {
        if rules.is_empty() {
            return Err(SimError::Model("rule base is empty".to_string()));
        }
        for (i, rule) in rules.iter().enumerate() {
            for (f, (c, s)) in rule.centers.iter().zip(&rule.sigmas).enumerate() {
                if !c.is_finite() {
                    return Err(SimError::Model(format!(
                        "rule {i}: center of {} is not finite",
                        FEATURE_NAMES[f]
                    )));
                }
                if !(s.is_finite() && *s > 0.0) {
                    return Err(SimError::Model(format!(
                        "rule {i}: sigma of {} must be > 0",
                        FEATURE_NAMES[f]
                    )));
                }
            }
            if !(-1.0..=1.0).contains(&rule.output) {
                return Err(SimError::Model(format!(
                    "rule {i}: output must be in [-1, 1], got {}",
                    rule.output
                )));
            }
        }
        Ok(Self { rules })
    }

    /// Parses a rule base from TOML (`[[rules]]` tables).
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Model`] on parse or validation failure.
    pub fn from_toml_str(s: &str) -> Result<Self, SimError> {
        let raw: Self = toml::from_str(s).map_err(|e| SimError::Model(e.to_string()))?;
        Self::new(raw.rules)
    }

    /// Reads a rule base from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Model`] if the file cannot be read or is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, SimError> {
        let content = fs::read_to_string(path)
            .map_err(|e| SimError::Model(format!("cannot read \"{}\": {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Built-in rule base fitted to the default rule-policy thresholds and
    /// [`FeatureScales::default`].
    pub fn default_rule_base() -> Self {
        // Calendar features are irrelevant to the rule target: wide widths.
        const ANY: f64 = 10.0;
        let rule = |price: (f64, f64), net: (f64, f64), soc: (f64, f64), output: f64| FuzzyRule {
            centers: [0.5, 0.5, 0.5, soc.0, price.0, net.0],
            sigmas: [ANY, ANY, ANY, soc.1, price.1, net.1],
            output,
        };
        Self {
            rules: vec![
                // Expensive deficit: discharge.
                rule((0.7, 0.2), (0.8, 0.15), (0.6, 0.4), -1.0),
                // Cheap surplus: charge.
                rule((0.0, 0.08), (0.2, 0.15), (0.4, 0.4), 1.0),
                // Moderate prices: hold the battery.
                rule((0.25, 0.1), (0.5, 0.3), (0.5, 0.5), 0.0),
                // Expensive surplus: export.
                rule((0.7, 0.2), (0.2, 0.15), (0.5, 0.5), 0.0),
                // Cheap deficit: import.
                rule((0.0, 0.08), (0.8, 0.15), (0.5, 0.5), 0.0),
            ],
        }
    }

    pub fn rules(&self) -> &[FuzzyRule] {
        &self.rules
    }

    /// Evaluates the battery signal for a feature vector.
    ///
    /// # Errors
    ///
    /// Returns an [`EvaluationFailure`] for non-finite or out-of-domain
    /// features, when no rule fires, or when the output is not finite.
    pub fn evaluate(&self, features: &[f64; N_FEATURES]) -> Result<f64, EvaluationFailure> {
        for (name, value) in FEATURE_NAMES.iter().zip(features) {
            if !value.is_finite() {
                return Err(EvaluationFailure::NonFiniteFeature(name));
            }
            if !(0.0..=1.0).contains(value) {
                return Err(EvaluationFailure::OutOfDomain {
                    name,
                    value: *value,
                });
            }
        }

        let (weighted, total) = self.rules.iter().fold((0.0, 0.0), |(num, den), rule| {
            let w = rule.firing_strength(features);
            (num + w * rule.output, den + w)
        });
        if total < MIN_FIRING_STRENGTH {
            return Err(EvaluationFailure::NoRuleFired);
        }

        let output = weighted / total;
        if output.is_finite() {
            Ok(output.clamp(-1.0, 1.0))
        } else {
            Err(EvaluationFailure::NonFiniteOutput(output))
        }
    }
}

/// Approximator policy that re-invokes the rule policy whenever the model
/// cannot produce a trustworthy answer.
#[derive(Debug, Clone)]
pub struct ApproximatorPolicy {
    model: FuzzyModel,
    fallback: RuleBasedPolicy,
    thresholds: PolicyThresholds,
    scales: FeatureScales,
}

impl ApproximatorPolicy {
    pub fn new(model: FuzzyModel, thresholds: PolicyThresholds, scales: FeatureScales) -> Self {
        Self {
            model,
            fallback: RuleBasedPolicy::new(thresholds.clone()),
            thresholds,
            scales,
        }
    }

    pub fn model(&self) -> &FuzzyModel {
        &self.model
    }
}

impl DispatchPolicy for ApproximatorPolicy {
    fn decide(&self, obs: &Observation) -> DispatchDecision {
        let features = self.scales.features(obs);
        match self.model.evaluate(&features) {
            Ok(battery) => {
                let signals = DecisionSignals {
                    load_shift: 0.0,
                    battery,
                    grid_usage: 0.0,
                };
                resolve_signals(obs, signals, &self.thresholds, DecisionSource::Approximator)
            }
            Err(failure) => {
                warn!(step = obs.step, %failure, "approximator failed, using rule policy");
                let mut decision = self.fallback.decide(obs);
                decision.source = DecisionSource::Fallback;
                decision.explanation = format!("fallback ({failure}): {}", decision.explanation);
                decision
            }
        }
    }

    fn name(&self) -> &'static str {
        "approximator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::policy::test_support::observation;
    use crate::sim::types::DispatchReason;

    fn policy() -> ApproximatorPolicy {
        ApproximatorPolicy::new(
            FuzzyModel::default_rule_base(),
            PolicyThresholds::default(),
            FeatureScales::default(),
        )
    }

    #[test]
    fn expensive_deficit_discharges_like_rules() {
        let obs = observation(0.0, 6.0, 35.0, 0.6);
        let d = policy().decide(&obs);
        assert_eq!(d.source, DecisionSource::Approximator);
        assert_eq!(d.reason, DispatchReason::DischargeBattery);
        assert!(d.battery_action_kw < 0.0);
    }

    #[test]
    fn cheap_surplus_charges_like_rules() {
        let obs = observation(6.0, 0.0, 0.5, 0.4);
        let d = policy().decide(&obs);
        assert_eq!(d.source, DecisionSource::Approximator);
        assert!(d.battery_action_kw > 0.0);
    }

    #[test]
    fn out_of_domain_price_falls_back_to_rules() {
        // Price 80 maps to 1.6 on a 50 scale.
        let obs = observation(0.0, 2.0, 80.0, 0.5);
        let d = policy().decide(&obs);
        let rules = RuleBasedPolicy::new(PolicyThresholds::default()).decide(&obs);

        assert_eq!(d.source, DecisionSource::Fallback);
        assert_eq!(d.reason, rules.reason);
        assert_eq!(d.battery_action_kw, rules.battery_action_kw);
        assert_eq!(d.grid_action_kw, rules.grid_action_kw);
        // Never a degenerate zero decision.
        assert!(d.battery_action_kw < 0.0);
    }

    #[test]
    fn non_finite_feature_falls_back() {
        let obs = observation(f64::NAN, 2.0, 10.0, 0.5);
        let d = policy().decide(&obs);
        assert_eq!(d.source, DecisionSource::Fallback);
    }

    #[test]
    fn no_rule_fired_falls_back() {
        let narrow = FuzzyModel::new(vec![FuzzyRule {
            centers: [0.0; N_FEATURES],
            sigmas: [1e-3; N_FEATURES],
            output: 1.0,
        }])
        .expect("valid model");
        let p = ApproximatorPolicy::new(narrow, PolicyThresholds::default(), FeatureScales::default());
        let obs = observation(0.0, 2.0, 25.0, 0.5);
        assert_eq!(
            p.model().evaluate(&FeatureScales::default().features(&obs)),
            Err(EvaluationFailure::NoRuleFired)
        );
        let d = p.decide(&obs);
        assert_eq!(d.source, DecisionSource::Fallback);
        assert_eq!(d.reason, DispatchReason::DischargeBattery);
    }

    #[test]
    fn model_parses_from_toml() {
        let toml = r#"
[[rules]]
centers = [0.5, 0.5, 0.5, 0.5, 0.8, 0.8]
sigmas = [10.0, 10.0, 10.0, 0.4, 0.2, 0.2]
output = -0.9

[[rules]]
centers = [0.5, 0.5, 0.5, 0.5, 0.0, 0.2]
sigmas = [10.0, 10.0, 10.0, 0.4, 0.1, 0.2]
output = 0.9
"#;
        let model = FuzzyModel::from_toml_str(toml).expect("valid model");
        assert_eq!(model.rules().len(), 2);
    }

    #[test]
    fn model_rejects_bad_sigma() {
        let toml = r#"
[[rules]]
centers = [0.5, 0.5, 0.5, 0.5, 0.5, 0.5]
sigmas = [1.0, 1.0, 1.0, 0.0, 1.0, 1.0]
output = 0.0
"#;
        let err = FuzzyModel::from_toml_str(toml).expect_err("must fail");
        assert!(err.to_string().contains("sigma of soc"));
    }

    #[test]
    fn model_rejects_empty_rule_base() {
        assert!(FuzzyModel::new(Vec::new()).is_err());
    }

    #[test]
    fn output_stays_in_signal_range() {
        let model = FuzzyModel::default_rule_base();
        let scales = FeatureScales::default();
        for price in [0.0, 10.0, 25.0, 45.0] {
            for (solar, load) in [(0.0, 8.0), (8.0, 0.0), (2.0, 2.0)] {
                let features = scales.features(&observation(solar, load, price, 0.5));
                let out = model.evaluate(&features).expect("in domain");
                assert!((-1.0..=1.0).contains(&out));
            }
        }
    }
}
