//! Recorded trajectory of a run and its running energy/cost integrals.

use super::clock::Integration;
use super::types::{DecisionSource, StepRecord};

/// Instantaneous rates integrated into [`RunningTotals`].
///
/// Powers are in kW, cost and income in currency per hour.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FlowRates {
    pub generated_kw: f64,
    pub consumed_kw: f64,
    pub charged_kw: f64,
    pub discharged_kw: f64,
    pub imported_kw: f64,
    pub exported_kw: f64,
    pub unserved_kw: f64,
    pub curtailed_kw: f64,
    pub cost_rate: f64,
    pub export_income_rate: f64,
}

/// Cumulative energy (kWh) and money up to a step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningTotals {
    pub generated_kwh: f64,
    pub consumed_kwh: f64,
    pub charged_kwh: f64,
    pub discharged_kwh: f64,
    pub imported_kwh: f64,
    pub exported_kwh: f64,
    pub unserved_kwh: f64,
    pub curtailed_kwh: f64,
    /// Import cost (non-decreasing).
    pub cost: f64,
    /// Export income (non-decreasing).
    pub export_income: f64,
}

impl RunningTotals {
    /// Import cost minus export income.
    pub fn net_cost(&self) -> f64 {
        self.cost - self.export_income
    }

    fn add(&mut self, rates: &FlowRates, hours: f64) {
        self.generated_kwh += rates.generated_kw * hours;
        self.consumed_kwh += rates.consumed_kw * hours;
        self.charged_kwh += rates.charged_kw * hours;
        self.discharged_kwh += rates.discharged_kw * hours;
        self.imported_kwh += rates.imported_kw * hours;
        self.exported_kwh += rates.exported_kw * hours;
        self.unserved_kwh += rates.unserved_kw * hours;
        self.curtailed_kwh += rates.curtailed_kw * hours;
        self.cost += rates.cost_rate * hours;
        self.export_income += rates.export_income_rate * hours;
    }
}

/// Running-sum integrator over a time grid.
///
/// Trapezoidal totals at step `i` cover `[t0, t_i]`, so the first step
/// contributes nothing. Rectangular totals include step `i`'s own interval.
#[derive(Debug, Clone)]
pub struct Integrator {
    rule: Integration,
    previous: Option<(f64, FlowRates)>,
    totals: RunningTotals,
}

impl Integrator {
    pub fn new(rule: Integration) -> Self {
        Self {
            rule,
            previous: None,
            totals: RunningTotals::default(),
        }
    }

    /// Adds the rates sampled at `time_hours` (step duration `dt_hours`) and
    /// returns the updated totals.
    pub fn push(&mut self, time_hours: f64, dt_hours: f64, rates: FlowRates) -> RunningTotals {
        match self.rule {
            Integration::Trapezoidal => {
                if let Some((t_prev, prev)) = self.previous {
                    let gap = time_hours - t_prev;
                    self.totals.add(&prev, 0.5 * gap);
                    self.totals.add(&rates, 0.5 * gap);
                }
            }
            Integration::Rectangular => self.totals.add(&rates, dt_hours),
        }
        self.previous = Some((time_hours, rates));
        self.totals
    }

    pub fn totals(&self) -> RunningTotals {
        self.totals
    }
}

/// Immutable result of a simulation run.
#[derive(Debug, Clone)]
pub struct Trajectory {
    records: Vec<StepRecord>,
    totals: RunningTotals,
    policy_name: &'static str,
    initial_capacity_kwh: f64,
    initial_soc: f64,
}

impl Trajectory {
    pub(crate) fn new(
        records: Vec<StepRecord>,
        totals: RunningTotals,
        policy_name: &'static str,
        initial_capacity_kwh: f64,
        initial_soc: f64,
    ) -> Self {
        Self {
            records,
            totals,
            policy_name,
            initial_capacity_kwh,
            initial_soc,
        }
    }

    /// Per-step records in time order.
    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    /// Totals at the end of the run.
    pub fn totals(&self) -> &RunningTotals {
        &self.totals
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy_name
    }

    /// Capacity before the first step (kWh).
    pub fn initial_capacity_kwh(&self) -> f64 {
        self.initial_capacity_kwh
    }

    /// SOC before the first step.
    pub fn initial_soc(&self) -> f64 {
        self.initial_soc
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&StepRecord> {
        self.records.last()
    }

    /// Steps where the battery could not honor the full request.
    pub fn truncation_count(&self) -> usize {
        self.records.iter().filter(|r| r.truncated()).count()
    }

    /// Steps where the approximator fell back to the rule policy.
    pub fn fallback_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.source == DecisionSource::Fallback)
            .count()
    }
}
