//! Post-hoc KPI computation from a completed trajectory.

use std::fmt;

use super::trajectory::Trajectory;

/// Aggregate key performance indicators of a run.
///
/// Energy and money come from the trajectory's running totals so the report
/// always matches the per-step records.
#[derive(Debug, Clone, Default)]
pub struct KpiReport {
    /// Policy that produced the run.
    pub policy: &'static str,
    /// Number of steps.
    pub steps: usize,
    /// PV energy generated (kWh).
    pub generated_kwh: f64,
    /// Load energy demanded (kWh).
    pub consumed_kwh: f64,
    /// Grid energy imported (kWh).
    pub imported_kwh: f64,
    /// Grid energy exported (kWh).
    pub exported_kwh: f64,
    /// Demand unserved while islanded (kWh).
    pub unserved_kwh: f64,
    /// Generation curtailed while islanded (kWh).
    pub curtailed_kwh: f64,
    /// Import cost.
    pub cost: f64,
    /// Export income.
    pub export_income: f64,
    /// Cost minus export income.
    pub net_cost: f64,
    /// Share of demand not covered by imports (%).
    pub self_sufficiency_pct: f64,
    /// Peak grid import (kW).
    pub peak_import_kw: f64,
    /// Peak grid export (kW).
    pub peak_export_kw: f64,
    /// Energy charged plus energy discharged (kWh).
    pub battery_throughput_kwh: f64,
    /// Throughput over twice the initial capacity.
    pub battery_equivalent_full_cycles: f64,
    /// SOC after the last step.
    pub final_soc: f64,
    /// Capacity after the last step (kWh).
    pub final_capacity_kwh: f64,
    /// Efficiency after the last step.
    pub final_efficiency: f64,
    /// Steps where the battery request was truncated.
    pub truncation_count: usize,
    /// Steps where the approximator fell back to the rule policy.
    pub fallback_count: usize,
}

impl KpiReport {
    /// Computes all KPIs from a trajectory.
    ///
    /// An empty trajectory yields an all-zero report.
    pub fn from_trajectory(trajectory: &Trajectory) -> Self {
        let Some(last) = trajectory.last() else {
            return Self {
                policy: trajectory.policy_name(),
                ..Self::default()
            };
        };
        let totals = trajectory.totals();

        let (peak_import_kw, peak_export_kw) = trajectory
            .records()
            .iter()
            .fold((0.0_f64, 0.0_f64), |(imp, exp), r| {
                (imp.max(r.grid_import_kw), exp.max(r.grid_export_kw))
            });

        let self_sufficiency_pct = if totals.consumed_kwh > 0.0 {
            (100.0 * (1.0 - totals.imported_kwh / totals.consumed_kwh)).clamp(0.0, 100.0)
        } else {
            0.0
        };

        let throughput = totals.charged_kwh + totals.discharged_kwh;
        let capacity = trajectory.initial_capacity_kwh();
        let cycles = if capacity > 0.0 {
            throughput / (2.0 * capacity)
        } else {
            0.0
        };

        Self {
            policy: trajectory.policy_name(),
            steps: trajectory.len(),
            generated_kwh: totals.generated_kwh,
            consumed_kwh: totals.consumed_kwh,
            imported_kwh: totals.imported_kwh,
            exported_kwh: totals.exported_kwh,
            unserved_kwh: totals.unserved_kwh,
            curtailed_kwh: totals.curtailed_kwh,
            cost: totals.cost,
            export_income: totals.export_income,
            net_cost: totals.net_cost(),
            self_sufficiency_pct,
            peak_import_kw,
            peak_export_kw,
            battery_throughput_kwh: throughput,
            battery_equivalent_full_cycles: cycles,
            final_soc: last.soc,
            final_capacity_kwh: last.capacity_kwh,
            final_efficiency: last.efficiency,
            truncation_count: trajectory.truncation_count(),
            fallback_count: trajectory.fallback_count(),
        }
    }
}

impl fmt::Display for KpiReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- KPI Report ---")?;
        writeln!(f, "Policy:                {} ({} steps)", self.policy, self.steps)?;
        writeln!(f, "PV generated:          {:.2} kWh", self.generated_kwh)?;
        writeln!(f, "Load consumed:         {:.2} kWh", self.consumed_kwh)?;
        writeln!(
            f,
            "Grid import/export:    {:.2} / {:.2} kWh",
            self.imported_kwh, self.exported_kwh
        )?;
        if self.unserved_kwh > 0.0 || self.curtailed_kwh > 0.0 {
            writeln!(
                f,
                "Unserved/curtailed:    {:.2} / {:.2} kWh",
                self.unserved_kwh, self.curtailed_kwh
            )?;
        }
        writeln!(f, "Self-sufficiency:      {:.1}%", self.self_sufficiency_pct)?;
        writeln!(f, "Peak import:           {:.2} kW", self.peak_import_kw)?;
        writeln!(f, "Peak export:           {:.2} kW", self.peak_export_kw)?;
        writeln!(
            f,
            "Cost:                  {:.2} (income {:.2}, net {:.2})",
            self.cost, self.export_income, self.net_cost
        )?;
        writeln!(
            f,
            "Battery throughput:    {:.2} kWh ({:.2} equiv. cycles)",
            self.battery_throughput_kwh, self.battery_equivalent_full_cycles
        )?;
        writeln!(
            f,
            "Final battery:         SoC {:.1}%, {:.3} kWh, eff {:.3}",
            self.final_soc * 100.0,
            self.final_capacity_kwh,
            self.final_efficiency
        )?;
        write!(
            f,
            "Truncations/fallbacks: {} / {}",
            self.truncation_count, self.fallback_count
        )
    }
}
