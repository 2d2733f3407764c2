//! Core simulation types: observations, dispatch decisions, and step records.

use std::fmt;

use super::trajectory::RunningTotals;

/// Number of simulated days treated as one month for degradation and
/// month-progress features.
pub const DAYS_PER_MONTH: f64 = 30.0;

/// Calendar features derived from the simulation timestamp.
///
/// Only the calendar-aware and approximator policies consume these; the
/// rule-based policy ignores them.
///
/// # Examples
///
/// ```
/// use pv_dispatch::sim::types::CalendarFeatures;
///
/// // 53 hours after a Friday midnight is Sunday 05:00.
/// let cal = CalendarFeatures::at(53.0, 4);
/// assert_eq!(cal.day_index, 2);
/// assert_eq!(cal.day_of_week, 6);
/// assert!(cal.is_weekend);
/// assert!((cal.hour_of_day - 5.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalendarFeatures {
    /// Hour of day in `[0, 24)`.
    pub hour_of_day: f64,
    /// Whole days elapsed since the start of the run.
    pub day_index: usize,
    /// Day of week, 0 = Monday ... 6 = Sunday.
    pub day_of_week: u8,
    /// Saturday or Sunday.
    pub is_weekend: bool,
    /// Fraction of the current 30-day month elapsed, in `[0, 1)`.
    pub month_progress: f64,
}

impl CalendarFeatures {
    /// Derives calendar features from hours since run start.
    ///
    /// # Arguments
    ///
    /// * `time_hours` - Hours since the start of the run (>= 0)
    /// * `start_weekday` - Weekday of hour 0 (0 = Monday)
    pub fn at(time_hours: f64, start_weekday: u8) -> Self {
        let time_hours = time_hours.max(0.0);
        let days = time_hours / 24.0;
        let day_index = days.floor() as usize;
        let hour_of_day = time_hours - day_index as f64 * 24.0;
        let day_of_week = ((usize::from(start_weekday % 7) + day_index) % 7) as u8;
        let month_progress = (days % DAYS_PER_MONTH) / DAYS_PER_MONTH;

        Self {
            hour_of_day,
            day_index,
            day_of_week,
            is_weekend: day_of_week >= 5,
            month_progress,
        }
    }
}

/// Everything a dispatch policy may look at for one timestep.
#[derive(Debug, Clone)]
pub struct Observation {
    /// Step index.
    pub step: usize,
    /// Hours since run start.
    pub time_hours: f64,
    /// Instantaneous PV generation (kW, >= 0).
    pub solar_kw: f64,
    /// Instantaneous load demand (kW, >= 0).
    pub load_kw: f64,
    /// Grid price per kWh; 0 when the grid is unavailable.
    pub price: f64,
    /// Whether the grid can import or export this step.
    pub grid_available: bool,
    /// Battery state of charge (fraction).
    pub battery_soc: f64,
    /// Lower SOC limit (fraction).
    pub min_soc: f64,
    /// Upper SOC limit (fraction).
    pub max_soc: f64,
    /// Largest charge power the battery can absorb this step (kW, >= 0).
    pub max_charge_kw: f64,
    /// Largest discharge power the battery can deliver this step (kW, >= 0).
    pub max_discharge_kw: f64,
    /// Derived calendar features.
    pub calendar: CalendarFeatures,
}

impl Observation {
    /// Load minus generation; positive is a deficit, negative a surplus.
    pub fn net_demand_kw(&self) -> f64 {
        self.load_kw - self.solar_kw
    }

    /// True when the battery can discharge at all this step.
    pub fn can_discharge(&self) -> bool {
        self.battery_soc > self.min_soc + SOC_EPSILON && self.max_discharge_kw > 0.0
    }

    /// True when the battery can charge at all this step.
    pub fn can_charge(&self) -> bool {
        self.battery_soc < self.max_soc - SOC_EPSILON && self.max_charge_kw > 0.0
    }
}

/// Tolerance used when comparing SOC against its bounds.
pub const SOC_EPSILON: f64 = 1e-9;

/// Qualitative category explaining a dispatch decision.
///
/// Diagnostic only; the driver never branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchReason {
    /// Deficit covered (at least partly) by the battery at a high price.
    DischargeBattery,
    /// Deficit imported from the grid.
    ImportGrid,
    /// Price was high but the battery could not discharge.
    ImportGridForced,
    /// Surplus fully absorbed by the battery.
    ChargeBattery,
    /// Surplus partly absorbed, remainder exported.
    ChargeAndExport,
    /// Surplus exported at an attractive price.
    ExportGrid,
    /// Surplus exported because charging was not allowed or not possible.
    ExportGridForced,
    /// Neither deficit nor surplus, or the signals sat in the neutral band.
    Hold,
    /// Grid unavailable; the battery covers what it can.
    Islanded,
}

impl DispatchReason {
    /// Stable snake_case label used in logs and CSV telemetry.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DischargeBattery => "discharge_battery",
            Self::ImportGrid => "import_grid",
            Self::ImportGridForced => "import_grid_forced",
            Self::ChargeBattery => "charge_battery",
            Self::ChargeAndExport => "charge_and_export",
            Self::ExportGrid => "export_grid",
            Self::ExportGridForced => "export_grid_forced",
            Self::Hold => "hold",
            Self::Islanded => "islanded",
        }
    }
}

impl fmt::Display for DispatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which policy actually produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionSource {
    /// Rule-based expert policy.
    Rules,
    /// Calendar-aware rule variant.
    Calendar,
    /// Trained approximator.
    Approximator,
    /// Approximator failed; the rule policy was re-invoked.
    Fallback,
}

impl DecisionSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rules => "rules",
            Self::Calendar => "calendar",
            Self::Approximator => "approximator",
            Self::Fallback => "fallback",
        }
    }
}

/// Decoupled decision signals on a roughly `[-1, 1]` scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionSignals {
    /// Positive shifts flexible load into this step, negative away from it.
    pub load_shift: f64,
    /// Positive charges the battery, negative discharges it.
    pub battery: f64,
    /// Positive leans on the grid, negative avoids it.
    pub grid_usage: f64,
}

/// Load-shift signal after thresholding against the neutral band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LoadShift {
    /// Pull flexible load into this step.
    Advance,
    #[default]
    Neutral,
    /// Push flexible load out of this step.
    Defer,
}

impl LoadShift {
    /// Thresholds a load-shift signal; non-finite values are neutral.
    pub fn from_signal(value: f64, band: f64) -> Self {
        if value > band {
            Self::Advance
        } else if value < -band {
            Self::Defer
        } else {
            Self::Neutral
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Advance => "advance",
            Self::Neutral => "neutral",
            Self::Defer => "defer",
        }
    }
}

/// Grid-usage signal after thresholding against the neutral band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum GridUsage {
    /// Keep grid exchange low; the battery takes the whole imbalance.
    Avoid,
    #[default]
    Neutral,
    /// Lean on the grid; the battery takes a reduced share.
    Prefer,
}

impl GridUsage {
    /// Thresholds a grid-usage signal; non-finite values are neutral.
    pub fn from_signal(value: f64, band: f64) -> Self {
        if value > band {
            Self::Prefer
        } else if value < -band {
            Self::Avoid
        } else {
            Self::Neutral
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Avoid => "avoid",
            Self::Neutral => "neutral",
            Self::Prefer => "prefer",
        }
    }
}

/// Output of a dispatch policy for one timestep.
#[derive(Debug, Clone)]
pub struct DispatchDecision {
    /// Battery power (kW; positive=charge, negative=discharge).
    pub battery_action_kw: f64,
    /// Grid power (kW; positive=import, negative=export).
    pub grid_action_kw: f64,
    /// Qualitative category.
    pub reason: DispatchReason,
    /// Free-form explanation for diagnostics.
    pub explanation: String,
    /// Policy that produced the decision.
    pub source: DecisionSource,
    /// Decoupled signals, when the policy computes them.
    pub signals: Option<DecisionSignals>,
    /// Thresholded load-shift signal; neutral for coupled decisions.
    pub load_shift: LoadShift,
    /// Thresholded grid-usage signal; neutral for coupled decisions.
    pub grid_usage: GridUsage,
}

impl DispatchDecision {
    /// Power balance residual of the decision against an observation (kW).
    ///
    /// Zero for a conformant decision while the grid is available.
    pub fn balance_residual_kw(&self, obs: &Observation) -> f64 {
        obs.solar_kw + self.grid_action_kw - self.battery_action_kw - obs.load_kw
    }
}

/// Complete record of one simulation timestep.
#[derive(Debug, Clone)]
pub struct StepRecord {
    /// Step index.
    pub step: usize,
    /// Hours since run start.
    pub time_hours: f64,
    /// Duration this step was integrated over by the battery (hours).
    pub dt_hours: f64,
    /// Calendar features at this step.
    pub calendar: CalendarFeatures,
    /// PV generation (kW).
    pub solar_kw: f64,
    /// Load demand (kW).
    pub load_kw: f64,
    /// Grid price per kWh (0 when unavailable).
    pub price: f64,
    /// Grid availability.
    pub grid_available: bool,
    /// SOC at the start of the step.
    pub soc_before: f64,
    /// Battery power requested by the policy (kW).
    pub requested_battery_kw: f64,
    /// Grid power requested by the policy (kW).
    pub requested_grid_kw: f64,
    /// Decision category.
    pub reason: DispatchReason,
    /// Decision explanation.
    pub explanation: String,
    /// Policy that produced the decision.
    pub source: DecisionSource,
    /// Decoupled signals, when computed.
    pub signals: Option<DecisionSignals>,
    /// Thresholded load-shift signal.
    pub load_shift: LoadShift,
    /// Thresholded grid-usage signal.
    pub grid_usage: GridUsage,
    /// Realized battery power (kW; positive=charge, negative=discharge).
    pub battery_kw: f64,
    /// Requested minus realized battery power magnitude (kW, >= 0).
    pub shortfall_kw: f64,
    /// Realized grid import (kW, >= 0).
    pub grid_import_kw: f64,
    /// Realized grid export (kW, >= 0).
    pub grid_export_kw: f64,
    /// Load not served while islanded (kW, >= 0).
    pub unserved_kw: f64,
    /// Generation curtailed while islanded (kW, >= 0).
    pub curtailed_kw: f64,
    /// SOC after the step.
    pub soc: f64,
    /// Degraded capacity after the step (kWh).
    pub capacity_kwh: f64,
    /// Degraded round-trip efficiency after the step.
    pub efficiency: f64,
    /// Terminal voltage after the step (V).
    pub voltage_v: f64,
    /// Battery current after the step (A; positive=charge).
    pub current_a: f64,
    /// Instantaneous import cost rate (currency/h, >= 0).
    pub instant_cost: f64,
    /// Instantaneous export income rate (currency/h, >= 0).
    pub instant_export_income: f64,
    /// Running integrals up to and including this step.
    pub totals: RunningTotals,
}

impl StepRecord {
    /// True when the battery could not honor the full requested power.
    pub fn truncated(&self) -> bool {
        self.shortfall_kw > TRUNCATION_EPSILON_KW
    }

    /// Realized charge power (kW, >= 0).
    pub fn charge_kw(&self) -> f64 {
        self.battery_kw.max(0.0)
    }

    /// Realized discharge power (kW, >= 0).
    pub fn discharge_kw(&self) -> f64 {
        (-self.battery_kw).max(0.0)
    }

    /// Residual of the realized power balance (kW); zero within rounding.
    ///
    /// `solar + import - export + discharge - charge + unserved - curtailed - load`
    pub fn balance_residual_kw(&self) -> f64 {
        self.solar_kw + self.grid_import_kw - self.grid_export_kw + self.discharge_kw()
            - self.charge_kw()
            + self.unserved_kw
            - self.curtailed_kw
            - self.load_kw
    }
}

/// Shortfalls below this are treated as fully honored.
pub const TRUNCATION_EPSILON_KW: f64 = 1e-6;

impl fmt::Display for StepRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t={:>5} ({:>7.2}h) | pv={:>6.2} load={:>6.2} price={:>6.2}{} | \
             bat={:>6.2} kW (SoC={:>5.1}%) grid=+{:.2}/-{:.2} kW | {} [{}] | cost={:.2}",
            self.step,
            self.time_hours,
            self.solar_kw,
            self.load_kw,
            self.price,
            if self.grid_available { "" } else { " (off-grid)" },
            self.battery_kw,
            self.soc * 100.0,
            self.grid_import_kw,
            self.grid_export_kw,
            self.reason,
            self.source.as_str(),
            self.totals.cost,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(solar_kw: f64, load_kw: f64) -> Observation {
        Observation {
            step: 0,
            time_hours: 0.0,
            solar_kw,
            load_kw,
            price: 10.0,
            grid_available: true,
            battery_soc: 0.5,
            min_soc: 0.1,
            max_soc: 0.95,
            max_charge_kw: 3.0,
            max_discharge_kw: 3.0,
            calendar: CalendarFeatures::at(0.0, 0),
        }
    }

    #[test]
    fn calendar_wraps_weekdays() {
        let monday = CalendarFeatures::at(0.0, 0);
        assert_eq!(monday.day_of_week, 0);
        assert!(!monday.is_weekend);

        let next_monday = CalendarFeatures::at(7.0 * 24.0 + 1.0, 0);
        assert_eq!(next_monday.day_of_week, 0);
        assert_eq!(next_monday.day_index, 7);
    }

    #[test]
    fn calendar_month_progress_resets_after_thirty_days() {
        let mid = CalendarFeatures::at(15.0 * 24.0, 0);
        assert!((mid.month_progress - 0.5).abs() < 1e-12);

        let next = CalendarFeatures::at(30.0 * 24.0, 0);
        assert!(next.month_progress.abs() < 1e-12);
    }

    #[test]
    fn net_demand_sign() {
        assert_eq!(obs(0.0, 2.0).net_demand_kw(), 2.0);
        assert_eq!(obs(5.0, 2.0).net_demand_kw(), -3.0);
    }

    #[test]
    fn battery_availability_at_bounds() {
        let mut o = obs(0.0, 2.0);
        o.battery_soc = 0.1;
        assert!(!o.can_discharge());
        assert!(o.can_charge());

        o.battery_soc = 0.95;
        assert!(o.can_discharge());
        assert!(!o.can_charge());
    }

    #[test]
    fn decision_residual_is_zero_when_balanced() {
        let o = obs(1.0, 4.0);
        let d = DispatchDecision {
            battery_action_kw: -2.0,
            grid_action_kw: 1.0,
            reason: DispatchReason::DischargeBattery,
            explanation: String::new(),
            source: DecisionSource::Rules,
            signals: None,
            load_shift: LoadShift::Neutral,
            grid_usage: GridUsage::Neutral,
        };
        assert!(d.balance_residual_kw(&o).abs() < 1e-12);
    }

    #[test]
    fn signal_categories_threshold_on_both_sides() {
        assert_eq!(LoadShift::from_signal(0.5, 0.3), LoadShift::Advance);
        assert_eq!(LoadShift::from_signal(-0.5, 0.3), LoadShift::Defer);
        assert_eq!(LoadShift::from_signal(0.3, 0.3), LoadShift::Neutral);
        assert_eq!(LoadShift::from_signal(f64::NAN, 0.3), LoadShift::Neutral);

        assert_eq!(GridUsage::from_signal(0.31, 0.3), GridUsage::Prefer);
        assert_eq!(GridUsage::from_signal(-0.31, 0.3), GridUsage::Avoid);
        assert_eq!(GridUsage::from_signal(-0.1, 0.3), GridUsage::Neutral);
    }

    #[test]
    fn reason_labels_are_snake_case() {
        assert_eq!(DispatchReason::ImportGridForced.to_string(), "import_grid_forced");
        assert_eq!(DispatchReason::ChargeAndExport.as_str(), "charge_and_export");
    }
}
