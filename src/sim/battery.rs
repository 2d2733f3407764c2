//! Battery state simulator: SOC integration, rate limits, and calendar degradation.

use serde::Deserialize;

use crate::config::ConfigError;

use super::error::SimError;
use super::types::DAYS_PER_MONTH;

/// Floor applied to `dt` when turning an energy headroom into a power limit.
pub const MIN_DT_HOURS: f64 = 1e-6;

/// Floor applied to the terminal voltage before computing current.
const VOLTAGE_EPSILON_V: f64 = 1e-6;

/// Degraded quantities never fall below this fraction of their initial value.
const DEGRADATION_FLOOR: f64 = 0.5;

/// Physical battery parameters.
///
/// # Power Flow Convention
/// - Positive power: charging (drawn from the bus)
/// - Negative power: discharging (delivered to the bus)
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatteryParams {
    /// Nameplate energy capacity (kWh).
    pub capacity_kwh: f64,
    /// Initial state of charge (fraction).
    pub initial_soc: f64,
    /// Lower SOC limit (fraction).
    pub min_soc: f64,
    /// Upper SOC limit (fraction).
    pub max_soc: f64,
    /// Maximum charging power (kW).
    pub max_charge_rate_kw: f64,
    /// Maximum discharging power (kW).
    pub max_discharge_rate_kw: f64,
    /// Efficiency applied on both charge and discharge, in `(0, 1]`.
    pub efficiency: f64,
    /// Nominal terminal voltage (V).
    pub nominal_voltage_v: f64,
    /// Capacity lost per simulated month (fraction of nameplate).
    pub capacity_fade_per_month: f64,
    /// Efficiency lost per simulated month (fraction of initial).
    pub efficiency_fade_per_month: f64,
    /// Voltage multiplier lost per simulated month.
    pub voltage_fade_per_month: f64,
    /// Requests smaller than this magnitude are treated as hold (kW).
    pub hold_threshold_kw: f64,
}

impl Default for BatteryParams {
    fn default() -> Self {
        Self {
            capacity_kwh: 10.0,
            initial_soc: 0.5,
            min_soc: 0.1,
            max_soc: 0.95,
            max_charge_rate_kw: 3.0,
            max_discharge_rate_kw: 3.0,
            efficiency: 0.95,
            nominal_voltage_v: 48.0,
            capacity_fade_per_month: 0.02,
            efficiency_fade_per_month: 0.005,
            voltage_fade_per_month: 0.005,
            hold_threshold_kw: 1e-3,
        }
    }
}

impl BatteryParams {
    /// Validates all fields and returns a list of errors prefixed with `battery.`.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if !(self.capacity_kwh.is_finite() && self.capacity_kwh > 0.0) {
            errors.push(ConfigError::new("battery.capacity_kwh", "must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.min_soc) {
            errors.push(ConfigError::new("battery.min_soc", "must be in [0.0, 1.0]"));
        }
        if !(0.0..=1.0).contains(&self.max_soc) {
            errors.push(ConfigError::new("battery.max_soc", "must be in [0.0, 1.0]"));
        }
        if self.min_soc >= self.max_soc {
            errors.push(ConfigError::new("battery.min_soc", "must be < battery.max_soc"));
        }
        if !(self.min_soc..=self.max_soc).contains(&self.initial_soc) {
            errors.push(ConfigError::new(
                "battery.initial_soc",
                "must be in [battery.min_soc, battery.max_soc]",
            ));
        }
        if !(self.max_charge_rate_kw.is_finite() && self.max_charge_rate_kw >= 0.0) {
            errors.push(ConfigError::new("battery.max_charge_rate_kw", "must be >= 0"));
        }
        if !(self.max_discharge_rate_kw.is_finite() && self.max_discharge_rate_kw >= 0.0) {
            errors.push(ConfigError::new("battery.max_discharge_rate_kw", "must be >= 0"));
        }
        if !(self.efficiency > 0.0 && self.efficiency <= 1.0) {
            errors.push(ConfigError::new("battery.efficiency", "must be in (0.0, 1.0]"));
        }
        if !(self.nominal_voltage_v.is_finite() && self.nominal_voltage_v > 0.0) {
            errors.push(ConfigError::new("battery.nominal_voltage_v", "must be > 0"));
        }
        for (field, fade) in [
            ("battery.capacity_fade_per_month", self.capacity_fade_per_month),
            ("battery.efficiency_fade_per_month", self.efficiency_fade_per_month),
            ("battery.voltage_fade_per_month", self.voltage_fade_per_month),
        ] {
            if !(0.0..1.0).contains(&fade) {
                errors.push(ConfigError::new(field, "must be in [0.0, 1.0)"));
            }
        }
        if !(self.hold_threshold_kw.is_finite() && self.hold_threshold_kw >= 0.0) {
            errors.push(ConfigError::new("battery.hold_threshold_kw", "must be >= 0"));
        }

        errors
    }
}

/// Mutable battery state for one simulation run.
///
/// Only [`BatterySimulator`] mutates it; everything else reads through accessors.
#[derive(Debug, Clone, PartialEq)]
pub struct BatteryState {
    soc: f64,
    capacity_kwh: f64,
    efficiency: f64,
    voltage_v: f64,
    current_a: f64,
    power_kw: f64,
    elapsed_hours: f64,
}

impl BatteryState {
    pub fn soc(&self) -> f64 {
        self.soc
    }

    /// Degraded capacity (kWh).
    pub fn capacity_kwh(&self) -> f64 {
        self.capacity_kwh
    }

    /// Degraded efficiency.
    pub fn efficiency(&self) -> f64 {
        self.efficiency
    }

    pub fn voltage_v(&self) -> f64 {
        self.voltage_v
    }

    pub fn current_a(&self) -> f64 {
        self.current_a
    }

    /// Last realized power (kW; positive=charge).
    pub fn power_kw(&self) -> f64 {
        self.power_kw
    }

    /// Simulated time the battery has been stepped through (hours).
    pub fn elapsed_hours(&self) -> f64 {
        self.elapsed_hours
    }

    /// Simulated days elapsed.
    pub fn elapsed_days(&self) -> f64 {
        self.elapsed_hours / 24.0
    }

    /// Stored energy (kWh).
    pub fn energy_kwh(&self) -> f64 {
        self.soc * self.capacity_kwh
    }
}

/// Largest powers the battery can honor over the next step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeasibleLimits {
    /// Charge power limit (kW, >= 0).
    pub max_charge_kw: f64,
    /// Discharge power limit (kW, >= 0).
    pub max_discharge_kw: f64,
}

/// Outcome of one battery step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryStep {
    /// Power the policy asked for (kW).
    pub requested_kw: f64,
    /// Power actually drawn or delivered (kW).
    pub actual_kw: f64,
    /// Magnitude the battery could not honor (kW, >= 0).
    pub shortfall_kw: f64,
}

/// Stateless stepper over a [`BatteryState`].
#[derive(Debug, Clone)]
pub struct BatterySimulator {
    params: BatteryParams,
}

impl BatterySimulator {
    /// Creates a simulator after validating the parameters.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Configuration`] listing every invalid parameter.
    pub fn new(params: BatteryParams) -> Result<Self, SimError> {
        let errors = params.validate();
        if !errors.is_empty() {
            return Err(SimError::Configuration(errors));
        }
        Ok(Self { params })
    }

    pub fn params(&self) -> &BatteryParams {
        &self.params
    }

    /// Fresh state at the configured initial SOC with no degradation.
    pub fn initial_state(&self) -> BatteryState {
        self.state_at_soc(self.params.initial_soc)
    }

    /// Fresh state at an explicit SOC, clamped into `[min_soc, max_soc]`.
    pub fn state_at_soc(&self, soc: f64) -> BatteryState {
        let soc = soc.clamp(self.params.min_soc, self.params.max_soc);
        BatteryState {
            soc,
            capacity_kwh: self.capacity_at(0.0),
            efficiency: self.efficiency_at(0.0),
            voltage_v: self.terminal_voltage(soc, 0.0),
            current_a: 0.0,
            power_kw: 0.0,
            elapsed_hours: 0.0,
        }
    }

    /// Degraded capacity after `elapsed_days` simulated days (kWh).
    pub fn capacity_at(&self, elapsed_days: f64) -> f64 {
        self.params.capacity_kwh * fade(self.params.capacity_fade_per_month, elapsed_days)
    }

    /// Degraded efficiency after `elapsed_days` simulated days.
    pub fn efficiency_at(&self, elapsed_days: f64) -> f64 {
        self.params.efficiency * fade(self.params.efficiency_fade_per_month, elapsed_days)
    }

    /// Terminal voltage: `nominal * (0.9 + 0.2 * soc) * fade(days)`.
    pub fn terminal_voltage(&self, soc: f64, elapsed_days: f64) -> f64 {
        self.params.nominal_voltage_v
            * (0.9 + 0.2 * soc)
            * fade(self.params.voltage_fade_per_month, elapsed_days)
    }

    /// Charge and discharge limits for a step of `dt_hours` from `state`.
    ///
    /// Combines the configured rate limits with the SOC headroom. `dt_hours`
    /// is floored at [`MIN_DT_HOURS`] so the headroom term stays bounded.
    /// A limit inside the hold dead-band is reported as 0, since no request
    /// that small is ever applied.
    pub fn feasible_limits(&self, state: &BatteryState, dt_hours: f64) -> FeasibleLimits {
        let p = &self.params;
        let dt = dt_hours.max(MIN_DT_HOURS);
        let eff = state.efficiency;

        let headroom_kwh = ((p.max_soc - state.soc) * state.capacity_kwh).max(0.0);
        let available_kwh = ((state.soc - p.min_soc) * state.capacity_kwh).max(0.0);
        let outside_dead_band = |kw: f64| if kw < p.hold_threshold_kw { 0.0 } else { kw };

        FeasibleLimits {
            max_charge_kw: outside_dead_band(p.max_charge_rate_kw.min(headroom_kwh / (dt * eff))),
            max_discharge_kw: outside_dead_band(
                p.max_discharge_rate_kw.min(available_kwh * eff / dt),
            ),
        }
    }

    /// Applies a battery power request for `dt_hours` and advances the state.
    ///
    /// Requests inside the hold dead-band do nothing. Requests beyond the
    /// feasible limits are truncated, never rejected; the shortfall is
    /// reported so the caller can settle it against the grid.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidTimestep`] if `dt_hours` is not finite and > 0.
    pub fn step(
        &self,
        state: &mut BatteryState,
        action_kw: f64,
        dt_hours: f64,
    ) -> Result<BatteryStep, SimError> {
        if !(dt_hours.is_finite() && dt_hours > 0.0) {
            return Err(SimError::InvalidTimestep(dt_hours));
        }
        let p = &self.params;
        let requested_kw = if action_kw.is_finite() { action_kw } else { 0.0 };
        let limits = self.feasible_limits(state, dt_hours);

        let actual_kw = if requested_kw.abs() < p.hold_threshold_kw {
            0.0
        } else if requested_kw > 0.0 {
            requested_kw.min(limits.max_charge_kw)
        } else {
            requested_kw.max(-limits.max_discharge_kw)
        };

        if actual_kw > 0.0 {
            let stored_kwh = actual_kw * dt_hours * state.efficiency;
            state.soc = (state.soc + stored_kwh / state.capacity_kwh).min(p.max_soc);
        } else if actual_kw < 0.0 {
            let drawn_kwh = -actual_kw * dt_hours / state.efficiency;
            state.soc = (state.soc - drawn_kwh / state.capacity_kwh).max(p.min_soc);
        }
        state.soc = state.soc.clamp(p.min_soc, p.max_soc);

        state.elapsed_hours += dt_hours;
        let days = state.elapsed_days();
        state.capacity_kwh = self.capacity_at(days);
        state.efficiency = self.efficiency_at(days);
        state.voltage_v = self.terminal_voltage(state.soc, days);
        state.power_kw = actual_kw;
        state.current_a = actual_kw * 1000.0 / state.voltage_v.max(VOLTAGE_EPSILON_V);

        let shortfall_kw = if requested_kw.abs() < p.hold_threshold_kw {
            0.0
        } else {
            (requested_kw.abs() - actual_kw.abs()).max(0.0)
        };

        Ok(BatteryStep {
            requested_kw,
            actual_kw,
            shortfall_kw,
        })
    }
}

/// Linear calendar fade, floored at [`DEGRADATION_FLOOR`].
fn fade(per_month: f64, elapsed_days: f64) -> f64 {
    (1.0 - per_month * elapsed_days.max(0.0) / DAYS_PER_MONTH).max(DEGRADATION_FLOOR)
}
